//! The burst pool
//!
//! Owns one NUMA-bound arena holding every worker slot, the shared
//! coordination block and the argument records, plus the clone3 workers
//! themselves. Supports repeated dispatch/join cycles from a single
//! orchestrator thread.
//!
//! Workers hold raw pointers into the arena; the destructor therefore
//! reaps every worker (shutdown, wake, wait on the kernel-cleared tid
//! words) before the arena unmaps.

use core::sync::atomic::{AtomicI32, Ordering};

use burstpool_core::args::{JobArgs, KernelFn};
use burstpool_core::constants::PAGE_SIZE;
use burstpool_core::cpumask::CpuMask;
use burstpool_core::error::{Errno, MemoryError, PoolError, PoolResult, SpawnError};
use burstpool_core::kprint;
use burstpool_core::layout::{ArenaLayout, SlotLayout};
use burstpool_core::shared::SharedBlock;
use burstpool_core::{kdebug, ktrace};

use crate::arch::current as arch;
use crate::config::PoolConfig;
use crate::numa::{ArenaOptions, NumaArena};
use crate::signal;
use crate::sys;
use crate::tls;
use crate::topology::Topology;
use crate::worker::{self, SpawnSpec};

/// Per-worker descriptor: where its slot lives and how to watch it die
#[derive(Debug)]
struct WorkerSlot {
    slot_base: *mut u8,
    child_tid: *const AtomicI32,
}

/// A fixed set of persistent workers fed by dispatch/join cycles
#[derive(Debug)]
pub struct BurstPool {
    arena: NumaArena,
    layout: ArenaLayout,
    shared: *const SharedBlock,
    args: *mut JobArgs,
    workers: Vec<WorkerSlot>,
    cpu_mask: Option<CpuMask>,
    cfg: PoolConfig,
    valid: bool,
}

impl BurstPool {
    /// Build a pool with `capacity` workers, an optional CPU mask the
    /// workers are pinned across, and an optional NUMA node the whole
    /// arena is bound to.
    pub fn new(capacity: usize, cpu_mask: Option<CpuMask>, node: Option<u32>) -> PoolResult<Self> {
        Self::with_config(capacity, cpu_mask, node, PoolConfig::from_env())
    }

    pub fn with_config(
        capacity: usize,
        cpu_mask: Option<CpuMask>,
        node: Option<u32>,
        cfg: PoolConfig,
    ) -> PoolResult<Self> {
        cfg.validate()?;
        if capacity == 0 {
            return Err(MemoryError::BadSlotCount.into());
        }
        if let Some(mask) = &cpu_mask {
            if mask.is_empty() {
                return Err(PoolError::EmptyNode);
            }
        }

        let slot_layout = SlotLayout::new(cfg.stack_size, cfg.alt_stack_size);
        let layout = ArenaLayout::new(capacity, slot_layout);

        let opts = ArenaOptions {
            use_thp: cfg.use_thp,
            populate: true,
            no_reserve: true,
        };
        let mut arena = match node {
            Some(n) => NumaArena::bound(n, layout.total_size, opts),
            None => NumaArena::unbound(layout.total_size, opts),
        };
        if !arena.is_valid() {
            return Err(MemoryError::ArenaFailed.into());
        }

        // Carve the arena exactly as ArenaLayout describes it: the slots
        // first (page-aligned by construction), then the shared block,
        // then the argument records.
        let slots = arena.alloc::<u8>(capacity * slot_layout.slot_size);
        let shared = arena.alloc::<SharedBlock>(1);
        let args = arena.alloc::<JobArgs>(capacity);
        debug_assert_eq!(slots, arena.base());
        debug_assert!(!shared.is_null() && !args.is_null());

        unsafe { shared.write(SharedBlock::new()) };

        // Guard pages and cleared tid words, per slot.
        for i in 0..capacity {
            let sb = unsafe { slots.add(layout.slot_base(i)) };
            unsafe {
                let ret = sys::mprotect(sb.add(slot_layout.guard_low), PAGE_SIZE, libc::PROT_NONE);
                if ret < 0 {
                    return Err(MemoryError::ProtectFailed(Errno::from_ret(ret)).into());
                }
                let ret = sys::mprotect(sb.add(slot_layout.guard_high), PAGE_SIZE, libc::PROT_NONE);
                if ret < 0 {
                    return Err(MemoryError::ProtectFailed(Errno::from_ret(ret)).into());
                }
                (*(sb.add(slot_layout.child_tid) as *const AtomicI32)).store(0, Ordering::Relaxed);
            }
        }

        signal::install_fault_handler()?;
        kprint::set_worker_id_fn(tls::current_worker_id);

        let mut pool = Self {
            arena,
            layout,
            shared,
            args,
            workers: Vec::with_capacity(capacity),
            cpu_mask,
            cfg,
            valid: false,
        };

        for i in 0..capacity {
            let sb = unsafe { slots.add(layout.slot_base(i)) };
            let spec = SpawnSpec {
                slot_base: sb,
                layout: slot_layout,
                worker_id: i as u64,
                shared,
                args,
                spin_budget: pool.cfg.idle_spins,
                pinned: pool.cfg.pin_workers && pool.cpu_mask.is_some(),
                cpu_mask: pool.worker_cpu(i),
            };
            match unsafe { worker::spawn_worker(&spec) } {
                Ok(tid) => {
                    ktrace!("spawned worker {} tid {}", i, tid);
                    pool.workers.push(WorkerSlot {
                        slot_base: sb,
                        child_tid: unsafe { sb.add(slot_layout.child_tid) as *const AtomicI32 },
                    });
                }
                Err(e) => {
                    // Earlier workers are parked on the futex with
                    // shutdown still zero; Drop reaps them.
                    kdebug!("worker {} spawn failed: {}", i, e);
                    return Err(SpawnError::CloneFailed(e).into());
                }
            }
        }

        kdebug!(
            "pool up: capacity={} node={:?} stack={}K",
            capacity,
            node,
            pool.cfg.stack_size / 1024
        );
        pool.valid = true;
        Ok(pool)
    }

    /// Pool sized to a NUMA node: one worker per CPU of the node, the
    /// arena bound there.
    pub fn for_node<T: Topology>(topo: &T, node: u32) -> PoolResult<Self> {
        Self::for_node_with_config(topo, node, PoolConfig::from_env())
    }

    pub fn for_node_with_config<T: Topology>(
        topo: &T,
        node: u32,
        cfg: PoolConfig,
    ) -> PoolResult<Self> {
        let mask = topo.node_mask(node);
        if mask.is_empty() {
            return Err(PoolError::EmptyNode);
        }
        Self::with_config(mask.count(), Some(mask), Some(node), cfg)
    }

    /// Like `for_node`, with one CPU carved out (typically the
    /// orchestrator's). Capacity shrinks only if the CPU was in the mask.
    pub fn for_node_excluding<T: Topology>(topo: &T, node: u32, cpu: usize) -> PoolResult<Self> {
        Self::for_node_excluding_with_config(topo, node, cpu, PoolConfig::from_env())
    }

    pub fn for_node_excluding_with_config<T: Topology>(
        topo: &T,
        node: u32,
        cpu: usize,
        cfg: PoolConfig,
    ) -> PoolResult<Self> {
        let mut mask = topo.node_mask(node);
        mask.clear(cpu);
        if mask.is_empty() {
            return Err(PoolError::EmptyNode);
        }
        Self::with_config(mask.count(), Some(mask), Some(node), cfg)
    }

    /// Publish a batch: one job per record in `args`, all running
    /// `kernel`. The previous batch must have been joined.
    pub fn dispatch(&mut self, kernel: KernelFn, args: &[JobArgs]) {
        let n = args.len();
        debug_assert!(self.valid);
        debug_assert!(n >= 1 && n <= self.capacity());

        let shared = self.shared();
        debug_assert_eq!(shared.work_done.load(Ordering::Acquire), 0);

        unsafe {
            core::ptr::copy_nonoverlapping(args.as_ptr(), self.args, n);
        }
        shared
            .func_ptr
            .store(kernel as usize as u64, Ordering::Relaxed);
        shared.work_done.store(n as i32, Ordering::Relaxed);
        shared.work_available.store(n as i32, Ordering::Release);
        unsafe {
            sys::futex_wake(&shared.work_available, n as i32, true);
        }
    }

    /// Checked dispatch: surfaces the programming errors `dispatch`
    /// only debug-asserts on.
    pub fn try_dispatch(&mut self, kernel: KernelFn, args: &[JobArgs]) -> PoolResult<()> {
        if !self.valid {
            return Err(PoolError::InvalidPool);
        }
        if args.is_empty() || args.len() > self.capacity() {
            return Err(PoolError::BatchTooLarge);
        }
        if self.shared().work_done.load(Ordering::Acquire) != 0 {
            return Err(PoolError::BatchInFlight);
        }
        self.dispatch(kernel, args);
        Ok(())
    }

    /// Wait until every job of the current batch has returned.
    ///
    /// Pure spin: batches are short, and the acquire load on the zero
    /// observation makes all job side effects visible.
    pub fn join(&self) {
        let shared = self.shared();
        while shared.work_done.load(Ordering::Acquire) != 0 {
            arch::cpu_relax();
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Debug query on the backing arena's NUMA placement
    pub fn verify_placement(&self) -> bool {
        self.arena.verify_placement()
    }

    #[inline]
    pub fn cpu_mask(&self) -> Option<&CpuMask> {
        self.cpu_mask.as_ref()
    }

    #[inline]
    fn shared(&self) -> &SharedBlock {
        unsafe { &*self.shared }
    }

    /// The single-CPU mask worker `i` pins to: the i-th CPU of the pool
    /// mask, wrapping when the pool is oversubscribed relative to it.
    fn worker_cpu(&self, i: usize) -> CpuMask {
        match &self.cpu_mask {
            Some(mask) if self.cfg.pin_workers => {
                let count = mask.count();
                match mask.nth(i % count) {
                    Some(cpu) => CpuMask::single(cpu),
                    None => CpuMask::new(),
                }
            }
            _ => CpuMask::new(),
        }
    }

    /// Shutdown and wait for every spawned worker's tid word to clear.
    fn reap_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        let shared = self.shared();
        shared.shutdown.store(1, Ordering::Release);
        unsafe {
            sys::futex_wake(&shared.work_available, self.capacity() as i32, true);
        }

        // The kernel's exit-time wake on a CHILD_CLEARTID word goes
        // through the shared futex bucket, so these waits are
        // non-private. Vectored wait covers the many-worker case.
        loop {
            let mut live: Vec<sys::FutexWaitv> = Vec::with_capacity(self.workers.len());
            for w in &self.workers {
                let tid = unsafe { (*w.child_tid).load(Ordering::Acquire) };
                if tid != 0 {
                    live.push(sys::FutexWaitv {
                        val: tid as u32 as u64,
                        uaddr: w.child_tid as u64,
                        flags: sys::FUTEX_32,
                        reserved: 0,
                    });
                }
            }
            match live.len() {
                0 => break,
                1 => unsafe {
                    let uaddr = live[0].uaddr as *const AtomicI32;
                    sys::futex_wait(uaddr, live[0].val as i32, false);
                },
                n => unsafe {
                    // EAGAIN or a wake both mean "re-scan".
                    sys::futex_waitv(live.as_ptr(), n.min(sys::FUTEX_WAITV_MAX));
                },
            }
        }
        self.workers.clear();
        kdebug!("pool down");
    }
}

impl Drop for BurstPool {
    fn drop(&mut self) {
        if self.arena.is_valid() {
            self.reap_workers();
        }
        // Arena drop unmaps the whole region; nothing may reference it
        // past this point, which reap_workers just guaranteed.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed topology for factory tests, independent of the machine
    struct FakeTopo;

    impl Topology for FakeTopo {
        fn node_mask(&self, node: u32) -> CpuMask {
            match node {
                0 => [0usize, 1, 2, 3].into_iter().collect(),
                _ => CpuMask::new(),
            }
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = BurstPool::new(0, None, None).unwrap_err();
        assert!(matches!(err, PoolError::Memory(MemoryError::BadSlotCount)));
    }

    #[test]
    fn test_empty_mask_rejected() {
        let err = BurstPool::new(2, Some(CpuMask::new()), None).unwrap_err();
        assert!(matches!(err, PoolError::EmptyNode));
    }

    #[test]
    fn test_factory_unknown_node() {
        let err = BurstPool::for_node(&FakeTopo, 9).unwrap_err();
        assert!(matches!(err, PoolError::EmptyNode));
    }

    #[test]
    fn test_factory_exclusion_arithmetic() {
        // CPU 2 is on the fake node: capacity must shrink by one.
        let topo = FakeTopo;
        let mut mask = topo.node_mask(0);
        assert_eq!(mask.count(), 4);
        mask.clear(2);
        assert_eq!(mask.count(), 3);
        assert!(!mask.is_set(2));

        // CPU 17 is not: the mask is untouched.
        let mut mask = topo.node_mask(0);
        mask.clear(17);
        assert_eq!(mask.count(), 4);
    }
}
