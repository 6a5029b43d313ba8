//! Worker thread entry and the claim loop
//!
//! Workers are raw clone3 threads. The parent writes a `StartHeader` at
//! the top of the worker's primary stack with the entry address in the
//! word below it; after the syscall the child `ret`-pops the entry and
//! begins executing with the stack pointer on the header. The naked
//! entry hands that pointer to `worker_main`, which fabricates the
//! thread's TLS from the parent's image before any other Rust code runs.

use core::sync::atomic::Ordering;

use burstpool_core::args::{JobArgs, KernelFn};
use burstpool_core::constants::{TCB_SIZE, TLS_IMAGE_SIZE, WORKER_MAGIC};
use burstpool_core::cpumask::{CpuMask, MASK_WORDS};
use burstpool_core::error::Errno;
use burstpool_core::layout::{RSEQ_AREA_SIZE, SlotLayout};
use burstpool_core::shared::SharedBlock;

use crate::arch::current as arch;
use crate::arch::current::CloneArgs;
use crate::sys;

/// Startup parameters the parent writes at the top of a worker's stack
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StartHeader {
    pub slot_base: u64,
    pub worker_id: u64,
    /// Parent's thread pointer; the TLS image is copied from below it
    pub parent_tp: u64,
    pub shared: u64,
    pub args: u64,
    pub alt_stack_base: u64,
    pub alt_stack_size: u64,
    pub spin_budget: u32,
    /// Futex flavor for the claim-loop wait (non-zero = process-private)
    pub futex_private: u32,
    pub pinned: u32,
    pub _pad: u32,
    pub cpu_mask: [u64; MASK_WORDS],
}

/// Everything the parent needs to spawn one worker
pub struct SpawnSpec {
    pub slot_base: *mut u8,
    pub layout: SlotLayout,
    pub worker_id: u64,
    pub shared: *const SharedBlock,
    pub args: *const JobArgs,
    pub spin_budget: u32,
    pub pinned: bool,
    pub cpu_mask: CpuMask,
}

/// Clone flags: a thread sharing everything, with kernel-set TLS, the
/// parent told the tid, and the tid word cleared-and-woken on exit.
const WORKER_CLONE_FLAGS: u64 = (libc::CLONE_VM
    | libc::CLONE_FS
    | libc::CLONE_FILES
    | libc::CLONE_SIGHAND
    | libc::CLONE_THREAD
    | libc::CLONE_SYSVSEM
    | libc::CLONE_SETTLS
    | libc::CLONE_PARENT_SETTID
    | libc::CLONE_CHILD_CLEARTID) as u64;

/// Spawn one worker. Returns the child tid.
///
/// # Safety
///
/// The slot behind `spec.slot_base` must be laid out per `spec.layout`,
/// with guard pages already protected, and must outlive the worker.
pub unsafe fn spawn_worker(spec: &SpawnSpec) -> Result<i32, Errno> {
    let slot = spec.slot_base;
    let l = &spec.layout;
    let stack_top = slot.add(l.stack_top);

    // Header at the stack top, 16-aligned; entry word right below it.
    let hdr_size = core::mem::size_of::<StartHeader>();
    let hdr_addr = ((stack_top as usize - hdr_size) & !15) as *mut StartHeader;
    hdr_addr.write(StartHeader {
        slot_base: slot as u64,
        worker_id: spec.worker_id,
        parent_tp: arch::thread_pointer(),
        shared: spec.shared as u64,
        args: spec.args as u64,
        alt_stack_base: slot.add(l.alt_stack) as u64,
        alt_stack_size: l.alt_stack_size as u64,
        spin_budget: spec.spin_budget,
        futex_private: 1,
        pinned: spec.pinned as u32,
        _pad: 0,
        cpu_mask: *spec.cpu_mask.as_words(),
    });

    let entry_slot = (hdr_addr as *mut u64).sub(1);
    entry_slot.write(worker_entry as usize as u64);

    let stack_low = slot.add(l.stack);
    let tid_word = slot.add(l.child_tid);
    let cl = CloneArgs {
        flags: WORKER_CLONE_FLAGS,
        pidfd: 0,
        child_tid: tid_word as u64,
        parent_tid: tid_word as u64,
        exit_signal: 0,
        stack: stack_low as u64,
        stack_size: entry_slot as u64 - stack_low as u64,
        tls: slot.add(l.tcb) as u64,
        set_tid: 0,
        set_tid_size: 0,
        cgroup: 0,
    };

    sys::check(sys::clone3(&cl)).map(|tid| tid as i32)
}

/// First instructions of a worker: the child arrives here from the
/// clone3 `ret` with rsp on the StartHeader.
#[unsafe(naked)]
unsafe extern "C" fn worker_entry() -> ! {
    core::arch::naked_asm!(
        "mov rdi, rsp",
        "and rsp, -16",
        "xor ebp, ebp",
        "call {main}",
        "ud2",
        main = sym worker_main,
    );
}

/// Body of every worker thread.
///
/// Runs with the kernel-set thread pointer aimed at the still-blank TCB,
/// so the TLS copy must come before anything that could touch
/// thread-local state (including panics).
unsafe extern "C" fn worker_main(hdr: *const StartHeader) -> ! {
    let hdr = *hdr;

    // 1. Fabricate TLS: copy the parent's static image and TCB, then
    //    point the TCB's first word at itself.
    let slot = hdr.slot_base as *mut u8;
    let src = (hdr.parent_tp as *const u8).sub(TLS_IMAGE_SIZE);
    core::ptr::copy_nonoverlapping(src, slot, TLS_IMAGE_SIZE + TCB_SIZE);
    let tcb = slot.add(TLS_IMAGE_SIZE) as *mut u64;
    tcb.write(tcb as u64);

    // 2. Publish identity for tls::current_worker_id and the fault handler.
    (slot.add(TLS_IMAGE_SIZE + burstpool_core::layout::WORKER_ID_TP_OFFSET) as *mut u64)
        .write(hdr.worker_id);
    (slot.add(TLS_IMAGE_SIZE + burstpool_core::layout::MAGIC_TP_OFFSET) as *mut u64)
        .write(WORKER_MAGIC);

    // 3. Alternate signal stack, so guard-page hits get reported.
    let ss = libc::stack_t {
        ss_sp: hdr.alt_stack_base as *mut libc::c_void,
        ss_flags: 0,
        ss_size: hdr.alt_stack_size as usize,
    };
    sys::sigaltstack(&ss);

    // 4. rseq registration; current_cpu degrades to -1 if this fails.
    let rseq_area = slot.add(TLS_IMAGE_SIZE + burstpool_core::layout::RSEQ_TP_OFFSET);
    sys::rseq(rseq_area, RSEQ_AREA_SIZE as u32, 0, sys::RSEQ_SIG);

    // 5. Optional pinning to the embedded mask.
    if hdr.pinned != 0 {
        sys::sched_setaffinity(hdr.cpu_mask.as_ptr(), CpuMask::byte_len());
    }

    claim_loop(
        &*(hdr.shared as *const SharedBlock),
        hdr.args as *const JobArgs,
        hdr.spin_budget,
        hdr.futex_private != 0,
    );

    // CLONE_CHILD_CLEARTID zeroes and wakes the tid word for us.
    sys::exit_thread(0)
}

/// Claim jobs until shutdown.
///
/// The monotonic pre-read keeps parked-and-empty passes from dirtying
/// the producer cache line; the claim itself is the acq_rel fetch_sub,
/// which pairs with the dispatcher's release store and makes the batch's
/// func_ptr and argument records visible.
unsafe fn claim_loop(shared: &SharedBlock, args: *const JobArgs, spin_budget: u32, private: bool) {
    let mut spins = 0u32;
    loop {
        if shared.shutdown.load(Ordering::Acquire) != 0 {
            return;
        }

        if shared.work_available.load(Ordering::Relaxed) > 0 {
            let old = shared.work_available.fetch_sub(1, Ordering::AcqRel);
            if old > 0 {
                let idx = (old - 1) as usize;
                let kernel: KernelFn =
                    core::mem::transmute(shared.func_ptr.load(Ordering::Relaxed) as usize);
                let rec = &*args.add(idx);
                kernel(
                    rec.slots[0],
                    rec.slots[1],
                    rec.slots[2],
                    rec.slots[3],
                    rec.slots[4],
                    rec.slots[5],
                );
                shared.work_done.fetch_sub(1, Ordering::AcqRel);
                spins = 0;
                continue;
            }
            // Lost the race and drove the counter negative. Put it back
            // to zero unless a new dispatch already landed.
            let _ = shared.work_available.compare_exchange(
                old - 1,
                0,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }

        if spins < spin_budget {
            spins += 1;
            arch::cpu_relax();
        } else {
            // Purely spinning here starves a descheduled sibling and can
            // deadlock work conservation; sleep until the next wake.
            sys::futex_wait(&shared.work_available, 0, private);
            spins = 0;
        }
    }
}
