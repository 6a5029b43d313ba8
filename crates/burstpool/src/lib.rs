//! # burstpool - Low-Latency Burst Thread Pool
//!
//! Dispatches short fan-out/fan-in "kernels" onto a fixed set of
//! persistent worker threads with minimum per-batch overhead.
//!
//! ## Features
//!
//! - **Raw workers**: spawned with clone3 directly, fabricated TLS, no
//!   pthread machinery on the worker path
//! - **Lock-free claim protocol**: one release store plus one futex wake
//!   per dispatch; workers claim job indices with a single fetch_sub
//! - **NUMA-bound**: stacks, completion words and argument packs fault
//!   local to a chosen node
//! - **Deterministic faults**: guard pages around every stack and a
//!   SIGSEGV handler on per-worker alt-stacks that names the worker
//!
//! ## Quick Start
//!
//! ```ignore
//! use burstpool::{BurstPool, JobArgs};
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! unsafe extern "C" fn echo(out: u64, val: u64, _: u64, _: u64, _: u64, _: u64) {
//!     (*(out as *const AtomicU64)).store(val, Ordering::Relaxed);
//! }
//!
//! fn main() {
//!     let out: Vec<AtomicU64> = (0..4).map(|_| AtomicU64::new(0)).collect();
//!     let mut pool = BurstPool::new(4, None, None).expect("pool");
//!
//!     let args: Vec<JobArgs> = (0..4)
//!         .map(|i| JobArgs::with(&out[i] as *const _ as u64, i as u64 + 1, 0, 0, 0, 0))
//!         .collect();
//!
//!     pool.dispatch(echo, &args);
//!     pool.join();
//!     // out == [1, 2, 3, 4]
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Orchestrator                            │
//! │        write args, store counters, one futex wake           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Shared block                             │
//! │   work_available | shutdown | func_ptr ║ work_done          │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                   ▲                   ▲
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Worker   │      │  Worker   │      │  Worker   │
//!    │ claim loop│      │ claim loop│      │ claim loop│
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!    ┌─────────────────────────────────────────────────────────┐
//!    │              NUMA-bound arena (one mapping)             │
//!    │  slot: TLS | tid/id/magic | guard | stack | guard | alt │
//!    └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Inside a kernel, [`current_worker_id`] reads the worker id from
//! thread-pointer-relative storage; it returns -1 on any thread that is
//! not a pool worker.

// Re-export core types
pub use burstpool_core::{
    constants,
    args::{JobArgs, KernelFn},
    cpumask::CpuMask,
    error::{Errno, MemoryError, PoolError, PoolResult, SpawnError},
};

// Re-export kprint macros for debug logging
pub use burstpool_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};
pub use burstpool_core::kprint::{
    init as init_logging, set_flush_enabled, set_log_level, set_time_enabled, LogLevel,
};

// Re-export env utilities
pub use burstpool_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use burstpool_runtime::{
    current_cpu, current_worker_id, ArenaOptions, BurstPool, NumaArena, PoolConfig, SysTopology,
    Topology,
};
