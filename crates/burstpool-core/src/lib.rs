//! # burstpool-core
//!
//! Core types for the burstpool burst thread pool.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! All syscall and architecture-specific implementations are in
//! `burstpool-runtime`.
//!
//! ## Modules
//!
//! - `shared` - Shared coordination block (claim/completion counters)
//! - `args` - Fixed-size per-job argument packs
//! - `layout` - Per-worker slot and pool arena layout arithmetic
//! - `cpumask` - CPU affinity bitmask
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod args;
pub mod cpumask;
pub mod env;
pub mod error;
pub mod kprint;
pub mod layout;
pub mod shared;

// Re-exports for convenience
pub use args::{JobArgs, KernelFn};
pub use cpumask::CpuMask;
pub use env::{env_get, env_get_bool, env_get_opt};
pub use error::{Errno, MemoryError, PoolError, PoolResult, SpawnError};
pub use layout::{ArenaLayout, SlotLayout};
pub use shared::SharedBlock;

/// Constants for memory layout and the claim protocol
pub mod constants {
    /// Page size assumed throughout; slot offsets are computed against it
    pub const PAGE_SIZE: usize = 4096;

    /// Bytes of the parent's static thread-local image copied into each slot
    pub const TLS_IMAGE_SIZE: usize = 256;

    /// Bytes of the parent's thread-control block copied behind the image
    pub const TCB_SIZE: usize = 64;

    /// Sentinel stored next to the worker id; any other value read through
    /// the thread pointer means the caller is not a pool worker ("BRSTPOOL")
    pub const WORKER_MAGIC: u64 = 0x4252_5354_504f_4f4c;

    /// Worker id reported when the magic sentinel does not match
    pub const WORKER_NONE: i64 = -1;

    /// Default primary stack per worker (multiple of PAGE_SIZE)
    pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

    /// Default alternate signal stack per worker. SIGSTKSZ overflows once
    /// the handler starts formatting, hence the generous default.
    pub const DEFAULT_ALT_STACK_SIZE: usize = 64 * 1024;

    /// Claim-loop spin budget before falling back to a futex wait
    pub const DEFAULT_IDLE_SPINS: u32 = 1000;

    /// Cache line size for alignment
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Maximum CPUs representable in a CpuMask (matches kernel cpu_set_t)
    pub const MAX_CPUS: usize = 1024;
}
