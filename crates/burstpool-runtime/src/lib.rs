//! # burstpool-runtime
//!
//! Linux x86-64 runtime for the burstpool burst thread pool.
//!
//! This crate provides:
//! - Raw syscall surface and thread primitives (architecture-specific)
//! - NUMA-bound arena allocation
//! - Worker thread creation via clone3 with fabricated TLS
//! - The dispatch/claim/join protocol
//! - SIGSEGV fault handling on per-worker alt-stacks

#![allow(dead_code)]

pub mod arch;
pub mod config;
pub mod numa;
pub mod pool;
pub mod signal;
pub mod sys;
pub mod tls;
pub mod topology;
pub mod worker;

// Re-exports
pub use config::PoolConfig;
pub use numa::{ArenaOptions, NumaArena};
pub use pool::BurstPool;
pub use tls::{current_cpu, current_worker_id};
pub use topology::{SysTopology, Topology};

// Platform/architecture gate: the syscall ABI, the TLS register and the
// clone3 stack handoff below are written for exactly this target.
cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_arch = "x86_64"))] {
        // supported
    } else {
        compile_error!("burstpool supports only Linux on x86_64");
    }
}
