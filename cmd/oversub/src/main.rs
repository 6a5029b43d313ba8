//! Oversubscription check
//!
//! Twice as many workers as CPUs. With workers spinning instead of
//! parking this configuration deadlocks work conservation; the futex
//! fallback in the claim loop is what makes these cycles finish.

use std::time::Instant;

use burstpool::{BurstPool, JobArgs};
use nix::unistd::{sysconf, SysconfVar};

unsafe extern "C" fn nop_kernel(_: u64, _: u64, _: u64, _: u64, _: u64, _: u64) {}

fn main() {
    println!("=== burstpool oversubscription ===\n");

    let cpus = sysconf(SysconfVar::_NPROCESSORS_ONLN)
        .ok()
        .flatten()
        .map(|n| n as usize)
        .unwrap_or(1);
    let capacity = 2 * cpus;
    println!("{} CPUs online, capacity {}", cpus, capacity);

    let mut pool = BurstPool::new(capacity, None, None).expect("Failed to build pool");
    let args = vec![JobArgs::new(); capacity];

    let start = Instant::now();
    for cycle in 0..10 {
        pool.dispatch(nop_kernel, &args);
        pool.join();
        println!("cycle {} done", cycle);
    }

    println!("\n10 cycles in {:?}", start.elapsed());
    println!("=== OK ===");
}
