//! Echo demo - the smallest possible burst
//!
//! Four jobs, each writing its own value into its own output word.

use std::sync::atomic::{AtomicU64, Ordering};

use burstpool::{BurstPool, JobArgs};

unsafe extern "C" fn echo_kernel(out: u64, val: u64, _: u64, _: u64, _: u64, _: u64) {
    (*(out as *const AtomicU64)).store(val, Ordering::Release);
}

fn main() {
    println!("=== burstpool echo ===\n");

    let out: Vec<AtomicU64> = (0..4).map(|_| AtomicU64::new(0)).collect();
    let mut pool = BurstPool::new(4, None, None).expect("Failed to build pool");
    println!("Pool up, capacity {}", pool.capacity());

    let args: Vec<JobArgs> = (0..4)
        .map(|i| JobArgs::with(&out[i] as *const _ as u64, i as u64 + 1, 0, 0, 0, 0))
        .collect();

    pool.dispatch(echo_kernel, &args);
    pool.join();

    let values: Vec<u64> = out.iter().map(|a| a.load(Ordering::Acquire)).collect();
    println!("out = {:?}", values);
    assert_eq!(values, vec![1, 2, 3, 4]);
    println!("\n=== OK ===");
}
