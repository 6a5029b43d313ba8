//! Variable-load stress test
//!
//! Capacity 15, tiny 4K stacks, thousands of dispatch/join cycles with
//! batch sizes cycling through {15, 7, 1, 11, 15}. Every output word is
//! checked bit-exactly against the recomputed mix, and the worst
//! dispatch and join latencies are reported.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use burstpool::{BurstPool, JobArgs, PoolConfig};

const CAPACITY: usize = 15;

fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn expected(iter: u64, job: u64) -> u64 {
    mix64(iter ^ job).wrapping_add((iter + job).wrapping_mul(128) + 8128)
}

unsafe extern "C" fn mix_kernel(out: u64, iter: u64, job: u64, _: u64, _: u64, _: u64) {
    let v = mix64(iter ^ job).wrapping_add((iter + job).wrapping_mul(128) + 8128);
    (*(out as *const AtomicU64)).store(v, Ordering::Release);
}

fn main() {
    println!("=== burstpool stress ===\n");

    let iterations: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);

    println!(
        "capacity {}, stack 4K, {} iterations, batch sizes 15/7/1/11",
        CAPACITY, iterations
    );

    let cfg = PoolConfig::from_env().stack_size(4096).pin_workers(false);
    let out: Vec<AtomicU64> = (0..CAPACITY).map(|_| AtomicU64::new(0)).collect();
    let mut pool =
        BurstPool::with_config(CAPACITY, None, None, cfg).expect("Failed to build pool");

    let mut args = [JobArgs::new(); CAPACITY];
    let mut max_dispatch_ns: u128 = 0;
    let mut max_join_ns: u128 = 0;

    let start = Instant::now();
    for iter in 0..iterations {
        let num_jobs = match iter % 5 {
            0 => 15,
            1 => 7,
            2 => 1,
            3 => 11,
            _ => 15,
        };

        for j in 0..num_jobs {
            args[j] = JobArgs::with(&out[j] as *const _ as u64, iter, j as u64, 0, 0, 0);
        }

        let t0 = Instant::now();
        pool.dispatch(mix_kernel, &args[..num_jobs]);
        let t1 = Instant::now();
        pool.join();
        let t2 = Instant::now();

        max_dispatch_ns = max_dispatch_ns.max((t1 - t0).as_nanos());
        max_join_ns = max_join_ns.max((t2 - t1).as_nanos());

        for j in 0..num_jobs {
            let got = out[j].load(Ordering::Acquire);
            let want = expected(iter, j as u64);
            if got != want {
                println!(
                    "MISMATCH iter {} job {}: got {:#x} want {:#x}",
                    iter, j, got, want
                );
                std::process::exit(1);
            }
        }

        if (iter + 1) % 1000 == 0 {
            print!("\rIterations: {}/{}", iter + 1, iterations);
        }
    }
    let total = start.elapsed();

    println!("\n\n=== Results ===");
    println!("Iterations:      {}", iterations);
    println!("Total time:      {:?}", total);
    println!("Max dispatch:    {} ns", max_dispatch_ns);
    println!("Max join:        {} ns", max_join_ns);
    println!(
        "Mean cycle:      {:.0} ns",
        total.as_nanos() as f64 / iterations as f64
    );
    println!("\n=== Stress Test Complete ===");
}
