//! End-to-end pool behavior
//!
//! Kernels in these tests only touch the memory their argument packs
//! point at; nothing on the worker path may use thread-local state.

use std::sync::atomic::{AtomicU64, Ordering};

use burstpool::{current_cpu, current_worker_id, BurstPool, CpuMask, JobArgs, PoolConfig};

unsafe extern "C" fn echo_kernel(out: u64, val: u64, _: u64, _: u64, _: u64, _: u64) {
    (*(out as *const AtomicU64)).store(val, Ordering::Release);
}

unsafe extern "C" fn add_kernel(counter: u64, val: u64, _: u64, _: u64, _: u64, _: u64) {
    (*(counter as *const AtomicU64)).fetch_add(val, Ordering::AcqRel);
}

unsafe extern "C" fn mul_kernel(out: u64, val: u64, _: u64, _: u64, _: u64, _: u64) {
    (*(out as *const AtomicU64)).store(val.wrapping_mul(3), Ordering::Release);
}

unsafe extern "C" fn nop_kernel(_: u64, _: u64, _: u64, _: u64, _: u64, _: u64) {}

unsafe extern "C" fn whoami_kernel(out: u64, _: u64, _: u64, _: u64, _: u64, _: u64) {
    let id = current_worker_id();
    (*(out as *const AtomicU64)).store(id as u64, Ordering::Release);
}

fn atomic_vec(n: usize) -> Vec<AtomicU64> {
    (0..n).map(|_| AtomicU64::new(0)).collect()
}

#[test]
fn echo_four_jobs() {
    let out = atomic_vec(4);
    let mut pool = BurstPool::new(4, None, None).expect("pool construction");
    assert!(pool.is_valid());
    assert_eq!(pool.capacity(), 4);

    let args: Vec<JobArgs> = (0..4)
        .map(|i| JobArgs::with(&out[i] as *const _ as u64, i as u64 + 1, 0, 0, 0, 0))
        .collect();

    pool.dispatch(echo_kernel, &args);
    pool.join();

    let values: Vec<u64> = out.iter().map(|a| a.load(Ordering::Acquire)).collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
}

#[test]
fn every_job_runs_exactly_once() {
    let counter = AtomicU64::new(0);
    let mut pool = BurstPool::new(6, None, None).expect("pool construction");

    let args: Vec<JobArgs> =
        vec![JobArgs::with(&counter as *const _ as u64, 1, 0, 0, 0, 0); 6];

    pool.dispatch(add_kernel, &args);
    pool.join();

    assert_eq!(counter.load(Ordering::Acquire), 6);
}

#[test]
fn dispatch_join_reentrancy() {
    const ITERS: u64 = 200;
    let counter = AtomicU64::new(0);
    let mut pool = BurstPool::new(4, None, None).expect("pool construction");

    let args: Vec<JobArgs> =
        vec![JobArgs::with(&counter as *const _ as u64, 1, 0, 0, 0, 0); 4];

    for _ in 0..ITERS {
        pool.dispatch(add_kernel, &args);
        pool.join();
    }

    assert_eq!(counter.load(Ordering::Acquire), ITERS * 4);
}

#[test]
fn partial_batches() {
    let counter = AtomicU64::new(0);
    let mut pool = BurstPool::new(8, None, None).expect("pool construction");

    let args: Vec<JobArgs> =
        vec![JobArgs::with(&counter as *const _ as u64, 1, 0, 0, 0, 0); 3];

    pool.dispatch(add_kernel, &args);
    pool.join();
    assert_eq!(counter.load(Ordering::Acquire), 3);

    // A single-job batch on the same pool.
    pool.dispatch(add_kernel, &args[..1]);
    pool.join();
    assert_eq!(counter.load(Ordering::Acquire), 4);
}

#[test]
fn alternating_kernels() {
    const ITERS: u64 = 500;
    let out = atomic_vec(2);
    let mut pool = BurstPool::new(2, None, None).expect("pool construction");

    for iter in 0..ITERS {
        let args: Vec<JobArgs> = (0..2)
            .map(|i| JobArgs::with(&out[i] as *const _ as u64, iter + i as u64, 0, 0, 0, 0))
            .collect();

        if iter % 2 == 0 {
            pool.dispatch(echo_kernel, &args);
            pool.join();
            for i in 0..2 {
                assert_eq!(out[i].load(Ordering::Acquire), iter + i as u64);
            }
        } else {
            pool.dispatch(mul_kernel, &args);
            pool.join();
            for i in 0..2 {
                assert_eq!(
                    out[i].load(Ordering::Acquire),
                    (iter + i as u64).wrapping_mul(3)
                );
            }
        }
    }
}

#[test]
fn oversubscription_makes_progress() {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let capacity = 2 * cpus;
    let mut pool = BurstPool::new(capacity, None, None).expect("pool construction");

    let args: Vec<JobArgs> = vec![JobArgs::new(); capacity];
    for _ in 0..10 {
        pool.dispatch(nop_kernel, &args);
        pool.join();
    }
}

#[test]
fn worker_ids_are_in_range() {
    let capacity = 4;
    let out = atomic_vec(capacity);
    let mut pool = BurstPool::new(capacity, None, None).expect("pool construction");

    let args: Vec<JobArgs> = (0..capacity)
        .map(|i| JobArgs::with(&out[i] as *const _ as u64, 0, 0, 0, 0, 0))
        .collect();

    pool.dispatch(whoami_kernel, &args);
    pool.join();

    for a in &out {
        let id = a.load(Ordering::Acquire) as i64;
        assert!(
            (0..capacity as i64).contains(&id),
            "worker id {} out of range",
            id
        );
    }
}

unsafe extern "C" fn cpu_kernel(out: u64, _: u64, _: u64, _: u64, _: u64, _: u64) {
    let cpu = current_cpu();
    (*(out as *const AtomicU64)).store(cpu as i64 as u64, Ordering::Release);
}

#[test]
fn single_bit_mask_pins_workers() {
    // CPU 0 always exists.
    let out = atomic_vec(2);
    let mut pool =
        BurstPool::new(2, Some(CpuMask::single(0)), None).expect("pool construction");

    let args: Vec<JobArgs> = (0..2)
        .map(|i| JobArgs::with(&out[i] as *const _ as u64, 0, 0, 0, 0, 0))
        .collect();

    pool.dispatch(cpu_kernel, &args);
    pool.join();

    for a in &out {
        let cpu = a.load(Ordering::Acquire) as i64;
        // -1 means the kernel refused rseq registration; the CPU is
        // unobservable then, but a real reading must be the set bit.
        assert!(cpu == 0 || cpu == -1, "worker ran on CPU {}", cpu);
    }
}

#[test]
fn off_worker_id_is_negative() {
    // The test thread is not a pool worker.
    assert_eq!(current_worker_id(), -1);
}

#[test]
fn try_dispatch_rejects_bad_batches() {
    use burstpool::PoolError;

    let counter = AtomicU64::new(0);
    let mut pool = BurstPool::new(2, None, None).expect("pool construction");

    let args: Vec<JobArgs> =
        vec![JobArgs::with(&counter as *const _ as u64, 1, 0, 0, 0, 0); 3];

    // Oversized and empty batches are refused.
    assert!(matches!(
        pool.try_dispatch(add_kernel, &args),
        Err(PoolError::BatchTooLarge)
    ));
    assert!(matches!(
        pool.try_dispatch(add_kernel, &[]),
        Err(PoolError::BatchTooLarge)
    ));

    // A well-formed batch goes through.
    pool.try_dispatch(add_kernel, &args[..2]).unwrap();
    pool.join();
    assert_eq!(counter.load(Ordering::Acquire), 2);
}

#[test]
fn drop_without_dispatch_terminates() {
    let pool = BurstPool::new(8, None, None).expect("pool construction");
    assert!(pool.is_valid());
    drop(pool);
}

#[test]
fn small_stack_variable_load() {
    const ITERS: u64 = 100;
    let capacity = 15;
    let cfg = PoolConfig::from_env()
        .stack_size(4096)
        .pin_workers(false);
    let out = atomic_vec(capacity);
    let mut pool =
        BurstPool::with_config(capacity, None, None, cfg).expect("pool construction");

    for iter in 0..ITERS {
        let num_jobs = match iter % 5 {
            0 => 15,
            1 => 7,
            2 => 1,
            3 => 11,
            _ => 15,
        };
        let args: Vec<JobArgs> = (0..num_jobs)
            .map(|j| JobArgs::with(&out[j] as *const _ as u64, iter, j as u64, 0, 0, 0))
            .collect();

        pool.dispatch(mix_kernel, &args);
        pool.join();

        for j in 0..num_jobs {
            let expect = mix64(iter ^ j as u64)
                .wrapping_add((iter + j as u64).wrapping_mul(128) + 8128);
            assert_eq!(
                out[j].load(Ordering::Acquire),
                expect,
                "iter {} job {}",
                iter,
                j
            );
        }
    }
}

fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

unsafe extern "C" fn mix_kernel(out: u64, iter: u64, job: u64, _: u64, _: u64, _: u64) {
    let v = mix64(iter ^ job).wrapping_add((iter + job).wrapping_mul(128) + 8128);
    (*(out as *const AtomicU64)).store(v, Ordering::Release);
}
