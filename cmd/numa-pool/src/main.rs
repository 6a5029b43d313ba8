//! Node-local pool demo
//!
//! Builds a pool sized to one NUMA node with the orchestrator's CPU
//! carved out, then checks the arena actually landed on that node.

use std::sync::atomic::{AtomicU64, Ordering};

use burstpool::{BurstPool, JobArgs, SysTopology, Topology};

unsafe extern "C" fn touch_kernel(out: u64, _: u64, _: u64, _: u64, _: u64, _: u64) {
    (*(out as *const AtomicU64)).fetch_add(1, Ordering::AcqRel);
}

fn main() {
    println!("=== burstpool numa-pool ===\n");

    let node: u32 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let topo = SysTopology::new();
    let node_cpus = topo.cpus_on_node(node);
    if node_cpus == 0 {
        println!("node {} has no CPUs (or no NUMA sysfs); nothing to do", node);
        return;
    }

    let my_cpu = unsafe { libc::sched_getcpu() };
    println!("node {}: {} CPUs, orchestrator on CPU {}", node, node_cpus, my_cpu);

    let mut pool = match BurstPool::for_node_excluding(&topo, node, my_cpu as usize) {
        Ok(p) => p,
        Err(e) => {
            println!("pool construction failed: {}", e);
            std::process::exit(1);
        }
    };

    let expected = if topo.node_mask(node).is_set(my_cpu as usize) {
        node_cpus - 1
    } else {
        node_cpus
    };
    println!("capacity {} (expected {})", pool.capacity(), expected);
    assert_eq!(pool.capacity(), expected);

    // Touch the pool through a real batch, then check placement.
    let touched = AtomicU64::new(0);
    let args: Vec<JobArgs> =
        vec![JobArgs::with(&touched as *const _ as u64, 0, 0, 0, 0, 0); pool.capacity()];
    pool.dispatch(touch_kernel, &args);
    pool.join();
    println!("jobs run: {}", touched.load(Ordering::Acquire));

    println!("verify_placement: {}", pool.verify_placement());
    assert!(pool.verify_placement());
    println!("\n=== OK ===");
}
