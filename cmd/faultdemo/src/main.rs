//! Fault-path demo
//!
//! A job writes through a pointer into an unreadable page. The SIGSEGV
//! handler must print one diagnostic naming the worker and the faulting
//! address, and the process must die with exit code 139 (128 + SIGSEGV).
//!
//! Run it and check:
//!
//! ```text
//! $ cargo run -p burstpool-faultdemo; echo "exit: $?"
//! burstpool: SIGSEGV in worker 0: addr=0x... rip=0x... rsp=0x...
//! exit: 139
//! ```

use std::io::Write;

use burstpool::{BurstPool, JobArgs};

unsafe extern "C" fn crash_kernel(bad: u64, _: u64, _: u64, _: u64, _: u64, _: u64) {
    (bad as *mut u64).write_volatile(42);
}

fn main() {
    println!("=== burstpool faultdemo ===\n");

    // One unreadable page, standing in for a guard page.
    let bad = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            4096,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    assert_ne!(bad, libc::MAP_FAILED, "mmap failed");

    let mut pool = BurstPool::new(2, None, None).expect("Failed to build pool");

    println!("dispatching a job that writes to {:p}; expecting", bad);
    println!("one diagnostic line and exit code 139\n");
    std::io::stdout().flush().unwrap();

    let args = [JobArgs::with(bad as u64, 0, 0, 0, 0, 0)];
    pool.dispatch(crash_kernel, &args);
    pool.join();

    // The fault handler exits the process; reaching this line means the
    // demo failed.
    println!("still alive - fault handler did not fire");
    std::process::exit(1);
}
