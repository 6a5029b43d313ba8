//! Typed wrappers over the raw syscall surface
//!
//! Every wrapper returns the raw kernel result as `isize`: negative
//! values are negated errno. Conversion into `PoolError` happens at the
//! module boundaries that can name what failed, not here.

use core::sync::atomic::AtomicI32;

use burstpool_core::error::Errno;

use crate::arch::current as arch;
use crate::arch::current::CloneArgs;

/// Convert a raw syscall return into a Result
#[inline]
pub fn check(ret: isize) -> Result<isize, Errno> {
    if ret < 0 {
        Err(Errno::from_ret(ret))
    } else {
        Ok(ret)
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

pub unsafe fn mmap(
    addr: *mut u8,
    len: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: i64,
) -> isize {
    arch::syscall6(
        libc::SYS_mmap as isize,
        addr as isize,
        len as isize,
        prot as isize,
        flags as isize,
        fd as isize,
        offset as isize,
    )
}

pub unsafe fn munmap(addr: *mut u8, len: usize) -> isize {
    arch::syscall2(libc::SYS_munmap as isize, addr as isize, len as isize)
}

pub unsafe fn mprotect(addr: *mut u8, len: usize, prot: i32) -> isize {
    arch::syscall3(
        libc::SYS_mprotect as isize,
        addr as isize,
        len as isize,
        prot as isize,
    )
}

pub unsafe fn madvise(addr: *mut u8, len: usize, advice: i32) -> isize {
    arch::syscall3(
        libc::SYS_madvise as isize,
        addr as isize,
        len as isize,
        advice as isize,
    )
}

// Memory policy modes and flags (uapi/linux/mempolicy.h)
pub const MPOL_BIND: i32 = 2;
pub const MPOL_F_NODE: i32 = 1 << 0;
pub const MPOL_F_ADDR: i32 = 1 << 1;
pub const MPOL_MF_STRICT: i32 = 1 << 0;
pub const MPOL_MF_MOVE: i32 = 1 << 1;

/// Bind physical page allocation for a range to a node set
pub unsafe fn mbind(
    addr: *mut u8,
    len: usize,
    mode: i32,
    nodemask: *const u64,
    maxnode: usize,
    flags: i32,
) -> isize {
    arch::syscall6(
        libc::SYS_mbind as isize,
        addr as isize,
        len as isize,
        mode as isize,
        nodemask as isize,
        maxnode as isize,
        flags as isize,
    )
}

/// Query which node backs `addr` (MPOL_F_NODE | MPOL_F_ADDR)
pub unsafe fn get_mempolicy_node(addr: *const u8) -> isize {
    let mut node: i32 = -1;
    let ret = arch::syscall5(
        libc::SYS_get_mempolicy as isize,
        &mut node as *mut i32 as isize,
        0,
        0,
        addr as isize,
        (MPOL_F_NODE | MPOL_F_ADDR) as isize,
    );
    if ret < 0 {
        ret
    } else {
        node as isize
    }
}

// ---------------------------------------------------------------------------
// Futex
// ---------------------------------------------------------------------------

/// Wait on `uaddr` while it reads `expected`. Timeout-free.
///
/// `private` selects the process-private hash bucket; the child-tid
/// words must be waited on non-private because the kernel's thread-exit
/// wake goes through the shared bucket.
pub unsafe fn futex_wait(uaddr: *const AtomicI32, expected: i32, private: bool) -> isize {
    let op = libc::FUTEX_WAIT | if private { libc::FUTEX_PRIVATE_FLAG } else { 0 };
    arch::syscall6(
        libc::SYS_futex as isize,
        uaddr as isize,
        op as isize,
        expected as isize,
        0, // timeout
        0, // uaddr2
        0, // val3
    )
}

/// Wake up to `count` waiters on `uaddr`
pub unsafe fn futex_wake(uaddr: *const AtomicI32, count: i32, private: bool) -> isize {
    let op = libc::FUTEX_WAKE | if private { libc::FUTEX_PRIVATE_FLAG } else { 0 };
    arch::syscall6(
        libc::SYS_futex as isize,
        uaddr as isize,
        op as isize,
        count as isize,
        0,
        0,
        0,
    )
}

/// One entry of a vectored futex wait (struct futex_waitv)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FutexWaitv {
    pub val: u64,
    pub uaddr: u64,
    pub flags: u32,
    pub reserved: u32,
}

/// 32-bit futex word size flag for futex_waitv entries
pub const FUTEX_32: u32 = 2;

/// Maximum entries a single futex_waitv call accepts
pub const FUTEX_WAITV_MAX: usize = 128;

/// Wait on several addresses at once; returns the index of the woken
/// entry, or a negated errno (EAGAIN when some word already changed).
pub unsafe fn futex_waitv(waiters: *const FutexWaitv, nr: usize) -> isize {
    arch::syscall5(
        libc::SYS_futex_waitv as isize,
        waiters as isize,
        nr as isize,
        0, // flags
        0, // timeout
        libc::CLOCK_MONOTONIC as isize,
    )
}

// ---------------------------------------------------------------------------
// Threads and identity
// ---------------------------------------------------------------------------

pub fn gettid() -> i32 {
    unsafe { arch::syscall0(libc::SYS_gettid as isize) as i32 }
}

pub fn getpid() -> i32 {
    unsafe { arch::syscall0(libc::SYS_getpid as isize) as i32 }
}

/// Send a signal to one thread of a thread group
pub unsafe fn tgkill(tgid: i32, tid: i32, sig: i32) -> isize {
    arch::syscall3(
        libc::SYS_tgkill as isize,
        tgid as isize,
        tid as isize,
        sig as isize,
    )
}

/// Set the current thread's CPU affinity from a raw bitmask
pub unsafe fn sched_setaffinity(mask: *const u64, size: usize) -> isize {
    arch::syscall3(
        libc::SYS_sched_setaffinity as isize,
        0, // current thread
        size as isize,
        mask as isize,
    )
}

/// Registration signature for rseq (any constant; glibc's is reused so
/// debuggers recognize the abort handshake)
pub const RSEQ_SIG: u32 = 0x5305_3053;

/// Register an rseq area for the current thread
pub unsafe fn rseq(area: *mut u8, len: u32, flags: i32, sig: u32) -> isize {
    arch::syscall4(
        libc::SYS_rseq as isize,
        area as isize,
        len as isize,
        flags as isize,
        sig as isize,
    )
}

/// Spawn a thread with clone3; see `arch::clone3` for the stack handoff
pub unsafe fn clone3(args: *const CloneArgs) -> isize {
    arch::clone3(args, core::mem::size_of::<CloneArgs>())
}

/// Terminate the calling thread
pub unsafe fn exit_thread(code: i32) -> ! {
    arch::syscall1(libc::SYS_exit as isize, code as isize);
    core::hint::unreachable_unchecked()
}

/// Terminate the whole process
pub unsafe fn exit_group(code: i32) -> ! {
    arch::syscall1(libc::SYS_exit_group as isize, code as isize);
    core::hint::unreachable_unchecked()
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Kernel sigaction layout for rt_sigaction
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KernelSigaction {
    pub handler: usize,
    pub flags: u64,
    pub restorer: usize,
    pub mask: u64,
}

/// SA_RESTORER is mandatory for raw rt_sigaction on x86-64
pub const SA_RESTORER: u64 = 0x0400_0000;

pub unsafe fn rt_sigaction(sig: i32, act: *const KernelSigaction) -> isize {
    arch::syscall4(
        libc::SYS_rt_sigaction as isize,
        sig as isize,
        act as isize,
        0, // oldact
        8, // sigsetsize
    )
}

pub unsafe fn sigaltstack(ss: *const libc::stack_t) -> isize {
    arch::syscall2(libc::SYS_sigaltstack as isize, ss as isize, 0)
}

// ---------------------------------------------------------------------------
// Files (surface for ring-based loader clients)
// ---------------------------------------------------------------------------

pub unsafe fn openat(dirfd: i32, path: *const u8, flags: i32, mode: u32) -> isize {
    arch::syscall4(
        libc::SYS_openat as isize,
        dirfd as isize,
        path as isize,
        flags as isize,
        mode as isize,
    )
}

pub unsafe fn close(fd: i32) -> isize {
    arch::syscall1(libc::SYS_close as isize, fd as isize)
}

pub unsafe fn write(fd: i32, buf: *const u8, len: usize) -> isize {
    arch::syscall3(
        libc::SYS_write as isize,
        fd as isize,
        buf as isize,
        len as isize,
    )
}

/// Create an io_uring instance (submission-ring setup; loader clients only)
pub unsafe fn io_uring_setup(entries: u32, params: *mut u8) -> isize {
    arch::syscall2(
        libc::SYS_io_uring_setup as isize,
        entries as isize,
        params as isize,
    )
}
