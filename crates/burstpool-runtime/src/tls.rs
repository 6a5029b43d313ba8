//! Worker identity through thread-pointer-relative storage
//!
//! There is no global tid-to-worker map. Each worker's slot stores its id
//! and a magic sentinel at fixed offsets from the thread pointer, so
//! "which worker am I" is one FS-relative load, and it works from any
//! context including kernels and the SIGSEGV handler.

use burstpool_core::constants::{WORKER_MAGIC, WORKER_NONE};
use burstpool_core::layout::{MAGIC_TP_OFFSET, RSEQ_TP_OFFSET, WORKER_ID_TP_OFFSET};

use crate::arch::current as arch;

const MAGIC_OFF: i32 = MAGIC_TP_OFFSET as i32;
const WORKER_ID_OFF: i32 = WORKER_ID_TP_OFFSET as i32;
const RSEQ_CPU_ID_OFF: i32 = RSEQ_TP_OFFSET as i32 + 4;

/// Current worker id, or -1 when the calling thread is not a pool worker.
///
/// On a non-worker thread the loads read harmlessly into the libc TCB,
/// where the magic cannot match.
#[inline]
pub fn current_worker_id() -> i64 {
    if arch::tls_load_i64::<MAGIC_OFF>() as u64 != WORKER_MAGIC {
        return WORKER_NONE;
    }
    arch::tls_load_i64::<WORKER_ID_OFF>()
}

/// Current CPU from the worker's rseq area, or -1 when unavailable
/// (non-worker caller, or the kernel refused rseq registration).
#[inline]
pub fn current_cpu() -> i32 {
    if arch::tls_load_i64::<MAGIC_OFF>() as u64 != WORKER_MAGIC {
        return -1;
    }
    arch::tls_load_i32::<RSEQ_CPU_ID_OFF>()
}
