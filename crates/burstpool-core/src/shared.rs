//! Shared coordination block
//!
//! One block per pool, living inside the pool's arena mapping so workers
//! can hold raw pointers to it for the pool's whole lifetime.
//!
//! The layout splits producer-written and consumer-written words onto
//! separate cache lines:
//!
//! ```text
//! 0x00: work_available (i32) - jobs left to claim; claim = fetch_sub(1)
//! 0x04: shutdown       (i32) - non-zero tells workers to exit
//! 0x08: func_ptr       (u64) - kernel code address for the current batch
//! 0x10: padding to 64
//! 0x40: work_done      (i32) - jobs not yet finished; workers decrement
//! 0x44: padding to 128
//! ```
//!
//! The producer publishes a batch with a release store to `work_available`,
//! which carries the preceding plain stores to `func_ptr` and `work_done`.
//! Workers claim with `fetch_sub(AcqRel)` and report completion with
//! `fetch_sub(AcqRel)` on `work_done`, matched by the orchestrator's
//! acquire load in `join`.

use core::sync::atomic::{AtomicI32, AtomicU64};

use crate::constants::CACHE_LINE_SIZE;

/// Shared coordination block, two cache lines
#[repr(C, align(64))]
pub struct SharedBlock {
    /// Jobs still available to claim. May dip below zero momentarily when
    /// claims race; the losing claimant normalizes it back to zero.
    pub work_available: AtomicI32,

    /// Non-zero once the pool is tearing down
    pub shutdown: AtomicI32,

    /// Code address of the batch kernel, stored as a plain machine word
    pub func_ptr: AtomicU64,

    _pad0: [u8; CACHE_LINE_SIZE - 16],

    /// Jobs dispatched but not yet completed
    pub work_done: AtomicI32,

    _pad1: [u8; CACHE_LINE_SIZE - 4],
}

impl SharedBlock {
    /// A zeroed block: no work, no shutdown, no kernel
    pub const fn new() -> Self {
        Self {
            work_available: AtomicI32::new(0),
            shutdown: AtomicI32::new(0),
            func_ptr: AtomicU64::new(0),
            _pad0: [0; CACHE_LINE_SIZE - 16],
            work_done: AtomicI32::new(0),
            _pad1: [0; CACHE_LINE_SIZE - 4],
        }
    }
}

impl Default for SharedBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{align_of, offset_of, size_of};
    use core::sync::atomic::Ordering;

    #[test]
    fn test_layout() {
        assert_eq!(size_of::<SharedBlock>(), 2 * CACHE_LINE_SIZE);
        assert_eq!(align_of::<SharedBlock>(), CACHE_LINE_SIZE);
        assert_eq!(offset_of!(SharedBlock, work_available), 0x00);
        assert_eq!(offset_of!(SharedBlock, shutdown), 0x04);
        assert_eq!(offset_of!(SharedBlock, func_ptr), 0x08);
        assert_eq!(offset_of!(SharedBlock, work_done), 0x40);
    }

    #[test]
    fn test_initial_state() {
        let s = SharedBlock::new();
        assert_eq!(s.work_available.load(Ordering::Relaxed), 0);
        assert_eq!(s.shutdown.load(Ordering::Relaxed), 0);
        assert_eq!(s.func_ptr.load(Ordering::Relaxed), 0);
        assert_eq!(s.work_done.load(Ordering::Relaxed), 0);
    }

    /// Walks the counter algebra of a losing claim: the loser's fetch_sub
    /// drives the counter negative and its compare_exchange restores zero
    /// only if no dispatch intervened.
    #[test]
    fn test_losing_claim_normalization() {
        let s = SharedBlock::new();

        // Claim race on an empty counter: old == 0, counter goes to -1.
        let old = s.work_available.fetch_sub(1, Ordering::AcqRel);
        assert_eq!(old, 0);
        assert_eq!(s.work_available.load(Ordering::Relaxed), -1);

        // No dispatch intervened: CAS(old - 1 -> 0) succeeds.
        assert!(s
            .work_available
            .compare_exchange(old - 1, 0, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok());
        assert_eq!(s.work_available.load(Ordering::Relaxed), 0);

        // Same race, but a dispatch of 4 jobs lands before the CAS.
        let old = s.work_available.fetch_sub(1, Ordering::AcqRel);
        assert_eq!(old, 0);
        s.work_available.store(4, Ordering::Release);
        assert!(s
            .work_available
            .compare_exchange(old - 1, 0, Ordering::Relaxed, Ordering::Relaxed)
            .is_err());
        // The loser leaves the freshly published count untouched.
        assert_eq!(s.work_available.load(Ordering::Relaxed), 4);
    }
}
