//! Slot and arena layout arithmetic
//!
//! Each worker owns one contiguous, page-aligned slot inside the pool's
//! single mapping:
//!
//! ```text
//! 0x000: TLS image       (256 B) - copied from the parent thread
//! 0x100: TCB             (64 B)  - copied, then self-pointer patched
//! 0x140: child tid       (u32)   - kernel clears this on thread exit
//! 0x144: padding         (u32)
//! 0x148: worker id       (u64)
//! 0x150: magic sentinel  (u64)
//! 0x160: rseq area       (32 B, 32-aligned)
//!  ...   padding to page
//! 1 page  guard (PROT_NONE)
//! N pages primary stack (grows down)
//! 1 page  guard (PROT_NONE)
//! M pages alternate signal stack
//! ```
//!
//! The thread pointer is set to the TCB, so the TLS image sits at negative
//! offsets from it and the tid/id/magic words at small positive offsets.
//! The pool arena is the slots followed by the shared block and the
//! argument records.

use crate::constants::{PAGE_SIZE, TCB_SIZE, TLS_IMAGE_SIZE};
use crate::shared::SharedBlock;

/// Offset of the child-tid word from the thread pointer
pub const CHILD_TID_TP_OFFSET: usize = TCB_SIZE;

/// Offset of the worker-id word from the thread pointer
pub const WORKER_ID_TP_OFFSET: usize = TCB_SIZE + 8;

/// Offset of the magic sentinel from the thread pointer
pub const MAGIC_TP_OFFSET: usize = TCB_SIZE + 16;

/// Offset of the rseq area from the thread pointer (32-aligned)
pub const RSEQ_TP_OFFSET: usize = align_up(TCB_SIZE + 24, 32);

/// Bytes of the rseq ABI structure
pub const RSEQ_AREA_SIZE: usize = 32;

const fn align_up(v: usize, align: usize) -> usize {
    (v + align - 1) & !(align - 1)
}

/// Byte offsets of one worker slot, relative to the slot base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    /// TCB offset; the thread pointer is set here
    pub tcb: usize,
    /// Child-tid word
    pub child_tid: usize,
    /// Worker-id word
    pub worker_id: usize,
    /// Magic sentinel word
    pub magic: usize,
    /// rseq registration area
    pub rseq: usize,
    /// Lower guard page
    pub guard_low: usize,
    /// Primary stack base (lowest address)
    pub stack: usize,
    /// Primary stack top (one past the highest address)
    pub stack_top: usize,
    /// Upper guard page
    pub guard_high: usize,
    /// Alternate signal stack base
    pub alt_stack: usize,
    /// Alternate signal stack bytes
    pub alt_stack_size: usize,
    /// Total slot bytes, page aligned
    pub slot_size: usize,
}

impl SlotLayout {
    /// Compute the layout for the given stack sizes.
    ///
    /// Both sizes must be positive multiples of the page size; the caller
    /// validates user input before reaching this point.
    pub const fn new(stack_size: usize, alt_stack_size: usize) -> Self {
        debug_assert!(stack_size > 0 && stack_size % PAGE_SIZE == 0);
        debug_assert!(alt_stack_size > 0 && alt_stack_size % PAGE_SIZE == 0);

        let header_end = RSEQ_TP_OFFSET + TLS_IMAGE_SIZE + RSEQ_AREA_SIZE;
        let header = align_up(header_end, PAGE_SIZE);
        debug_assert!(header == PAGE_SIZE);

        let guard_low = header;
        let stack = guard_low + PAGE_SIZE;
        let stack_top = stack + stack_size;
        let guard_high = stack_top;
        let alt_stack = guard_high + PAGE_SIZE;
        let slot_size = align_up(alt_stack + alt_stack_size, PAGE_SIZE);

        Self {
            tcb: TLS_IMAGE_SIZE,
            child_tid: TLS_IMAGE_SIZE + CHILD_TID_TP_OFFSET,
            worker_id: TLS_IMAGE_SIZE + WORKER_ID_TP_OFFSET,
            magic: TLS_IMAGE_SIZE + MAGIC_TP_OFFSET,
            rseq: TLS_IMAGE_SIZE + RSEQ_TP_OFFSET,
            guard_low,
            stack,
            stack_top,
            guard_high,
            alt_stack,
            alt_stack_size,
            slot_size,
        }
    }
}

/// Byte offsets of the whole pool arena: slots, shared block, arg records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaLayout {
    pub slot: SlotLayout,
    /// Worker count
    pub capacity: usize,
    /// Shared coordination block
    pub shared: usize,
    /// First argument record
    pub args: usize,
    /// Total arena bytes, page aligned
    pub total_size: usize,
}

impl ArenaLayout {
    pub const fn new(capacity: usize, slot: SlotLayout) -> Self {
        let slots_end = capacity * slot.slot_size;
        let shared = slots_end;
        let args = shared + core::mem::size_of::<SharedBlock>();
        let total_size = align_up(args + capacity * 64, PAGE_SIZE);
        Self {
            slot,
            capacity,
            shared,
            args,
            total_size,
        }
    }

    /// Base offset of worker `i`'s slot
    #[inline]
    pub const fn slot_base(&self, i: usize) -> usize {
        i * self.slot.slot_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_ALT_STACK_SIZE, DEFAULT_STACK_SIZE};

    #[test]
    fn test_header_words() {
        let l = SlotLayout::new(DEFAULT_STACK_SIZE, DEFAULT_ALT_STACK_SIZE);
        assert_eq!(l.tcb, 256);
        assert_eq!(l.child_tid, 320);
        assert_eq!(l.worker_id, 328);
        assert_eq!(l.magic, 336);
        assert_eq!(l.rseq, 352);
        assert_eq!(l.rseq % 32, 0);
        // All header words live inside the header page, below the guard.
        assert!(l.rseq + RSEQ_AREA_SIZE <= l.guard_low);
    }

    #[test]
    fn test_tp_relative_offsets() {
        let l = SlotLayout::new(PAGE_SIZE, PAGE_SIZE);
        assert_eq!(l.child_tid - l.tcb, CHILD_TID_TP_OFFSET);
        assert_eq!(l.worker_id - l.tcb, WORKER_ID_TP_OFFSET);
        assert_eq!(l.magic - l.tcb, MAGIC_TP_OFFSET);
        assert_eq!(l.rseq - l.tcb, RSEQ_TP_OFFSET);
    }

    #[test]
    fn test_regions_ordered_and_page_aligned() {
        let stack = 8 * PAGE_SIZE;
        let alt = 16 * PAGE_SIZE;
        let l = SlotLayout::new(stack, alt);

        assert_eq!(l.guard_low, PAGE_SIZE);
        assert_eq!(l.stack, 2 * PAGE_SIZE);
        assert_eq!(l.stack_top - l.stack, stack);
        assert_eq!(l.guard_high, l.stack_top);
        assert_eq!(l.alt_stack, l.guard_high + PAGE_SIZE);
        assert_eq!(l.slot_size % PAGE_SIZE, 0);
        assert_eq!(l.slot_size, l.alt_stack + alt);
    }

    #[test]
    fn test_arena_layout() {
        let slot = SlotLayout::new(PAGE_SIZE, PAGE_SIZE);
        let a = ArenaLayout::new(4, slot);

        assert_eq!(a.slot_base(0), 0);
        assert_eq!(a.slot_base(3), 3 * slot.slot_size);
        assert_eq!(a.shared, 4 * slot.slot_size);
        assert_eq!(a.args - a.shared, 128);
        assert_eq!(a.args % 64, 0);
        assert_eq!(a.total_size % PAGE_SIZE, 0);
        assert!(a.total_size >= a.args + 4 * 64);
    }
}
