//! NUMA-bound arena allocation
//!
//! One anonymous mapping, optionally bound to a single node and optionally
//! backed by transparent huge pages, handed out as aligned bump
//! allocations. An arena is never partially live: if any construction
//! step fails, everything already acquired is released and the arena
//! comes back empty.

use burstpool_core::constants::PAGE_SIZE;

use crate::sys;

/// Construction options for an arena
#[derive(Debug, Clone, Copy)]
pub struct ArenaOptions {
    /// Hint transparent-huge-page backing (MADV_HUGEPAGE)
    pub use_thp: bool,
    /// Fault pages in at map time (MAP_POPULATE)
    pub populate: bool,
    /// Skip swap reservation (MAP_NORESERVE)
    pub no_reserve: bool,
}

impl Default for ArenaOptions {
    fn default() -> Self {
        Self {
            use_thp: false,
            populate: false,
            no_reserve: false,
        }
    }
}

/// Bump allocator over one node-bound anonymous mapping
#[derive(Debug)]
pub struct NumaArena {
    base: *mut u8,
    size: usize,
    offset: usize,
    node: Option<u32>,
}

impl NumaArena {
    /// Map `size` bytes and bind them to `node`. Empty on any failure.
    pub fn bound(node: u32, size: usize, opts: ArenaOptions) -> Self {
        Self::build(Some(node), size, opts)
    }

    /// Map `size` bytes with the default allocation policy
    pub fn unbound(size: usize, opts: ArenaOptions) -> Self {
        Self::build(None, size, opts)
    }

    /// An arena that owns nothing
    pub const fn empty() -> Self {
        Self {
            base: core::ptr::null_mut(),
            size: 0,
            offset: 0,
            node: None,
        }
    }

    fn build(node: Option<u32>, size: usize, opts: ArenaOptions) -> Self {
        if size == 0 {
            return Self::empty();
        }
        let size = (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);

        let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        if opts.populate {
            flags |= libc::MAP_POPULATE;
        }
        if opts.no_reserve {
            flags |= libc::MAP_NORESERVE;
        }

        let ret = unsafe {
            sys::mmap(
                core::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if ret < 0 {
            return Self::empty();
        }
        let base = ret as *mut u8;

        if let Some(node) = node {
            // Singleton node set. MPOL_MF_MOVE migrates anything MAP_POPULATE
            // already faulted onto the wrong node.
            let mut nodemask = [0u64; 16];
            nodemask[node as usize / 64] = 1u64 << (node % 64);
            let ret = unsafe {
                sys::mbind(
                    base,
                    size,
                    sys::MPOL_BIND,
                    nodemask.as_ptr(),
                    nodemask.len() * 64,
                    sys::MPOL_MF_MOVE,
                )
            };
            if ret < 0 {
                unsafe { sys::munmap(base, size) };
                return Self::empty();
            }
        }

        if opts.use_thp {
            let ret = unsafe { sys::madvise(base, size, libc::MADV_HUGEPAGE) };
            if ret < 0 {
                unsafe { sys::munmap(base, size) };
                return Self::empty();
            }
        }

        Self {
            base,
            size,
            offset: 0,
            node,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.base.is_null()
    }

    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn node(&self) -> Option<u32> {
        self.node
    }

    /// Bump-allocate `count` values of `T`, aligned to `T` (at least 8).
    ///
    /// Returns null when the arena is empty or the region is exhausted.
    /// The memory is zeroed (fresh anonymous pages) on first use; reuse
    /// after `reset` returns whatever the previous tenant left.
    pub fn alloc<T>(&mut self, count: usize) -> *mut T {
        if !self.is_valid() {
            return core::ptr::null_mut();
        }
        let align = core::mem::align_of::<T>().max(8);
        let bytes = match core::mem::size_of::<T>().checked_mul(count) {
            Some(b) => b,
            None => return core::ptr::null_mut(),
        };

        let aligned = (self.offset + align - 1) & !(align - 1);
        let end = match aligned.checked_add(bytes) {
            Some(e) => e,
            None => return core::ptr::null_mut(),
        };
        if end > self.size {
            return core::ptr::null_mut();
        }

        self.offset = end;
        unsafe { self.base.add(aligned) as *mut T }
    }

    /// Current bump position, for scoped reuse
    #[inline]
    pub fn mark(&self) -> usize {
        self.offset
    }

    /// Roll the bump pointer back to a previous `mark`
    pub fn reset_to(&mut self, mark: usize) {
        debug_assert!(mark <= self.offset);
        self.offset = mark.min(self.offset);
    }

    /// Forget every allocation
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Debug query: does the first page actually reside on the bound node?
    ///
    /// True for unbound or empty arenas. The page must have been touched
    /// first, otherwise there is no physical placement to report.
    pub fn verify_placement(&self) -> bool {
        let (node, base) = match (self.node, self.is_valid()) {
            (Some(n), true) => (n, self.base),
            _ => return true,
        };
        let ret = unsafe { sys::get_mempolicy_node(base) };
        ret >= 0 && ret as u32 == node
    }
}

impl Drop for NumaArena {
    fn drop(&mut self) {
        if self.is_valid() {
            unsafe { sys::munmap(self.base, self.size) };
            self.base = core::ptr::null_mut();
        }
    }
}

// The arena is a plain region owner; sharing &NumaArena across threads
// only exposes the read-only queries.
unsafe impl Send for NumaArena {}
