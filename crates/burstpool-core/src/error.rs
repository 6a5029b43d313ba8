//! Error types for the burst pool

use core::fmt;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// A raw kernel error number, carried out of the syscall layer.
///
/// Raw syscalls return a negative machine word on failure; the wrapper
/// negates it into this newtype at the module boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Errno(pub i32);

impl Errno {
    /// Build from a raw syscall return value known to be negative
    #[inline]
    pub fn from_ret(ret: isize) -> Self {
        debug_assert!(ret < 0);
        Errno(-(ret as i32))
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errno {}", self.0)
    }
}

/// Errors that can occur in pool operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Memory mapping, binding, or protection failed
    Memory(MemoryError),

    /// Worker thread creation or setup failed
    Spawn(SpawnError),

    /// Operation on a pool that failed construction
    InvalidPool,

    /// More jobs than the pool has workers
    BatchTooLarge,

    /// Dispatch while the previous batch has not been joined
    BatchInFlight,

    /// NUMA node has no CPUs left after exclusion
    EmptyNode,

    /// Stack sizes the slot layout cannot express
    BadConfig,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Memory(e) => write!(f, "memory error: {}", e),
            PoolError::Spawn(e) => write!(f, "spawn error: {}", e),
            PoolError::InvalidPool => write!(f, "pool is not valid"),
            PoolError::BatchTooLarge => write!(f, "batch exceeds pool capacity"),
            PoolError::BatchInFlight => write!(f, "previous batch not joined"),
            PoolError::EmptyNode => write!(f, "node has no usable CPUs"),
            PoolError::BadConfig => write!(f, "invalid pool configuration"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    MapFailed(Errno),

    /// mprotect on a guard page failed
    ProtectFailed(Errno),

    /// mbind to the requested node failed
    BindFailed(Errno),

    /// madvise (huge page hint) failed
    AdviseFailed(Errno),

    /// Arena bump pointer would exceed the region
    ArenaExhausted,

    /// Arena construction failed (map, bind, or advise step)
    ArenaFailed,

    /// Zero or overflowing slot count
    BadSlotCount,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::MapFailed(e) => write!(f, "mmap failed: {}", e),
            MemoryError::ProtectFailed(e) => write!(f, "mprotect failed: {}", e),
            MemoryError::BindFailed(e) => write!(f, "mbind failed: {}", e),
            MemoryError::AdviseFailed(e) => write!(f, "madvise failed: {}", e),
            MemoryError::ArenaExhausted => write!(f, "arena exhausted"),
            MemoryError::ArenaFailed => write!(f, "arena construction failed"),
            MemoryError::BadSlotCount => write!(f, "bad slot count"),
        }
    }
}

impl From<MemoryError> for PoolError {
    fn from(e: MemoryError) -> Self {
        PoolError::Memory(e)
    }
}

/// Worker thread creation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// clone3 failed
    CloneFailed(Errno),

    /// sched_setaffinity failed
    AffinityFailed(Errno),

    /// Fault handler installation failed
    SignalSetupFailed(Errno),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::CloneFailed(e) => write!(f, "clone3 failed: {}", e),
            SpawnError::AffinityFailed(e) => write!(f, "set affinity failed: {}", e),
            SpawnError::SignalSetupFailed(e) => write!(f, "sigaction failed: {}", e),
        }
    }
}

impl From<SpawnError> for PoolError {
    fn from(e: SpawnError) -> Self {
        PoolError::Spawn(e)
    }
}
