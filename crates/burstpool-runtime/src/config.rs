//! Pool configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Environment Variables
//!
//! - `BP_STACK_SIZE` - primary stack bytes per worker (page multiple)
//! - `BP_ALT_STACK_SIZE` - alternate signal stack bytes (page multiple)
//! - `BP_IDLE_SPINS` - claim-loop spins before the futex fallback
//! - `BP_PIN_WORKERS` - pin workers to CPUs of the pool mask (0/1)
//! - `BP_USE_THP` - transparent-huge-page hint for pool arenas (0/1)

use burstpool_core::constants::{
    DEFAULT_ALT_STACK_SIZE, DEFAULT_IDLE_SPINS, DEFAULT_STACK_SIZE, PAGE_SIZE,
};
use burstpool_core::env::env_get;
use burstpool_core::error::{PoolError, PoolResult};

/// Pool configuration with builder methods.
///
/// Use `from_env()` to start with the defaults plus any environment
/// overrides, then adjust programmatically.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Primary stack bytes per worker
    pub stack_size: usize,
    /// Alternate signal stack bytes per worker
    pub alt_stack_size: usize,
    /// Claim-loop spin budget before a futex wait
    pub idle_spins: u32,
    /// Pin each worker to one CPU of the pool mask
    pub pin_workers: bool,
    /// Request transparent-huge-page backing for the pool arena
    pub use_thp: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get("BP_STACK_SIZE", DEFAULT_STACK_SIZE),
            alt_stack_size: env_get("BP_ALT_STACK_SIZE", DEFAULT_ALT_STACK_SIZE),
            idle_spins: env_get("BP_IDLE_SPINS", DEFAULT_IDLE_SPINS),
            pin_workers: env_get("BP_PIN_WORKERS", 1usize) != 0,
            use_thp: env_get("BP_USE_THP", 0usize) != 0,
        }
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn alt_stack_size(mut self, bytes: usize) -> Self {
        self.alt_stack_size = bytes;
        self
    }

    pub fn idle_spins(mut self, spins: u32) -> Self {
        self.idle_spins = spins;
        self
    }

    pub fn pin_workers(mut self, pin: bool) -> Self {
        self.pin_workers = pin;
        self
    }

    pub fn use_thp(mut self, thp: bool) -> Self {
        self.use_thp = thp;
        self
    }

    /// Reject stack sizes the slot layout cannot express
    pub fn validate(&self) -> PoolResult<()> {
        if self.stack_size == 0 || self.stack_size % PAGE_SIZE != 0 {
            return Err(PoolError::BadConfig);
        }
        if self.alt_stack_size == 0 || self.alt_stack_size % PAGE_SIZE != 0 {
            return Err(PoolError::BadConfig);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = PoolConfig::from_env();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.stack_size % PAGE_SIZE, 0);
    }

    #[test]
    fn test_builder() {
        let cfg = PoolConfig::from_env()
            .stack_size(8 * PAGE_SIZE)
            .idle_spins(10)
            .pin_workers(false);
        assert_eq!(cfg.stack_size, 8 * PAGE_SIZE);
        assert_eq!(cfg.idle_spins, 10);
        assert!(!cfg.pin_workers);
    }

    #[test]
    fn test_validate_rejects_unaligned_stack() {
        let cfg = PoolConfig::from_env().stack_size(PAGE_SIZE + 1);
        assert!(cfg.validate().is_err());

        let cfg = PoolConfig::from_env().stack_size(0);
        assert!(cfg.validate().is_err());

        let cfg = PoolConfig::from_env().alt_stack_size(100);
        assert!(cfg.validate().is_err());
    }
}
