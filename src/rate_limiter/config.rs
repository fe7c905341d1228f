//! # Limiter Configuration
//!
//! Settings that apply to the whole limiter subsystem rather than to a single
//! bucket. They are fixed when the [`TokenBucketLimiter`](super::TokenBucketLimiter)
//! is constructed and cannot be resized afterwards.
//!
//! ```text
//!     LimiterConfig:
//!
//!     ┌──────────────────────────────────┐
//!     │ max_limiters: 1024               │ ← registry slots (hard ceiling)
//!     │ refill_interval_ms: 1000         │ ← refiller cadence
//!     │ thread_name: "tbf-refiller"      │ ← background thread name
//!     └──────────────────────────────────┘
//! ```
//!
//! Per-bucket parameters (rate and capacity) are passed to `create` instead.

use super::error::{LimiterError, Result};
use std::time::Duration;

/// Default number of concurrently live buckets.
pub const DEFAULT_MAX_LIMITERS: usize = 1024;

/// Default replenishment interval (one second).
pub const DEFAULT_REFILL_INTERVAL_MS: u64 = 1000;

/// Default name of the refiller thread.
pub const DEFAULT_THREAD_NAME: &str = "tbf-refiller";

/// Configuration for a [`TokenBucketLimiter`](super::TokenBucketLimiter).
///
/// ## Example
///
/// ```rust
/// use tbf::LimiterConfig;
///
/// // 16 buckets at most, refilled ten times per second
/// let config = LimiterConfig::new(16, 100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum number of buckets that may be alive at the same time.
    ///
    /// `create` fails with `ResourceExhausted` once this many are registered.
    pub max_limiters: usize,

    /// Milliseconds between two refill sweeps.
    ///
    /// Each bucket gains its `rate` once per interval.
    pub refill_interval_ms: u64,

    /// Name given to the background refiller thread.
    pub thread_name: String,
}

impl Default for LimiterConfig {
    /// 1024 buckets, one refill per second.
    fn default() -> Self {
        Self {
            max_limiters: DEFAULT_MAX_LIMITERS,
            refill_interval_ms: DEFAULT_REFILL_INTERVAL_MS,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl LimiterConfig {
    /// Creates a configuration with the given slot count and refill interval.
    pub fn new(max_limiters: usize, refill_interval_ms: u64) -> Self {
        Self {
            max_limiters,
            refill_interval_ms,
            ..Default::default()
        }
    }

    /// Sets the refiller thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// The refill interval as a [`Duration`].
    #[inline]
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidConfig`] if:
    /// - `max_limiters` is 0
    /// - `max_limiters` does not fit in a `u32` slot index
    /// - `refill_interval_ms` is 0
    /// - `thread_name` is empty or contains a NUL byte
    ///
    /// ```rust
    /// use tbf::LimiterConfig;
    ///
    /// let config = LimiterConfig::new(0, 1000);  // Invalid!
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.max_limiters == 0 {
            return Err(LimiterError::InvalidConfig(
                "max_limiters must be greater than 0",
            ));
        }

        if (self.max_limiters as u64) > u64::from(u32::MAX) {
            return Err(LimiterError::InvalidConfig(
                "max_limiters exceeds the slot index range (u32::MAX)",
            ));
        }

        if self.refill_interval_ms == 0 {
            return Err(LimiterError::InvalidConfig(
                "refill_interval_ms must be greater than 0",
            ));
        }

        if self.thread_name.is_empty() || self.thread_name.contains('\0') {
            return Err(LimiterError::InvalidConfig(
                "thread_name must be non-empty and free of NUL bytes",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LimiterConfig::default();
        assert_eq!(config.max_limiters, DEFAULT_MAX_LIMITERS);
        assert_eq!(config.refill_interval(), Duration::from_secs(1));
        assert_eq!(config.thread_name, "tbf-refiller");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(LimiterConfig::new(0, 1000).validate().is_err());
        assert!(LimiterConfig::new(8, 0).validate().is_err());
        assert!(LimiterConfig::new(8, 10).validate().is_ok());

        let bad_name = LimiterConfig::new(8, 10).with_thread_name("");
        assert!(matches!(
            bad_name.validate(),
            Err(LimiterError::InvalidConfig(_))
        ));

        let nul_name = LimiterConfig::new(8, 10).with_thread_name("a\0b");
        assert!(nul_name.validate().is_err());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_slot_range_validation() {
        let config = LimiterConfig::new(u32::MAX as usize + 1, 1000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_thread_name() {
        let config = LimiterConfig::new(4, 50).with_thread_name("copy-throttle");
        assert_eq!(config.thread_name, "copy-throttle");
        assert_eq!(config.refill_interval_ms, 50);
    }
}
