//! # tbf - Thread-Safe Token-Bucket Rate Limiter
//!
//! A blocking token-bucket limiter for threaded programs. Each limiter
//! instance ("bucket") holds a capped number of tokens; a single background
//! thread tops every bucket up at a fixed cadence, and callers block in
//! `fetch` until tokens are available.
//!
//! ## The Token Bucket Algorithm
//!
//! ```text
//!     capacity = 100, rate = 10 per interval
//!
//!     t=0       [          ]   0   fetch(50) blocks
//!     tick 1    [█         ]  10   fetch(50) → 10
//!               [          ]   0
//!     return 5  [▌         ]   5
//!     tick 2    [█▌        ]  15
//!     ...       [██████████] 100   (never above capacity)
//! ```
//!
//! - **Tokens** = units of allowed work (bytes, requests, ...)
//! - **Capacity** = burst ceiling
//! - **Rate** = tokens added per refill interval
//!
//! ## Quick Start
//!
//! ```rust
//! use tbf::{LimiterConfig, TokenBucketLimiter};
//!
//! // Up to 16 buckets, refilled every 10ms
//! let limiter = TokenBucketLimiter::with_config(LimiterConfig::new(16, 10)).unwrap();
//!
//! let handle = limiter.create(10, 100).unwrap();
//! let granted = limiter.fetch(handle, 50).unwrap();   // blocks for the first tick
//! assert!(granted >= 1 && granted <= 50);
//!
//! // Give back what we could not use
//! limiter.return_tokens(handle, granted).unwrap();
//! limiter.destroy(handle).unwrap();
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Your Application      │
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │   TokenBucketLimiter    │
//!                    ├─────────────────────────┤
//!                    │  • create()             │
//!                    │  • fetch()              │
//!                    │  • return_tokens()      │
//!                    │  • destroy()            │
//!                    └──────────┬──────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │   Registry          │ ◄──── │   Refiller thread    │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • Fixed slot table  │       │ • Started lazily     │
//!     │ • Generation checks │       │ • Fixed cadence      │
//!     │ • Free list         │       │ • Cooperative stop   │
//!     └─────────────────────┘       └──────────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! `TokenBucketLimiter` is `Send + Sync`. Share it by reference inside
//! `std::thread::scope`, or wrap it in [`SharedLimiter`] (`Arc`).
//! `LimiterHandle` is `Copy` and can be passed freely between threads.
//!
//! ## Errors
//!
//! Every operation returns [`Result`]. Zero sizes are `InvalidArgument`, a full
//! registry is `ResourceExhausted`, and using a handle after `destroy` is
//! reported as `StaleHandle` instead of touching freed state.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

// Internal module
mod rate_limiter;

// Public re-exports
pub use rate_limiter::{
    BucketMetrics, LimiterConfig, LimiterError, LimiterHandle, RegistryStats, Result,
    TokenBucketLimiter, DEFAULT_MAX_LIMITERS, DEFAULT_REFILL_INTERVAL_MS, DEFAULT_THREAD_NAME,
};

/// A limiter wrapped in `Arc` for sharing across spawned threads.
///
/// # Example
/// ```rust
/// use tbf::{SharedLimiter, TokenBucketLimiter};
/// use std::sync::Arc;
///
/// let shared: SharedLimiter = Arc::new(TokenBucketLimiter::new());
/// let handle = shared.create(100, 100).unwrap();
///
/// let worker = {
///     let shared = shared.clone();
///     std::thread::spawn(move || shared.return_tokens(handle, 10))
/// };
/// assert_eq!(worker.join().unwrap().unwrap(), 10);
/// ```
pub type SharedLimiter = std::sync::Arc<TokenBucketLimiter>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
///
/// `std::sync::OnceLock` and `let ... else` need at least 1.70.
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use tbf::prelude::*;
///
/// let limiter = TokenBucketLimiter::new();
/// let config = LimiterConfig::default();
/// ```
pub mod prelude {
    //! Common imports for typical rate limiting use cases.

    pub use crate::{
        BucketMetrics, LimiterConfig, LimiterError, LimiterHandle, RegistryStats,
        SharedLimiter, TokenBucketLimiter, TokenBucketLimiterBuilder,
    };
}

/// Builder for [`TokenBucketLimiter`].
///
/// # Example
///
/// ```rust
/// use tbf::TokenBucketLimiterBuilder;
///
/// let limiter = TokenBucketLimiterBuilder::new()
///     .max_limiters(64)             // at most 64 live buckets
///     .refill_interval_ms(100)      // ten sweeps per second
///     .thread_name("io-throttle")
///     .build()
///     .unwrap();
/// assert_eq!(limiter.max_limiters(), 64);
///
/// // Invalid settings are reported, not panicked on
/// let result = TokenBucketLimiterBuilder::new().max_limiters(0).build();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TokenBucketLimiterBuilder {
    config: LimiterConfig,
}

impl TokenBucketLimiterBuilder {
    /// Creates a builder with the default configuration
    /// (1024 buckets, 1000ms interval).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of live buckets (must be > 0).
    pub fn max_limiters(mut self, max: usize) -> Self {
        self.config.max_limiters = max;
        self
    }

    /// Sets the refill interval in milliseconds (must be > 0).
    pub fn refill_interval_ms(mut self, ms: u64) -> Self {
        self.config.refill_interval_ms = ms;
        self
    }

    /// Sets the name of the refiller thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Builds the limiter.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if any setting is out of range.
    pub fn build(self) -> Result<TokenBucketLimiter> {
        TokenBucketLimiter::with_config(self.config)
    }
}
