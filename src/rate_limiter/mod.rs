//! # Rate Limiter Module
//!
//! Internal implementation of the token-bucket limiter.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (Subsystem-wide settings)
//!     ├── core.rs         (Single token bucket: fetch / return / refill)
//!     ├── error.rs        (LimiterError and Result)
//!     ├── manager.rs      (TokenBucketLimiter - the client API)
//!     ├── metrics.rs      (Bucket metrics and registry statistics)
//!     ├── refiller.rs     (Background refill thread)
//!     └── registry.rs     (Fixed-capacity slot table and handles)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     Client call
//!          │
//!          ▼
//!     ┌──────────┐
//!     │ Manager  │ ◄── create / fetch / return / destroy
//!     └────┬─────┘
//!          │
//!          ▼
//!     ┌──────────┐       ┌──────────┐
//!     │ Registry │ ◄──── │ Refiller │ ◄── periodic sweep
//!     └────┬─────┘       └──────────┘
//!          │
//!          ▼
//!     ┌──────────┐
//!     │  Bucket  │ ◄── per-bucket lock + condvar
//!     └──────────┘
//! ```

mod config;
mod core;
mod error;
mod manager;
mod metrics;
mod refiller;
mod registry;

/// Subsystem configuration and its defaults
pub use config::{
    LimiterConfig, DEFAULT_MAX_LIMITERS, DEFAULT_REFILL_INTERVAL_MS, DEFAULT_THREAD_NAME,
};

/// Error type and result alias
pub use error::{LimiterError, Result};

/// Client API
pub use manager::TokenBucketLimiter;

/// Observability snapshots
pub use metrics::{BucketMetrics, RegistryStats};

/// Bucket handles
pub use registry::LimiterHandle;
