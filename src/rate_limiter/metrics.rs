//! # Metrics and Statistics
//!
//! Snapshots describing a single bucket ([`BucketMetrics`]) and the registry
//! as a whole ([`RegistryStats`]).
//!
//! ```text
//!     Token conservation for one bucket:
//!
//!     refills ──┐
//!               ├──► total_credited ──► tokens (in bucket)
//!     returns ──┘                   └──► total_granted (handed out)
//!
//!     total_credited == total_granted + tokens
//! ```
//!
//! Bucket snapshots are taken under the bucket's own lock, so every field in
//! one snapshot belongs to the same instant.

use std::fmt;

/// Point-in-time view of one bucket.
///
/// ## Example
///
/// ```rust
/// use tbf::TokenBucketLimiter;
///
/// let limiter = TokenBucketLimiter::new();
/// let handle = limiter.create(10, 100).unwrap();
/// limiter.return_tokens(handle, 5).unwrap();
///
/// let metrics = limiter.metrics(handle).unwrap();
/// assert_eq!(metrics.tokens, 5);
/// assert!(metrics.is_conserved());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketMetrics {
    /// Tokens currently held by the bucket.
    pub tokens: u64,

    /// Burst ceiling of the bucket.
    pub capacity: u64,

    /// Tokens added per refill interval.
    pub rate: u64,

    /// Sum of every amount handed out by `fetch` and its variants.
    pub total_granted: u64,

    /// Tokens actually added by refills and returns, after clamping.
    pub total_credited: u64,

    /// Tokens dropped because the bucket was already at capacity.
    pub total_discarded: u64,

    /// Number of refill sweeps this bucket has received.
    pub total_refills: u64,

    /// Number of fetch calls that had to wait for a token.
    pub total_waits: u64,
}

impl BucketMetrics {
    /// Checks the conservation law `credited == granted + tokens`.
    ///
    /// A bucket never hands out tokens it was not given.
    #[inline]
    pub fn is_conserved(&self) -> bool {
        self.total_credited == self.total_granted.saturating_add(self.tokens)
    }

    /// Fraction of the capacity currently filled, from 0.0 to 1.0.
    #[inline]
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.tokens as f64 / self.capacity as f64
        }
    }

    /// Returns `true` when the bucket holds no tokens.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens == 0
    }

    /// Returns a human-readable multi-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Token Bucket Metrics:\n\
             ├─ Tokens: {}/{} ({:.1}% full)\n\
             ├─ Rate: {} per interval\n\
             ├─ Granted: {}\n\
             ├─ Credited: {} (discarded {})\n\
             ├─ Refills: {}\n\
             └─ Waits: {}",
            self.tokens,
            self.capacity,
            self.fill_ratio() * 100.0,
            self.rate,
            self.total_granted,
            self.total_credited,
            self.total_discarded,
            self.total_refills,
            self.total_waits,
        )
    }
}

impl fmt::Display for BucketMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Statistics for the limiter registry.
///
/// - **active**: buckets currently registered
/// - **capacity**: configured slot count
/// - **total_created**: buckets registered since startup
/// - **total_destroyed**: buckets removed since startup
/// - **total_rejected**: `create` calls refused because the table was full
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live buckets.
    pub active: usize,

    /// Maximum number of live buckets.
    pub capacity: usize,

    /// Total buckets created since startup.
    pub total_created: u64,

    /// Total buckets destroyed since startup.
    pub total_destroyed: u64,

    /// Total creations rejected with `ResourceExhausted`.
    pub total_rejected: u64,
}

impl RegistryStats {
    /// Fraction of slots in use, from 0.0 to 1.0.
    pub fn capacity_used(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.active as f64 / self.capacity as f64
        }
    }

    /// Number of slots still free.
    pub fn available_slots(&self) -> usize {
        self.capacity.saturating_sub(self.active)
    }

    /// Returns `true` if more than 80% of slots are occupied.
    pub fn is_near_capacity(&self) -> bool {
        self.capacity_used() > 0.8
    }

    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Limiter Registry Stats:\n\
             ├─ Capacity:\n\
             │  ├─ Active: {}/{}\n\
             │  ├─ Capacity Used: {:.2}%\n\
             │  └─ Available Slots: {}\n\
             └─ Lifetime:\n\
                ├─ Total Created: {}\n\
                ├─ Total Destroyed: {}\n\
                └─ Total Rejected: {}",
            self.active,
            self.capacity,
            self.capacity_used() * 100.0,
            self.available_slots(),
            self.total_created,
            self.total_destroyed,
            self.total_rejected,
        )
    }
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
