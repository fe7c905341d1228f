//! # Token Bucket
//!
//! One rate-limiter instance. A bucket holds a capped count of tokens; the
//! refiller adds `rate` tokens every interval, clients withdraw them with
//! `fetch` and hand back unused ones with `return_tokens`.
//!
//! ```text
//!     Bucket (capacity = 100, rate = 10):
//!
//!     t=0      [                    ]   0/100   fetch(50) waits...
//!     tick 1   [██                  ]  10/100   ...fetch(50) returns 10
//!     after    [                    ]   0/100
//!     return 5 [█                   ]   5/100
//! ```
//!
//! ## Locking
//!
//! All three writers (fetch, return, refill) serialize on the bucket's own
//! mutex. A fetch that finds the bucket empty waits on the bucket's condition
//! variable, which releases the mutex until a refill, a return or a close
//! wakes it up. The mutex is never held across a wait.

use super::{
    error::{LimiterError, Result},
    metrics::BucketMetrics,
    registry::LimiterHandle,
};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

/// Why a bucket stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// Removed from the registry by `destroy`.
    Destroyed,
    /// The owning limiter was shut down.
    ShutDown,
}

/// Mutable part of a bucket, guarded by the bucket mutex.
#[derive(Debug, Default)]
struct BucketState {
    tokens: u64,
    closed: Option<CloseReason>,
    total_granted: u64,
    total_credited: u64,
    total_discarded: u64,
    total_refills: u64,
    total_waits: u64,
}

impl BucketState {
    /// Adds up to `n` tokens, clamped to `capacity`. Returns the amount added.
    #[inline]
    fn credit(&mut self, n: u64, capacity: u64) -> u64 {
        let added = n.min(capacity.saturating_sub(self.tokens));
        self.tokens += added;
        self.total_credited = self.total_credited.saturating_add(added);
        self.total_discarded = self.total_discarded.saturating_add(n - added);
        added
    }

    /// Withdraws `min(tokens, requested)`. Caller guarantees `tokens > 0`.
    #[inline]
    fn grant(&mut self, requested: u64) -> u64 {
        debug_assert!(self.tokens > 0);
        let granted = self.tokens.min(requested);
        self.tokens -= granted;
        self.total_granted = self.total_granted.saturating_add(granted);
        granted
    }
}

/// A single token bucket.
///
/// Buckets live inside the [`Registry`](super::registry::Registry) and are
/// reached through a [`LimiterHandle`]; clients never hold one directly.
pub(crate) struct Bucket {
    /// Registry position and generation of this bucket.
    handle: LimiterHandle,

    /// Tokens added per refill interval.
    rate: u64,

    /// Maximum tokens the bucket can hold (burst capacity).
    capacity: u64,

    state: Mutex<BucketState>,

    /// Signalled whenever tokens are added or the bucket is closed.
    available: Condvar,
}

impl Bucket {
    /// Creates an empty bucket. `rate` and `capacity` are validated by the caller.
    pub(crate) fn new(handle: LimiterHandle, rate: u64, capacity: u64) -> Self {
        debug_assert!(rate > 0 && capacity > 0);
        Self {
            handle,
            rate,
            capacity,
            state: Mutex::new(BucketState::default()),
            available: Condvar::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn handle(&self) -> LimiterHandle {
        self.handle
    }

    // Every critical section leaves the state consistent, so a poisoned lock
    // still guards valid data.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_error(&self, reason: CloseReason) -> LimiterError {
        match reason {
            CloseReason::Destroyed => LimiterError::StaleHandle(self.handle),
            CloseReason::ShutDown => LimiterError::ShutDown,
        }
    }

    fn check_requested(requested: u64) -> Result<()> {
        if requested == 0 {
            return Err(LimiterError::InvalidArgument(
                "requested tokens must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Blocks until at least one token is available, then withdraws
    /// `min(tokens, requested)` and returns it.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `requested` is 0 (bucket untouched)
    /// - `StaleHandle` if the bucket is destroyed while waiting
    /// - `ShutDown` if the limiter shuts down while waiting
    pub(crate) fn fetch(&self, requested: u64) -> Result<u64> {
        Self::check_requested(requested)?;

        let mut state = self.lock();
        let mut waited = false;
        loop {
            if let Some(reason) = state.closed {
                return Err(self.closed_error(reason));
            }
            if state.tokens > 0 {
                break;
            }
            if !waited {
                waited = true;
                state.total_waits += 1;
                trace!("Bucket {} empty, waiting for tokens", self.handle);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        Ok(state.grant(requested))
    }

    /// Like [`fetch`](Self::fetch) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Everything `fetch` reports, plus `Timeout` when no token showed up
    /// in time. A timed-out call leaves the bucket unchanged.
    pub(crate) fn fetch_timeout(&self, requested: u64, timeout: Duration) -> Result<u64> {
        Self::check_requested(requested)?;

        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        let mut state = self.lock();
        let mut waited = false;
        loop {
            if let Some(reason) = state.closed {
                return Err(self.closed_error(reason));
            }
            if state.tokens > 0 {
                break;
            }

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                // Timeout too large to represent; treat as unbounded.
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return Err(LimiterError::Timeout {
                    waited: start.elapsed(),
                });
            }

            if !waited {
                waited = true;
                state.total_waits += 1;
            }
            state = if remaining == Duration::MAX {
                self.available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner)
            } else {
                self.available
                    .wait_timeout(state, remaining)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            };
        }

        Ok(state.grant(requested))
    }

    /// Non-blocking fetch: `None` if the bucket is currently empty.
    pub(crate) fn try_fetch(&self, requested: u64) -> Result<Option<u64>> {
        Self::check_requested(requested)?;

        let mut state = self.lock();
        if let Some(reason) = state.closed {
            return Err(self.closed_error(reason));
        }
        if state.tokens == 0 {
            return Ok(None);
        }
        Ok(Some(state.grant(requested)))
    }

    /// Gives `size` tokens back, clamped to capacity. Returns `size`.
    ///
    /// Tokens above capacity are silently discarded.
    pub(crate) fn return_tokens(&self, size: u64) -> Result<u64> {
        if size == 0 {
            return Err(LimiterError::InvalidArgument(
                "returned tokens must be greater than 0",
            ));
        }

        let mut state = self.lock();
        if let Some(reason) = state.closed {
            return Err(self.closed_error(reason));
        }
        if state.credit(size, self.capacity) > 0 {
            self.available.notify_all();
        }
        Ok(size)
    }

    /// Adds one interval's worth of tokens. Called by the refiller sweep.
    ///
    /// Returns the number of tokens actually added.
    pub(crate) fn refill(&self) -> u64 {
        let mut state = self.lock();
        if state.closed.is_some() {
            return 0;
        }
        state.total_refills += 1;
        let added = state.credit(self.rate, self.capacity);
        if added > 0 {
            self.available.notify_all();
        }
        added
    }

    /// Marks the bucket closed and wakes every waiter.
    ///
    /// The first close wins; later calls keep the original reason.
    pub(crate) fn close(&self, reason: CloseReason) {
        let mut state = self.lock();
        if state.closed.is_none() {
            state.closed = Some(reason);
        }
        drop(state);
        self.available.notify_all();
    }

    /// Current token count.
    pub(crate) fn tokens(&self) -> u64 {
        self.lock().tokens
    }

    /// Consistent snapshot of the bucket.
    pub(crate) fn metrics(&self) -> BucketMetrics {
        let state = self.lock();
        BucketMetrics {
            tokens: state.tokens,
            capacity: self.capacity,
            rate: self.rate,
            total_granted: state.total_granted,
            total_credited: state.total_credited,
            total_discarded: state.total_discarded,
            total_refills: state.total_refills,
            total_waits: state.total_waits,
        }
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("handle", &self.handle)
            .field("rate", &self.rate)
            .field("capacity", &self.capacity)
            .field("tokens", &self.tokens())
            .finish()
    }
}
