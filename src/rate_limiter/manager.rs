//! # Token Bucket Limiter
//!
//! The client-facing entry point: an owned limiter subsystem that creates,
//! serves and destroys token buckets and runs the background refiller.
//!
//! ## Architecture
//!
//! ```text
//!     Client threads                 TokenBucketLimiter
//!
//!     create ───────┐          ┌──────────────────────────┐
//!     fetch ────────┤          │ Registry (slot table)    │
//!     return_tokens ┼────────► │  ┌──────┬──────┬──────┐  │
//!     destroy ──────┘          │  │  B0  │  --  │  B2  │  │
//!                              │  └──────┴──────┴──────┘  │
//!                              │            ▲             │
//!                              │            │ every tick  │
//!                              │     Refiller thread      │
//!                              └──────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. The first `create` starts the refiller thread. Concurrent first
//!    creators race through a one-time initializer, so exactly one thread is
//!    ever started per limiter.
//! 2. `fetch`/`return_tokens` run concurrently with the refiller sweep; all
//!    of them serialize on the bucket's own lock.
//! 3. `destroy` removes a bucket and wakes anyone still waiting on it.
//! 4. `shutdown` (or dropping the limiter) stops and joins the refiller and
//!    closes every remaining bucket.

use super::{
    config::LimiterConfig,
    core::{Bucket, CloseReason},
    error::{LimiterError, Result},
    metrics::{BucketMetrics, RegistryStats},
    refiller::Refiller,
    registry::{LimiterHandle, Registry},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

/// Thread-safe token-bucket limiter with a background refiller.
///
/// Share it between threads by reference (e.g. `std::thread::scope`) or via
/// [`Arc`]. Buckets are addressed through copyable [`LimiterHandle`]s.
///
/// ## Example
///
/// ```rust
/// use tbf::{LimiterConfig, TokenBucketLimiter};
///
/// // Refill every 10ms so the example finishes quickly
/// let limiter = TokenBucketLimiter::with_config(LimiterConfig::new(8, 10)).unwrap();
///
/// // 10 tokens per interval, bursts up to 100
/// let handle = limiter.create(10, 100).unwrap();
///
/// // Blocks until the first refill, then grants at most 50
/// let granted = limiter.fetch(handle, 50).unwrap();
/// assert!((1..=50).contains(&granted));
///
/// limiter.destroy(handle).unwrap();
/// ```
///
/// ## Consumer Pattern
///
/// A throttled reader asks for a byte budget before each read and gives back
/// what it did not use:
///
/// ```rust
/// use std::io::Read;
/// use tbf::{LimiterConfig, TokenBucketLimiter};
///
/// let limiter = TokenBucketLimiter::with_config(LimiterConfig::new(1, 5)).unwrap();
/// let handle = limiter.create(64, 256).unwrap();
///
/// let mut source: &[u8] = b"hello, throttled world";
/// let mut buf = [0u8; 32];
/// let mut copied = Vec::new();
/// loop {
///     let budget = limiter.fetch(handle, buf.len() as u64).unwrap() as usize;
///     let n = source.read(&mut buf[..budget]).unwrap();
///     if n < budget {
///         limiter.return_tokens(handle, (budget - n) as u64).unwrap();
///     }
///     if n == 0 {
///         break;
///     }
///     copied.extend_from_slice(&buf[..n]);
/// }
/// assert_eq!(copied, b"hello, throttled world");
/// ```
pub struct TokenBucketLimiter {
    /// Slot table shared with the refiller thread.
    registry: Arc<Registry>,

    /// Started on the first `create`.
    refiller: OnceLock<Refiller>,

    /// Serializes refiller startup against shutdown.
    refiller_init: Mutex<()>,

    /// Number of refiller threads ever spawned (0 or 1).
    #[cfg(test)]
    refiller_spawns: std::sync::atomic::AtomicUsize,

    shut_down: AtomicBool,

    config: LimiterConfig,
}

impl TokenBucketLimiter {
    /// Creates a limiter with the default configuration
    /// (1024 buckets, one refill per second).
    pub fn new() -> Self {
        Self::from_validated(LimiterConfig::default())
    }

    /// Creates a limiter with a custom configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration fails validation.
    pub fn with_config(config: LimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: LimiterConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new(config.max_limiters)),
            refiller: OnceLock::new(),
            refiller_init: Mutex::new(()),
            #[cfg(test)]
            refiller_spawns: std::sync::atomic::AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            config,
        }
    }

    /// Starts the refiller unless it is already running.
    ///
    /// Double-checked: the fast path reads the `OnceLock` without locking;
    /// the slow path holds `refiller_init` so only one thread ever spawns.
    fn ensure_refiller(&self) -> Result<&Refiller> {
        if let Some(refiller) = self.refiller.get() {
            return Ok(refiller);
        }

        let _init = self
            .refiller_init
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.shut_down.load(Ordering::Acquire) {
            return Err(LimiterError::ShutDown);
        }
        if let Some(refiller) = self.refiller.get() {
            return Ok(refiller);
        }

        let refiller = Refiller::spawn(
            self.registry.clone(),
            self.config.refill_interval(),
            &self.config.thread_name,
        )
        .map_err(|err| {
            error!("Could not start refiller thread: {}", err);
            LimiterError::from(err)
        })?;
        #[cfg(test)]
        self.refiller_spawns.fetch_add(1, Ordering::AcqRel);

        Ok(self.refiller.get_or_init(|| refiller))
    }

    /// Creates a new bucket holding zero tokens.
    ///
    /// The bucket gains `rate` tokens per refill interval, up to `capacity`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `rate` or `capacity` is 0
    /// - `ResourceExhausted` if `max_limiters` buckets are already live
    /// - `ShutDown` after [`shutdown`](Self::shutdown)
    /// - `Spawn` if the refiller thread could not be started
    pub fn create(&self, rate: u64, capacity: u64) -> Result<LimiterHandle> {
        if rate == 0 {
            return Err(LimiterError::InvalidArgument("rate must be greater than 0"));
        }
        if capacity == 0 {
            return Err(LimiterError::InvalidArgument(
                "capacity must be greater than 0",
            ));
        }
        if self.shut_down.load(Ordering::Acquire) {
            return Err(LimiterError::ShutDown);
        }

        self.ensure_refiller()?;
        let handle = self.registry.register(rate, capacity)?;

        // Lost a race with shutdown: undo the registration
        if self.shut_down.load(Ordering::Acquire) {
            if let Ok(bucket) = self.registry.unregister(handle) {
                bucket.close(CloseReason::ShutDown);
            }
            return Err(LimiterError::ShutDown);
        }

        Ok(handle)
    }

    #[inline]
    fn bucket(&self, handle: LimiterHandle) -> Result<Arc<Bucket>> {
        self.registry.get(handle)
    }

    /// Withdraws up to `requested` tokens, blocking while the bucket is empty.
    ///
    /// Returns the number granted, always between 1 and `requested`.
    /// There is no upper bound on the wait; use
    /// [`fetch_timeout`](Self::fetch_timeout) for one.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `requested` is 0
    /// - `StaleHandle` if the bucket is (or becomes) destroyed
    /// - `ShutDown` if the limiter shuts down while waiting
    pub fn fetch(&self, handle: LimiterHandle, requested: u64) -> Result<u64> {
        self.bucket(handle)?.fetch(requested)
    }

    /// Like [`fetch`](Self::fetch) but fails with `Timeout` after `timeout`.
    pub fn fetch_timeout(
        &self,
        handle: LimiterHandle,
        requested: u64,
        timeout: Duration,
    ) -> Result<u64> {
        self.bucket(handle)?.fetch_timeout(requested, timeout)
    }

    /// Non-blocking fetch. Returns `Ok(None)` if the bucket is empty.
    pub fn try_fetch(&self, handle: LimiterHandle, requested: u64) -> Result<Option<u64>> {
        self.bucket(handle)?.try_fetch(requested)
    }

    /// Gives `size` unused tokens back to the bucket.
    ///
    /// The bucket is clamped to its capacity; any excess is dropped. Returns
    /// `size` regardless of how much fit.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `size` is 0
    /// - `StaleHandle` if the bucket was destroyed
    pub fn return_tokens(&self, handle: LimiterHandle, size: u64) -> Result<u64> {
        self.bucket(handle)?.return_tokens(size)
    }

    /// Removes a bucket. The handle is invalid afterwards.
    ///
    /// Threads still blocked in `fetch` on this bucket wake up with
    /// `StaleHandle`.
    ///
    /// # Errors
    ///
    /// `StaleHandle` if the bucket was already destroyed.
    pub fn destroy(&self, handle: LimiterHandle) -> Result<()> {
        let bucket = self.registry.unregister(handle)?;
        bucket.close(CloseReason::Destroyed);
        Ok(())
    }

    /// Current token count of a bucket.
    pub fn available_tokens(&self, handle: LimiterHandle) -> Result<u64> {
        Ok(self.bucket(handle)?.tokens())
    }

    /// Snapshot of a bucket's counters.
    pub fn metrics(&self, handle: LimiterHandle) -> Result<BucketMetrics> {
        Ok(self.bucket(handle)?.metrics())
    }

    /// Registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Number of live buckets.
    #[inline]
    pub fn active_limiters(&self) -> usize {
        self.registry.len()
    }

    /// Maximum number of live buckets.
    #[inline]
    pub fn max_limiters(&self) -> usize {
        self.registry.capacity()
    }

    /// Returns `true` once the refiller has started and until it stops.
    pub fn is_refiller_running(&self) -> bool {
        self.refiller
            .get()
            .map(Refiller::is_running)
            .unwrap_or(false)
    }

    /// Number of refill sweeps completed.
    pub fn refill_ticks(&self) -> u64 {
        self.refiller.get().map(Refiller::ticks).unwrap_or(0)
    }

    /// The configuration this limiter was built with.
    #[inline]
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stops the refiller, joins it and closes every remaining bucket.
    ///
    /// Blocked fetchers wake up with `ShutDown`, and later `create` calls
    /// fail the same way. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        {
            let _init = self
                .refiller_init
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.shut_down.swap(true, Ordering::AcqRel) {
                return;
            }
        }

        if let Some(refiller) = self.refiller.get() {
            refiller.stop();
        }

        let drained = self.registry.drain();
        for bucket in &drained {
            bucket.close(CloseReason::ShutDown);
        }

        info!("Rate limiter shut down ({} buckets closed)", drained.len());
    }

    #[cfg(test)]
    pub(crate) fn refiller_spawns(&self) -> usize {
        self.refiller_spawns.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TokenBucketLimiter {
    fn drop(&mut self) {
        debug!("Dropping rate limiter");
        self.shutdown();
    }
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("active_limiters", &self.active_limiters())
            .field("max_limiters", &self.max_limiters())
            .field("refill_interval_ms", &self.config.refill_interval_ms)
            .field("refiller_running", &self.is_refiller_running())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
