//! # Background Refiller
//!
//! A single thread that tops up every live bucket once per refill interval.
//!
//! ```text
//!     refiller thread                      registry
//!     ───────────────                      ────────
//!     wait(interval) or stop ──stop──► exit loop
//!          │ timeout
//!          ▼
//!     for_each_active ───────────────► lock registry
//!          │                              for each bucket:
//!          │                                lock bucket
//!          │                                tokens = min(tokens + rate, capacity)
//!          │                                notify waiters
//!          │                                unlock bucket
//!          ▼                              unlock registry
//!     schedule next tick
//! ```
//!
//! Ticks are scheduled against a fixed timeline (`start + n * interval`), so
//! the time spent sweeping does not make the cadence drift. If a sweep
//! overruns, the next one starts immediately instead of piling up.
//!
//! Shutdown is cooperative: the owner sends a stop message (or drops the
//! sender), the loop notices it while waiting for the next tick, and the
//! owner joins the thread.

use super::registry::Registry;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

/// Handle to the running refiller thread.
pub(crate) struct Refiller {
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    ticks: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    interval: Duration,
}

impl Refiller {
    /// Starts the refiller thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub(crate) fn spawn(
        registry: Arc<Registry>,
        interval: Duration,
        thread_name: &str,
    ) -> io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let ticks = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let ticks = ticks.clone();
            let running = running.clone();
            thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || {
                    run(&registry, interval, &stop_rx, &ticks);
                    running.store(false, Ordering::Release);
                })?
        };

        info!(
            "Started refiller thread '{}' (interval: {}ms)",
            thread_name,
            interval.as_millis()
        );

        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
            ticks,
            running,
            interval,
        })
    }

    /// Signals the thread to stop and waits for it to exit.
    ///
    /// Returns `false` if the refiller had already been stopped.
    pub(crate) fn stop(&self) -> bool {
        let Some(stop_tx) = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return false;
        };

        // A send error only means the thread is already gone
        let _ = stop_tx.send(());
        drop(stop_tx);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Refiller thread panicked before shutdown");
            }
        }
        true
    }

    /// Returns `true` while the thread is running its loop.
    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of sweeps completed so far.
    #[inline]
    pub(crate) fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Refiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refiller")
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .field("interval", &self.interval)
            .finish()
    }
}

/// Refiller main loop.
fn run(registry: &Registry, interval: Duration, stop_rx: &mpsc::Receiver<()>, ticks: &AtomicU64) {
    let mut next_tick = Instant::now() + interval;

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(wait) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("Refiller thread stopping");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let (buckets, added) = sweep(registry);
                ticks.fetch_add(1, Ordering::AcqRel);
                trace!("Refill sweep: {} buckets, {} tokens added", buckets, added);

                next_tick += interval;
                let now = Instant::now();
                if next_tick < now {
                    warn!(
                        "Refill sweep overran its interval by {}ms",
                        now.duration_since(next_tick).as_millis()
                    );
                    next_tick = now;
                }
            }
        }
    }
}

/// Adds one interval's tokens to every live bucket.
///
/// Returns the number of buckets visited and the tokens added in total.
pub(crate) fn sweep(registry: &Registry) -> (usize, u64) {
    let mut added = 0u64;
    let buckets = registry.for_each_active(|bucket| {
        added = added.saturating_add(bucket.refill());
    });
    (buckets, added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_refills_every_bucket() {
        let registry = Registry::new(4);
        let a = registry.register(10, 100).unwrap();
        let b = registry.register(3, 5).unwrap();

        assert_eq!(sweep(&registry), (2, 13));
        assert_eq!(sweep(&registry), (2, 12));
        assert_eq!(registry.get(a).unwrap().tokens(), 20);
        assert_eq!(registry.get(b).unwrap().tokens(), 5);
    }

    #[test]
    fn test_sweep_empty_registry() {
        let registry = Registry::new(2);
        assert_eq!(sweep(&registry), (0, 0));
    }

    #[test]
    fn test_thread_ticks_and_stops() {
        let registry = Arc::new(Registry::new(2));
        let handle = registry.register(1, 1000).unwrap();

        let refiller = Refiller::spawn(registry.clone(), Duration::from_millis(10), "test-refiller")
            .unwrap();
        assert!(refiller.is_running());

        thread::sleep(Duration::from_millis(120));
        assert!(refiller.ticks() >= 3);
        assert!(registry.get(handle).unwrap().tokens() >= 3);

        assert!(refiller.stop());
        assert!(!refiller.is_running());
        assert!(!refiller.stop());

        // No more ticks after stop
        let ticks = refiller.ticks();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(refiller.ticks(), ticks);
    }

    #[test]
    fn test_stop_interrupts_long_interval() {
        let registry = Arc::new(Registry::new(1));
        let refiller =
            Refiller::spawn(registry, Duration::from_secs(3600), "test-refiller").unwrap();

        let start = Instant::now();
        assert!(refiller.stop());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(refiller.ticks(), 0);
    }
}
