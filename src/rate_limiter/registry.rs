//! # Limiter Registry
//!
//! Fixed-capacity slot table that owns every live bucket. Slots are handed
//! out from a free list, so registering and unregistering are O(1) and the
//! table never grows past its configured size.
//!
//! ```text
//!     Registry (capacity = 4):
//!
//!     slot:   0        1        2        3
//!           ┌────────┬────────┬────────┬────────┐
//!           │ B gen0 │  ----  │ B gen2 │  ----  │
//!           └────────┴────────┴────────┴────────┘
//!     free list: [3, 1]        (pop → 1)
//! ```
//!
//! Each slot carries a generation counter that is bumped whenever its bucket
//! is removed. A [`LimiterHandle`] records the generation it was issued
//! with, so a handle used after `destroy` is caught instead of silently
//! reaching whichever bucket took over the slot. Handles also carry the id of
//! the registry that issued them; another limiter rejects them even when the
//! slot and generation happen to line up.
//!
//! ## Lock Order
//!
//! The registry mutex guards slot occupancy only. `for_each_active` takes the
//! registry mutex first and then each bucket's own mutex, one bucket at a
//! time. Client operations look a bucket up, release the registry mutex, and
//! only then touch the bucket, so no client ever waits for tokens while
//! holding the registry.

use super::{
    core::Bucket,
    error::{LimiterError, Result},
    metrics::RegistryStats,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Source of registry ids. Starts at 1 so that 0 never names a live registry.
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque reference to a bucket inside a limiter.
///
/// Handles are cheap to copy and may be shared between threads. A handle
/// stays valid until it is passed to `destroy`; afterwards every operation on
/// it fails with [`LimiterError::StaleHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LimiterHandle {
    registry: u64,
    slot: u32,
    generation: u64,
}

impl LimiterHandle {
    #[inline]
    pub(crate) fn new(registry: u64, slot: u32, generation: u64) -> Self {
        Self {
            registry,
            slot,
            generation,
        }
    }

    /// Registry slot occupied by the bucket.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    /// Generation of the slot when the handle was issued.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for LimiterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.slot, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    bucket: Option<Arc<Bucket>>,
}

#[derive(Debug)]
struct Table {
    /// Id stamped into every handle this table issues.
    registry: u64,
    slots: Vec<Slot>,
    /// Indices of empty slots; the next one handed out is at the end.
    free: Vec<u32>,
    total_created: u64,
    total_destroyed: u64,
    total_rejected: u64,
}

impl Table {
    fn active(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn slot(&self, handle: LimiterHandle) -> Result<&Slot> {
        if handle.registry != self.registry {
            return Err(LimiterError::StaleHandle(handle));
        }
        match self.slots.get(handle.slot()) {
            Some(slot) if slot.generation == handle.generation && slot.bucket.is_some() => {
                Ok(slot)
            }
            _ => Err(LimiterError::StaleHandle(handle)),
        }
    }
}

/// Slot table of live buckets.
pub(crate) struct Registry {
    table: Mutex<Table>,
    capacity: usize,
}

impl Registry {
    /// Creates an empty registry with `capacity` slots.
    ///
    /// `capacity` must fit in a `u32`; `LimiterConfig::validate` enforces it.
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);

        // Reversed so that a fresh registry hands out slot 0 first
        let free = (0..capacity as u32).rev().collect();

        Self {
            table: Mutex::new(Table {
                registry: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
                slots,
                free,
                total_created: 0,
                total_destroyed: 0,
                total_rejected: 0,
            }),
            capacity,
        }
    }

    // Slot bookkeeping is updated in single steps, so a poisoned table is
    // still consistent.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a bucket with zero tokens in the first free slot.
    ///
    /// # Errors
    ///
    /// `ResourceExhausted` when every slot is occupied. Nothing is allocated
    /// in that case.
    pub(crate) fn register(&self, rate: u64, capacity: u64) -> Result<LimiterHandle> {
        let mut table = self.lock();

        let Some(index) = table.free.pop() else {
            table.total_rejected += 1;
            warn!(
                "Limiter registry full ({} slots), rejecting new bucket",
                self.capacity
            );
            return Err(LimiterError::ResourceExhausted {
                capacity: self.capacity,
            });
        };

        let table = &mut *table;
        let slot = &mut table.slots[index as usize];
        let handle = LimiterHandle::new(table.registry, index, slot.generation);
        slot.bucket = Some(Arc::new(Bucket::new(handle, rate, capacity)));
        table.total_created += 1;

        debug!(
            "Registered bucket {} (rate: {}, capacity: {}, active: {})",
            handle,
            rate,
            capacity,
            table.active()
        );
        Ok(handle)
    }

    /// Removes the bucket behind `handle` and retires the handle.
    ///
    /// # Errors
    ///
    /// `StaleHandle` if the handle was already unregistered.
    pub(crate) fn unregister(&self, handle: LimiterHandle) -> Result<Arc<Bucket>> {
        let mut table = self.lock();
        table.slot(handle)?;

        let slot = &mut table.slots[handle.slot()];
        let bucket = slot.bucket.take().ok_or(LimiterError::StaleHandle(handle))?;
        slot.generation = slot.generation.wrapping_add(1);
        table.free.push(handle.slot);
        table.total_destroyed += 1;

        debug!(
            "Unregistered bucket {} (active: {})",
            handle,
            table.active()
        );
        Ok(bucket)
    }

    /// Looks up a live bucket.
    ///
    /// The registry lock is released before this returns, so callers may
    /// block on the bucket freely.
    pub(crate) fn get(&self, handle: LimiterHandle) -> Result<Arc<Bucket>> {
        let table = self.lock();
        let slot = table.slot(handle)?;
        slot.bucket
            .clone()
            .ok_or(LimiterError::StaleHandle(handle))
    }

    /// Applies `f` to every live bucket while holding the registry lock.
    ///
    /// Returns the number of buckets visited.
    pub(crate) fn for_each_active<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&Bucket),
    {
        let table = self.lock();
        let mut visited = 0;
        for bucket in table.slots.iter().filter_map(|slot| slot.bucket.as_deref()) {
            f(bucket);
            visited += 1;
        }
        visited
    }

    /// Removes every bucket and returns them. Used at shutdown.
    pub(crate) fn drain(&self) -> Vec<Arc<Bucket>> {
        let mut table = self.lock();
        let mut drained = Vec::with_capacity(table.active());

        for index in 0..table.slots.len() {
            let slot = &mut table.slots[index];
            if let Some(bucket) = slot.bucket.take() {
                slot.generation = slot.generation.wrapping_add(1);
                drained.push(bucket);
                table.free.push(index as u32);
            }
        }
        table.total_destroyed += drained.len() as u64;
        drained
    }

    /// Number of live buckets.
    pub(crate) fn len(&self) -> usize {
        self.lock().active()
    }

    /// Configured slot count.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn stats(&self) -> RegistryStats {
        let table = self.lock();
        RegistryStats {
            active: table.active(),
            capacity: self.capacity,
            total_created: table.total_created,
            total_destroyed: table.total_destroyed,
            total_rejected: table.total_rejected,
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("active", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_register_hands_out_lowest_slot_first() {
        let registry = Registry::new(4);

        let a = registry.register(1, 10).unwrap();
        let b = registry.register(1, 10).unwrap();
        assert_eq!(a.slot(), 0);
        assert_eq!(b.slot(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bucket_slot_matches_position() {
        let registry = Registry::new(8);
        for _ in 0..5 {
            let handle = registry.register(2, 20).unwrap();
            let bucket = registry.get(handle).unwrap();
            assert_eq!(bucket.handle(), handle);
            let metrics = bucket.metrics();
            assert_eq!(metrics.rate, 2);
            assert_eq!(metrics.capacity, 20);
        }
    }

    #[test]
    fn test_full_registry_rejects() {
        let registry = Registry::new(2);
        registry.register(1, 1).unwrap();
        registry.register(1, 1).unwrap();

        let err = registry.register(1, 1).unwrap_err();
        assert!(matches!(
            err,
            LimiterError::ResourceExhausted { capacity: 2 }
        ));
        assert_eq!(registry.len(), 2);

        let stats = registry.stats();
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.total_rejected, 1);
    }

    #[test]
    fn test_unregister_frees_slot_and_retires_handle() {
        let registry = Registry::new(1);
        let old = registry.register(1, 10).unwrap();
        registry.unregister(old).unwrap();
        assert_eq!(registry.len(), 0);

        let new = registry.register(1, 10).unwrap();
        assert_eq!(new.slot(), old.slot());
        assert_ne!(new.generation(), old.generation());

        // The old handle must not reach the new bucket
        assert!(matches!(
            registry.get(old),
            Err(LimiterError::StaleHandle(h)) if h == old
        ));
        assert!(registry.unregister(old).is_err());
        assert!(registry.get(new).is_ok());
    }

    #[test]
    fn test_out_of_range_handle_rejected() {
        let registry = Registry::new(2);
        let handle = LimiterHandle::new(registry.lock().registry, 10, 0);
        assert!(matches!(
            registry.get(handle),
            Err(LimiterError::StaleHandle(_))
        ));
    }

    #[test]
    fn test_handle_from_other_registry_rejected() {
        let first = Registry::new(2);
        let second = Registry::new(2);
        let a = first.register(1, 10).unwrap();
        let b = second.register(1, 10).unwrap();

        // Same slot and generation, different owner
        assert_eq!((a.slot(), a.generation()), (b.slot(), b.generation()));
        assert_ne!(a, b);

        assert!(matches!(
            second.get(a),
            Err(LimiterError::StaleHandle(h)) if h == a
        ));
        assert!(second.unregister(a).is_err());
        assert_eq!(second.len(), 1);
        assert!(second.get(b).is_ok());
    }

    #[test]
    fn test_for_each_active_visits_live_buckets() {
        let registry = Registry::new(5);
        let handles: Vec<_> = (0..4).map(|_| registry.register(3, 30).unwrap()).collect();
        registry.unregister(handles[1]).unwrap();

        let mut seen = Vec::new();
        let visited = registry.for_each_active(|bucket| {
            bucket.refill();
            seen.push(bucket.handle());
        });

        assert_eq!(visited, 3);
        assert_eq!(seen, vec![handles[0], handles[2], handles[3]]);
        assert_eq!(registry.get(handles[0]).unwrap().tokens(), 3);
    }

    #[test]
    fn test_drain() {
        let registry = Registry::new(3);
        let handles: Vec<_> = (0..3).map(|_| registry.register(1, 1).unwrap()).collect();

        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.stats().total_destroyed, 3);
        for handle in handles {
            assert!(registry.get(handle).is_err());
        }

        // Slots are reusable afterwards
        assert!(registry.register(1, 1).is_ok());
    }

    #[test]
    fn test_concurrent_register_unique_slots() {
        let registry = Arc::new(Registry::new(64));
        let mut threads = vec![];

        for _ in 0..8 {
            let registry = registry.clone();
            threads.push(thread::spawn(move || {
                (0..10)
                    .filter_map(|_| registry.register(1, 1).ok())
                    .collect::<Vec<_>>()
            }));
        }

        let handles: Vec<LimiterHandle> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();

        // 80 attempts against 64 slots
        assert_eq!(handles.len(), 64);
        let slots: HashSet<usize> = handles.iter().map(|h| h.slot()).collect();
        assert_eq!(slots.len(), 64);
        assert_eq!(registry.stats().total_rejected, 16);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(LimiterHandle::new(1, 2, 5).to_string(), "#2@5");
    }
}
