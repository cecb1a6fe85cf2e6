//! Fixed-capacity envelope pool
//!
//! Every slot is allocated when the pool is built. Free slot indices sit in a
//! lock-free `ArrayQueue`; a semaphore holds exactly one permit per free slot
//! so `acquire()` can wait asynchronously when the pool is drained.
//!
//! A slot is returned when the last `Envelope` referencing it is dropped:
//! the message is reset, the index pushed back, and a permit added. The push
//! happens before the permit is released, so a task holding a permit always
//! finds an index in the queue.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::message::Message;
use crate::{DEFAULT_RAW_CAPACITY, ProtocolError, Result};

struct Slot {
    message: Mutex<Message>,
    refs: AtomicU32,
}

struct PoolShared {
    name: String,
    slots: Box<[Slot]>,
    free: ArrayQueue<usize>,
    permits: Semaphore,
    metrics: PoolMetrics,
}

#[derive(Debug, Default)]
struct PoolMetrics {
    acquires: AtomicU64,
    recycles: AtomicU64,
    waits: AtomicU64,
}

/// Point-in-time snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    /// Envelopes handed out
    pub acquires: u64,
    /// Envelopes returned to the pool
    pub recycles: u64,
    /// Acquires that had to wait for a recycle
    pub waits: u64,
}

/// Bounded, reference-counted recycler of envelopes, private to one input
///
/// Cloning the pool clones a handle to the same slots.
#[derive(Clone)]
pub struct EnvelopePool {
    shared: Arc<PoolShared>,
}

impl EnvelopePool {
    /// Build a pool with `capacity` pre-allocated envelopes
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        Self::with_raw_capacity(name, capacity, DEFAULT_RAW_CAPACITY)
    }

    /// Build a pool, reserving `raw_capacity` bytes in each slot's buffer
    pub fn with_raw_capacity(
        name: impl Into<String>,
        capacity: usize,
        raw_capacity: usize,
    ) -> Result<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(ProtocolError::zero_capacity(name));
        }

        let slots: Box<[Slot]> = (0..capacity)
            .map(|_| Slot {
                message: Mutex::new(Message::with_capacity(raw_capacity)),
                refs: AtomicU32::new(0),
            })
            .collect();

        let free = ArrayQueue::new(capacity);
        for index in 0..capacity {
            // Queue was sized to hold every index
            let _ = free.push(index);
        }

        Ok(Self {
            shared: Arc::new(PoolShared {
                name,
                slots,
                free,
                permits: Semaphore::new(capacity),
                metrics: PoolMetrics::default(),
            }),
        })
    }

    /// Pool name (the owning input's name)
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Total number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Number of slots currently free
    #[inline]
    pub fn available(&self) -> usize {
        self.shared.permits.available_permits()
    }

    /// Number of slots currently held by envelopes
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Take a free envelope, waiting until one is recycled if the pool is empty
    pub async fn acquire(&self) -> Result<Envelope> {
        if let Some(envelope) = self.try_acquire() {
            return Ok(envelope);
        }

        self.shared.metrics.waits.fetch_add(1, Ordering::Relaxed);
        let permit = self
            .shared
            .permits
            .acquire()
            .await
            .map_err(|_| ProtocolError::pool_closed(self.name()))?;
        permit.forget();

        self.take_slot()
    }

    /// Take a free envelope without waiting
    pub fn try_acquire(&self) -> Option<Envelope> {
        let permit = self.shared.permits.try_acquire().ok()?;
        permit.forget();
        self.take_slot().ok()
    }

    /// Close the pool, failing every pending and future `acquire()`
    pub fn close(&self) {
        self.shared.permits.close();
    }

    /// Get a snapshot of pool counters
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        let m = &self.shared.metrics;
        PoolMetricsSnapshot {
            acquires: m.acquires.load(Ordering::Relaxed),
            recycles: m.recycles.load(Ordering::Relaxed),
            waits: m.waits.load(Ordering::Relaxed),
        }
    }

    fn take_slot(&self) -> Result<Envelope> {
        // A held permit guarantees a queued index
        let index = self
            .shared
            .free
            .pop()
            .ok_or_else(|| ProtocolError::pool_closed(self.name()))?;
        self.shared.slots[index].refs.store(1, Ordering::Release);
        self.shared.metrics.acquires.fetch_add(1, Ordering::Relaxed);

        Ok(Envelope {
            shared: Arc::clone(&self.shared),
            index,
        })
    }
}

impl fmt::Debug for EnvelopePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopePool")
            .field("name", &self.shared.name)
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// Counted handle to one pooled `Message`
///
/// Each `Envelope` value owns exactly one reference. `share()` adds a
/// reference for another holder; dropping (or `recycle()`) releases one.
/// Releasing the last reference resets the message and returns the slot.
pub struct Envelope {
    shared: Arc<PoolShared>,
    index: usize,
}

impl Envelope {
    #[inline]
    fn slot(&self) -> &Slot {
        &self.shared.slots[self.index]
    }

    /// Add a reference for another consumer and return its handle
    pub fn share(&self) -> Envelope {
        self.slot().refs.fetch_add(1, Ordering::AcqRel);
        Envelope {
            shared: Arc::clone(&self.shared),
            index: self.index,
        }
    }

    /// Current reference count
    pub fn ref_count(&self) -> u32 {
        self.slot().refs.load(Ordering::Acquire)
    }

    /// Name of the pool this envelope belongs to
    pub fn pool_name(&self) -> &str {
        &self.shared.name
    }

    /// Read the message under the slot lock
    pub fn with_message<R>(&self, f: impl FnOnce(&Message) -> R) -> R {
        f(&self.slot().message.lock())
    }

    /// Mutate the message under the slot lock
    pub fn with_message_mut<R>(&self, f: impl FnOnce(&mut Message) -> R) -> R {
        f(&mut self.slot().message.lock())
    }

    /// Copy of the routing tag
    pub fn tag(&self) -> String {
        self.with_message(|m| m.tag.clone())
    }

    /// Release this reference
    #[inline]
    pub fn recycle(self) {
        drop(self);
    }
}

impl Drop for Envelope {
    fn drop(&mut self) {
        let slot = &self.shared.slots[self.index];
        if slot.refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        slot.message.lock().reset();
        // Capacity equals slot count, so the push cannot fail
        let _ = self.shared.free.push(self.index);
        self.shared.metrics.recycles.fetch_add(1, Ordering::Relaxed);
        self.shared.permits.add_permits(1);
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("pool", &self.shared.name)
            .field("slot", &self.index)
            .field("refs", &self.ref_count())
            .finish()
    }
}
