//! Transport Queue - lock-free single-producer/single-consumer ring.
//!
//! Moves decoded feed items from the network thread to the matching thread.
//! Fixed power-of-two capacity, one slot array, two monotonically increasing
//! counters on separate cache lines. The acquire/release pair on those
//! counters is the only synchronization between the threads.
//!
//! ```text
//!   Producer                         Consumer
//!   head ──► [ . . X X X X . . ] ◄── tail
//!             write slot head & mask, read slot tail & mask
//! ```
//!
//! The single-producer/single-consumer contract is enforced by ownership:
//! [`SpscQueue::with_capacity`] hands out exactly one [`Producer`] and one
//! [`Consumer`], neither of which is `Clone`.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Capacity was rejected at construction.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("queue capacity must be a non-zero power of two, got {requested}")]
pub struct CapacityError {
    pub requested: usize,
}

/// The queue was full; the rejected item is handed back.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PushError<T> {
    #[error("queue is full")]
    Full(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) => item,
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PopError {
    #[error("queue is empty")]
    Empty,
}

/// Pads a counter out to its own cache line.
#[repr(align(64))]
struct CacheAligned<T>(T);

struct Shared<T> {
    /// Next slot to write; stored only by the producer
    head: CacheAligned<AtomicUsize>,
    /// Next slot to read; stored only by the consumer
    tail: CacheAligned<AtomicUsize>,
    slots: Box<[UnsafeCell<T>]>,
    mask: usize,
}

// SAFETY: a slot is only touched by the producer while it lies outside
// [tail, head) and only by the consumer while it lies inside. Ownership moves
// across that boundary through the Release store / Acquire load on the
// counters, so no slot is ever accessed from two threads at once.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Advisory occupancy snapshot.
    #[inline]
    fn len(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(self.capacity())
    }

    #[inline]
    fn slot(&self, counter: usize) -> *mut T {
        self.slots[counter & self.mask].get()
    }
}

/// Constructor for a producer/consumer pair.
pub struct SpscQueue;

impl SpscQueue {
    /// Allocate a queue with `capacity` slots, all pre-filled with
    /// `T::default()` so the hot path never allocates.
    pub fn with_capacity<T: Default>(
        capacity: usize,
    ) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
        if !capacity.is_power_of_two() {
            return Err(CapacityError { requested: capacity });
        }

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let shared = Arc::new(Shared {
            head: CacheAligned(AtomicUsize::new(0)),
            tail: CacheAligned(AtomicUsize::new(0)),
            slots,
            mask: capacity - 1,
        });

        let producer = Producer {
            shared: Arc::clone(&shared),
            head: 0,
            cached_tail: 0,
        };
        let consumer = Consumer {
            shared,
            tail: 0,
            cached_head: 0,
        };
        Ok((producer, consumer))
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Write end. Owned by exactly one thread.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    /// Local copy of the head counter (we are its only writer)
    head: usize,
    /// Last observed tail; refreshed only when the queue looks full
    cached_tail: usize,
}

impl<T> Producer<T> {
    /// Whether a slot is free, refreshing the tail cache if needed.
    #[inline]
    fn has_room(&mut self) -> bool {
        let capacity = self.shared.capacity();
        if self.head.wrapping_sub(self.cached_tail) < capacity {
            return true;
        }
        self.cached_tail = self.shared.tail.0.load(Ordering::Acquire);
        self.head.wrapping_sub(self.cached_tail) < capacity
    }

    #[inline]
    fn commit(&mut self) {
        self.head = self.head.wrapping_add(1);
        self.shared.head.0.store(self.head, Ordering::Release);
    }

    /// Copy an item into the queue. Fails without side effects when full.
    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), PushError<T>> {
        if !self.has_room() {
            return Err(PushError::Full(item));
        }
        // SAFETY: slot `head` is outside [tail, head), so the consumer is not
        // reading it (see `Shared`).
        unsafe {
            *self.shared.slot(self.head) = item;
        }
        self.commit();
        Ok(())
    }

    /// Borrow the next free slot for in-place writing.
    ///
    /// Nothing becomes visible to the consumer until [`Claim::publish`].
    /// Dropping the claim abandons the write. Returns `None` when full.
    #[inline]
    pub fn claim(&mut self) -> Option<Claim<'_, T>> {
        if !self.has_room() {
            return None;
        }
        Some(Claim { producer: self })
    }

    /// Free slots as currently seen by the producer (advisory).
    pub fn slots(&self) -> usize {
        self.shared.capacity() - self.shared.len()
    }

    /// Occupied slots (advisory).
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("head", &self.head)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Exclusive write access to the next free slot.
pub struct Claim<'a, T> {
    producer: &'a mut Producer<T>,
}

impl<T> Claim<'_, T> {
    /// Make the written slot visible to the consumer.
    #[inline]
    pub fn publish(self) {
        self.producer.commit();
    }
}

impl<T> Deref for Claim<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the claimed slot is producer-owned until published.
        unsafe { &*self.producer.shared.slot(self.producer.head) }
    }
}

impl<T> DerefMut for Claim<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; the claim holds `&mut Producer`, so this is the
        // only live reference to the slot.
        unsafe { &mut *self.producer.shared.slot(self.producer.head) }
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Read end. Owned by exactly one thread.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    /// Local copy of the tail counter (we are its only writer)
    tail: usize,
    /// Last observed head; refreshed only when the queue looks empty
    cached_head: usize,
}

impl<T> Consumer<T> {
    #[inline]
    fn has_item(&mut self) -> bool {
        if self.tail != self.cached_head {
            return true;
        }
        self.cached_head = self.shared.head.0.load(Ordering::Acquire);
        self.tail != self.cached_head
    }

    #[inline]
    fn commit(&mut self) {
        self.tail = self.tail.wrapping_add(1);
        self.shared.tail.0.store(self.tail, Ordering::Release);
    }

    /// Borrow the oldest item in place. Returns `None` when empty.
    ///
    /// The slot is released by [`Peek::advance`]; dropping the handle leaves
    /// the item in the queue.
    #[inline]
    pub fn peek(&mut self) -> Option<Peek<'_, T>> {
        if !self.has_item() {
            return None;
        }
        Some(Peek { consumer: self })
    }

    /// Occupied slots (advisory).
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

impl<T: Default> Consumer<T> {
    /// Move the oldest item out. Fails without side effects when empty.
    #[inline]
    pub fn pop(&mut self) -> Result<T, PopError> {
        if !self.has_item() {
            return Err(PopError::Empty);
        }
        // SAFETY: slot `tail` is inside [tail, head), so the producer is not
        // writing it (see `Shared`).
        let item = unsafe { std::mem::take(&mut *self.shared.slot(self.tail)) };
        self.commit();
        Ok(item)
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("tail", &self.tail)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Shared read access to the oldest item.
pub struct Peek<'a, T> {
    consumer: &'a mut Consumer<T>,
}

impl<T> Peek<'_, T> {
    /// Release the slot back to the producer.
    #[inline]
    pub fn advance(self) {
        self.consumer.commit();
    }
}

impl<T> Deref for Peek<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the peeked slot is consumer-owned until advanced.
        unsafe { &*self.consumer.shared.slot(self.consumer.tail) }
    }
}
