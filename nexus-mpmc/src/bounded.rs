//! Bounded multi-producer multi-consumer queue.
//!
//! A fixed array of slots guarded by two permit counters. Each side first
//! takes a permit, then runs a claim loop over its own cursor until a
//! compare-and-swap on a slot's occupancy tag succeeds.
//!
//! ```text
//! empty_permits  ──► producer may claim an EMPTY slot
//! filled_permits ──► consumer may claim a FULL slot
//!
//!            enqueue_cursor % capacity
//!                   │
//!   ┌───────┬───────┼───────┬───────┐
//!   │ FULL  │ FULL  │ EMPTY │ BUSY  │   slot tags
//!   └───────┴───────┴───────┴───────┘
//!       │
//!  dequeue_cursor % capacity
//! ```
//!
//! A slot moves `EMPTY → BUSY → FULL` under a producer and
//! `FULL → BUSY → EMPTY` under a consumer. Only the thread that won the
//! `BUSY` transition touches the value cell.
//!
//! # Ordering
//!
//! Items are FIFO along the claimed slot sequence, but two producers racing
//! for permits can publish in either order, so under producer contention
//! items may come out in a different order than they were submitted. With a
//! single producer and a single consumer the order is exact.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use nexus_mpmc::BoundedQueue;
//!
//! let queue = Arc::new(BoundedQueue::<u64>::new(64).unwrap());
//!
//! let producers: Vec<_> = (0..2)
//!     .map(|p| {
//!         let queue = Arc::clone(&queue);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 queue.enqueue(p * 1000 + i);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let mut received = Vec::new();
//! while received.len() < 200 {
//!     received.push(queue.dequeue());
//! }
//!
//! for p in producers {
//!     p.join().unwrap();
//! }
//! assert!(queue.is_empty());
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicIsize, AtomicU8, AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::error::{Full, InvalidCapacity};
use crate::trace::{debug, trace, warn};

/// No value; claimable by a producer.
const EMPTY: u8 = 0;
/// Claimed; the owner is writing or taking the value.
const BUSY: u8 = 1;
/// Holds a published value; claimable by a consumer.
const FULL: u8 = 2;

/// A slot in the array: occupancy tag plus the value it guards.
struct Slot<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// A fixed-capacity MPMC queue.
///
/// Share it between threads by reference (`Arc<BoundedQueue<T>>` or scoped
/// threads). All operations take `&self`.
pub struct BoundedQueue<T> {
    /// Slots a producer may currently claim.
    empty_permits: CachePadded<AtomicIsize>,
    /// Slots a consumer may currently claim.
    filled_permits: CachePadded<AtomicIsize>,

    enqueue_cursor: CachePadded<AtomicUsize>,
    dequeue_cursor: CachePadded<AtomicUsize>,

    slots: Box<[Slot<T>]>,
    capacity: usize,
}

// Safety: a value cell is only accessed by the thread that moved its slot
// into BUSY, and the tag transitions are acquire/release, so values are
// handed between threads but never shared.
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCapacity`] if `capacity` is zero or larger than
    /// `isize::MAX`. The capacity is never rounded or clamped.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_mpmc::{BoundedQueue, InvalidCapacity};
    ///
    /// let queue = BoundedQueue::<u32>::new(100).unwrap();
    /// assert_eq!(queue.capacity(), 100);
    ///
    /// assert_eq!(
    ///     BoundedQueue::<u32>::new(0).unwrap_err(),
    ///     InvalidCapacity { capacity: 0 }
    /// );
    /// ```
    pub fn new(capacity: usize) -> Result<Self, InvalidCapacity> {
        let permits = match isize::try_from(capacity) {
            Ok(permits) if permits > 0 => permits,
            _ => {
                warn!(capacity, "rejected bounded queue capacity");
                return Err(InvalidCapacity { capacity });
            }
        };

        let slots = (0..capacity).map(|_| Slot::new()).collect();
        debug!(capacity, "bounded queue created");

        Ok(Self {
            empty_permits: CachePadded::new(AtomicIsize::new(permits)),
            filled_permits: CachePadded::new(AtomicIsize::new(0)),
            enqueue_cursor: CachePadded::new(AtomicUsize::new(0)),
            dequeue_cursor: CachePadded::new(AtomicUsize::new(0)),
            slots,
            capacity,
        })
    }

    #[inline]
    fn slot(&self, cursor: usize) -> &Slot<T> {
        &self.slots[cursor % self.capacity]
    }

    /// Attempts to enqueue `value` without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if every slot was taken at the moment of
    /// the attempt. The queue is left unchanged and the caller gets the
    /// value back.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_mpmc::{BoundedQueue, Full};
    ///
    /// let queue = BoundedQueue::new(2).unwrap();
    /// assert!(queue.try_enqueue(1).is_ok());
    /// assert!(queue.try_enqueue(2).is_ok());
    /// assert_eq!(queue.try_enqueue(3), Err(Full(3)));
    /// assert_eq!(queue.len(), 2);
    /// ```
    #[inline]
    pub fn try_enqueue(&self, value: T) -> Result<(), Full<T>> {
        if self.empty_permits.fetch_sub(1, Ordering::Acquire) <= 0 {
            self.empty_permits.fetch_add(1, Ordering::Relaxed);
            trace!("enqueue rejected: queue full");
            return Err(Full(value));
        }

        // Holding a permit means at least one EMPTY slot nobody else has
        // a claim on, so some index in the cycle will accept us.
        loop {
            let cursor = self.enqueue_cursor.fetch_add(1, Ordering::Relaxed);
            let slot = self.slot(cursor);

            if slot
                .state
                .compare_exchange(EMPTY, BUSY, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                // Safety: the EMPTY -> BUSY transition gives us exclusive
                // access to the value cell, which holds no value.
                unsafe {
                    (*slot.value.get()).write(value);
                }
                slot.state.store(FULL, Ordering::Release);
                self.filled_permits.fetch_add(1, Ordering::Release);
                return Ok(());
            }
        }
    }

    /// Attempts to dequeue a value without waiting.
    ///
    /// Returns `None` if no published item was available at the moment of
    /// the attempt.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_mpmc::BoundedQueue;
    ///
    /// let queue = BoundedQueue::new(4).unwrap();
    /// assert_eq!(queue.try_dequeue(), None);
    ///
    /// queue.try_enqueue("tick").unwrap();
    /// assert_eq!(queue.try_dequeue(), Some("tick"));
    /// assert_eq!(queue.try_dequeue(), None);
    /// ```
    #[inline]
    pub fn try_dequeue(&self) -> Option<T> {
        if self.filled_permits.fetch_sub(1, Ordering::Acquire) <= 0 {
            self.filled_permits.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        loop {
            let cursor = self.dequeue_cursor.fetch_add(1, Ordering::Relaxed);
            let slot = self.slot(cursor);

            // EMPTY or BUSY: a producer hasn't published here yet, or another
            // consumer is vacating it. Our permit is backed by some other
            // FULL slot further along the cycle.
            if slot.state.load(Ordering::Relaxed) != FULL {
                continue;
            }

            if slot
                .state
                .compare_exchange(FULL, BUSY, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                // Safety: the FULL -> BUSY transition gives us exclusive
                // access to an initialized value, which we move out before
                // marking the slot EMPTY.
                let value = unsafe { (*slot.value.get()).assume_init_read() };
                slot.state.store(EMPTY, Ordering::Release);
                self.empty_permits.fetch_add(1, Ordering::Release);
                return Some(value);
            }
        }
    }

    /// Enqueues `value`, spinning and then yielding until a slot frees up.
    ///
    /// There is no timeout. Callers that need one should loop over
    /// [`try_enqueue`](Self::try_enqueue) with their own deadline check.
    pub fn enqueue(&self, mut value: T) {
        let backoff = Backoff::new();
        loop {
            match self.try_enqueue(value) {
                Ok(()) => return,
                Err(Full(rejected)) => {
                    value = rejected;
                    backoff.snooze();
                }
            }
        }
    }

    /// Dequeues a value, spinning and then yielding until one is available.
    pub fn dequeue(&self) -> T {
        let backoff = Backoff::new();
        loop {
            if let Some(value) = self.try_dequeue() {
                return value;
            }
            backoff.snooze();
        }
    }

    /// Returns the fixed capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of published items.
    ///
    /// Exact at rest. While operations are in flight the counter may
    /// briefly lag or dip; the result is always within `0..=capacity`.
    #[inline]
    pub fn len(&self) -> usize {
        let filled = self.filled_permits.load(Ordering::Relaxed);
        usize::try_from(filled).map_or(0, |n| n.min(self.capacity))
    }

    /// Returns `true` if no published items are available.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot holds a published item.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        let mut remaining = 0usize;
        for slot in &mut *self.slots {
            if *slot.state.get_mut() == FULL {
                // Safety: FULL slots hold an initialized value and we have
                // exclusive access.
                unsafe { slot.value.get_mut().assume_init_drop() };
                remaining += 1;
            }
        }
        if remaining > 0 {
            debug!(remaining, "bounded queue dropped with queued items");
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
