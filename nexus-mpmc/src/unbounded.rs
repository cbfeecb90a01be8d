//! Unbounded multi-producer multi-consumer queue.
//!
//! A singly linked list with a sentinel head. Producers append without ever
//! touching `head`; dequeuers take turns through an exclusion token: the
//! head pointer itself, swapped to null while a dequeue is in progress.
//!
//! ```text
//!  head                                  tail
//!   │                                     │
//!   ▼                                     ▼
//! ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ sentinel │──►│ value A  │──►│ value B  │──► null
//! └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Publishing
//!
//! An enqueue swings `tail` to its node first and links the previous tail
//! second. Between the two steps a dequeuer can see `tail` ahead of
//! `head.next`; it keeps the token and waits for the link.
//!
//! # Node lifetime
//!
//! Nodes are freed immediately on dequeue, with no deferred reclamation.
//! This holds up because only the token holder dereferences `head`, and a
//! producer only dereferences the node it got back from the tail swap,
//! which cannot be freed until that producer has linked it.
//!
//! # Progress
//!
//! Enqueue never waits on other threads apart from allocation. Dequeue is
//! not lock-free, and two kinds of stall block every dequeuer:
//!
//! - a dequeuer preempted while holding the token;
//! - a producer preempted between its tail swap and its link store. The
//!   token holder keeps waiting on that link, so items appended later by
//!   other producers stay unreachable until the stalled producer runs.
//!
//! Producers are never blocked by either.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use nexus_mpmc::UnboundedQueue;
//!
//! let queue = Arc::new(UnboundedQueue::new());
//!
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         for i in 0..1000u32 {
//!             queue.enqueue(i);
//!         }
//!     })
//! };
//!
//! // A single producer and a single consumer see the exact enqueue order.
//! for expected in 0..1000u32 {
//!     assert_eq!(queue.dequeue(), expected);
//! }
//! producer.join().unwrap();
//! ```

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::error::AllocError;
use crate::trace::{debug, warn};

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    /// Initialized from enqueue until the node's value is taken, at which
    /// point the node becomes the sentinel.
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Node<T> {
    const LAYOUT: Layout = Layout::new::<Self>();

    /// Allocates an unlinked node with an uninitialized value.
    ///
    /// Returns `None` if the allocator fails.
    fn try_allocate() -> Option<NonNull<Self>> {
        // Safety: Node always has non-zero size (it holds an AtomicPtr).
        let node = NonNull::new(unsafe { alloc(Self::LAYOUT) }.cast::<Self>())?;

        // Safety: freshly allocated with Self's layout.
        unsafe {
            node.as_ptr().write(Self {
                next: AtomicPtr::new(ptr::null_mut()),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            });
        }
        Some(node)
    }

    /// Frees a node without dropping its value.
    ///
    /// # Safety
    ///
    /// `node` must come from `try_allocate`, must not be freed twice, and
    /// no other thread may access it afterwards.
    unsafe fn free(node: *mut Self) {
        unsafe { dealloc(node.cast(), Self::LAYOUT) };
    }
}

/// An unbounded MPMC queue backed by a linked list.
///
/// Share it between threads by reference (`Arc<UnboundedQueue<T>>` or
/// scoped threads). All operations take `&self`.
pub struct UnboundedQueue<T> {
    /// Sentinel node, or null while a dequeuer holds the exclusion token.
    head: CachePadded<AtomicPtr<Node<T>>>,
    /// Most recently appended node. May be ahead of the last link.
    tail: CachePadded<AtomicPtr<Node<T>>>,
    /// Advisory item count.
    len: CachePadded<AtomicUsize>,
    _owns: PhantomData<T>,
}

// Safety: values move between threads through the list; the queue never
// hands out shared references to them.
unsafe impl<T: Send> Send for UnboundedQueue<T> {}

// Safety: producers only write their own node and the `next` link of the
// node returned by the tail swap. Dequeuers are serialized by the head
// token. Values are therefore never accessed by two threads at once.
unsafe impl<T: Send> Sync for UnboundedQueue<T> {}

impl<T> UnboundedQueue<T> {
    /// Creates an empty queue.
    ///
    /// Allocates the sentinel node; aborts through
    /// [`handle_alloc_error`] if that fails.
    pub fn new() -> Self {
        let sentinel = Node::<T>::try_allocate()
            .unwrap_or_else(|| handle_alloc_error(Node::<T>::LAYOUT))
            .as_ptr();

        debug!("unbounded queue created");

        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            len: CachePadded::new(AtomicUsize::new(0)),
            _owns: PhantomData,
        }
    }

    /// Appends `value` to the queue.
    ///
    /// # Errors
    ///
    /// Returns `Err(AllocError(value))` if the node could not be allocated.
    /// The queue has no capacity limit, so this is the only failure.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_mpmc::UnboundedQueue;
    ///
    /// let queue = UnboundedQueue::new();
    /// assert!(queue.try_enqueue(42).is_ok());
    /// assert_eq!(queue.len(), 1);
    /// ```
    pub fn try_enqueue(&self, value: T) -> Result<(), AllocError<T>> {
        let Some(node) = Node::<T>::try_allocate() else {
            warn!("unbounded queue node allocation failed");
            return Err(AllocError(value));
        };

        // Safety: the node is not yet reachable from any other thread.
        unsafe { (*node.as_ref().value.get()).write(value) };

        // Counted before publishing so a dequeuer's decrement can never
        // land first and wrap the counter.
        self.len.fetch_add(1, Ordering::Relaxed);

        let node = node.as_ptr();
        let prev = self.tail.swap(node, Ordering::AcqRel);

        // Safety: `prev` was the tail until our swap. A dequeuer only frees
        // a node after observing its `next` link, which only we set, so
        // `prev` is alive until this store. We don't touch it after.
        unsafe { (*prev).next.store(node, Ordering::Release) };

        Ok(())
    }

    /// Appends `value` to the queue.
    ///
    /// Aborts through [`handle_alloc_error`] if the node cannot be
    /// allocated, the same way standard collections do.
    pub fn enqueue(&self, value: T) {
        if self.try_enqueue(value).is_err() {
            handle_alloc_error(Node::<T>::LAYOUT);
        }
    }

    /// Attempts to remove the oldest value.
    ///
    /// Returns `None` if the queue is empty. If another dequeuer holds the
    /// head token this waits for it to finish before checking.
    ///
    /// This can wait indefinitely in two cases: the token holder is
    /// descheduled, or a producer has swapped itself into the tail but not
    /// yet linked its node. In the second case the token holder waits on
    /// the link, and so does every other dequeuer behind it.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_mpmc::UnboundedQueue;
    ///
    /// let queue = UnboundedQueue::new();
    /// assert_eq!(queue.try_dequeue(), None);
    ///
    /// queue.enqueue('a');
    /// queue.enqueue('b');
    /// assert_eq!(queue.try_dequeue(), Some('a'));
    /// assert_eq!(queue.try_dequeue(), Some('b'));
    /// assert_eq!(queue.try_dequeue(), None);
    /// ```
    pub fn try_dequeue(&self) -> Option<T> {
        let backoff = Backoff::new();

        let head = loop {
            let head = self.head.load(Ordering::Relaxed);

            if head.is_null() {
                // Token held by another dequeuer.
                backoff.snooze();
                continue;
            }

            // Fast empty check; compares addresses only.
            if head == self.tail.load(Ordering::Relaxed) {
                return None;
            }

            if self
                .head
                .compare_exchange_weak(head, ptr::null_mut(), Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break head;
            }
            backoff.spin();
        };

        // Token held: until we publish a new head, no other thread
        // dereferences `head`.

        if head == self.tail.load(Ordering::Acquire) {
            self.head.store(head, Ordering::Release);
            return None;
        }

        // Tail has moved past `head`, so its link is on the way.
        let next = loop {
            // Safety: `head` is alive while we hold the token.
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if !next.is_null() {
                break next;
            }
            backoff.snooze();
        };

        // Safety: `next` was fully written before its producer swapped it
        // into the tail, and the acquire load of the link synchronizes with
        // that producer. Nobody else reads a non-sentinel value.
        let value = unsafe { (*(*next).value.get()).assume_init_read() };

        // `next` becomes the sentinel; this also releases the token.
        let token = self.head.swap(next, Ordering::Release);
        debug_assert!(token.is_null(), "head token released twice");

        // Safety: `head` is unreachable now: it is neither head nor tail,
        // and its only producer finished with it when it stored the link.
        unsafe { Node::free(head) };
        self.len.fetch_sub(1, Ordering::Relaxed);

        Some(value)
    }

    /// Removes the oldest value, spinning and then yielding until one is
    /// available.
    pub fn dequeue(&self) -> T {
        let backoff = Backoff::new();
        loop {
            if let Some(value) = self.try_dequeue() {
                return value;
            }
            backoff.snooze();
        }
    }

    /// Returns the number of queued items.
    ///
    /// Advisory only: concurrent operations may make it momentarily
    /// overcount.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns `true` if [`len`](Self::len) is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for UnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for UnboundedQueue<T> {
    fn drop(&mut self) {
        let mut remaining = 0usize;

        let mut node = *self.head.get_mut();
        // Safety: `&mut self` means no dequeuer holds the token and every
        // enqueue has stored its link, so each node is reachable once and
        // only the sentinel's value is uninitialized.
        unsafe {
            // The sentinel's value was already taken.
            let mut next = *(*node).next.get_mut();
            Node::free(node);

            while !next.is_null() {
                node = next;
                next = *(*node).next.get_mut();
                (*node).value.get_mut().assume_init_drop();
                Node::free(node);
                remaining += 1;
            }
        }

        if remaining > 0 {
            debug!(remaining, "unbounded queue dropped with queued items");
        }
    }
}

impl<T> fmt::Debug for UnboundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnboundedQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
