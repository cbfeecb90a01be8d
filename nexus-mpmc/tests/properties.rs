//! Behavioral properties shared by both queues, exercised through the
//! public API only.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use nexus_mpmc::{BoundedQueue, Full, InvalidCapacity, UnboundedQueue};

// ============================================================================
// Single-threaded
// ============================================================================

#[test]
fn round_trip() {
    let bounded = BoundedQueue::new(1).unwrap();
    bounded.enqueue(String::from("x"));
    assert_eq!(bounded.dequeue(), "x");

    let unbounded = UnboundedQueue::new();
    unbounded.enqueue(String::from("x"));
    assert_eq!(unbounded.dequeue(), "x");
}

#[test]
fn rejection_keeps_len() {
    let queue = BoundedQueue::new(3).unwrap();
    for i in 0..3 {
        assert!(queue.try_enqueue(i).is_ok());
    }

    assert_eq!(queue.try_enqueue(4), Err(Full(4)));
    assert_eq!(queue.len(), 3);
}

#[test]
fn empty_reported() {
    let bounded = BoundedQueue::<u32>::new(4).unwrap();
    assert_eq!(bounded.try_dequeue(), None);
    bounded.try_enqueue(1).unwrap();
    assert_eq!(bounded.try_dequeue(), Some(1));
    assert_eq!(bounded.try_dequeue(), None);

    let unbounded = UnboundedQueue::<u32>::new();
    assert_eq!(unbounded.try_dequeue(), None);
    unbounded.try_enqueue(1).unwrap();
    assert_eq!(unbounded.try_dequeue(), Some(1));
    assert_eq!(unbounded.try_dequeue(), None);
}

#[test]
fn invalid_construction() {
    assert!(matches!(
        BoundedQueue::<u32>::new(0),
        Err(InvalidCapacity { capacity: 0 })
    ));

    let minus_one = usize::MAX;
    assert!(matches!(
        BoundedQueue::<u32>::new(minus_one),
        Err(InvalidCapacity { .. })
    ));
}

#[test]
fn len_never_exceeds_capacity() {
    let queue = BoundedQueue::new(5).unwrap();
    let mut accepted = 0;
    for i in 0..20 {
        if queue.try_enqueue(i).is_ok() {
            accepted += 1;
        }
        assert!(queue.len() <= queue.capacity());
    }
    assert_eq!(accepted, 5);
    assert!(queue.is_full());
}

// ============================================================================
// SPSC ordering
// ============================================================================

#[test]
fn bounded_spsc_fifo() {
    const N: u64 = 200_000;
    let queue = Arc::new(BoundedQueue::new(64).unwrap());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..N {
                queue.enqueue(i);
            }
        })
    };

    for expected in 0..N {
        assert_eq!(queue.dequeue(), expected);
    }
    producer.join().unwrap();
}

#[test]
fn unbounded_spsc_fifo() {
    const N: u64 = 200_000;
    let queue = Arc::new(UnboundedQueue::new());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..N {
                queue.enqueue(i);
            }
        })
    };

    for expected in 0..N {
        assert_eq!(queue.dequeue(), expected);
    }
    producer.join().unwrap();
}

// ============================================================================
// No loss, no duplication
// ============================================================================

const PRODUCERS: usize = 6;
const CONSUMERS: usize = 3;
const PER_PRODUCER: usize = 20_000;
const TOTAL: usize = PRODUCERS * PER_PRODUCER;

/// Runs tagged producers and draining consumers against `enqueue` and
/// `try_dequeue`, returning every tag received.
fn drain_tags<Q: Send + Sync + 'static>(
    queue: Arc<Q>,
    enqueue: fn(&Q, usize),
    try_dequeue: fn(&Q) -> Option<usize>,
) -> Vec<usize> {
    let taken = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    enqueue(&queue, p * PER_PRODUCER + i);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let taken = Arc::clone(&taken);
            thread::spawn(move || {
                let mut tags = Vec::new();
                while taken.load(Ordering::Relaxed) < TOTAL {
                    match try_dequeue(&queue) {
                        Some(tag) => {
                            taken.fetch_add(1, Ordering::Relaxed);
                            tags.push(tag);
                        }
                        None => thread::yield_now(),
                    }
                }
                tags
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    consumers
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect()
}

fn assert_each_tag_once(tags: &[usize]) {
    assert_eq!(tags.len(), TOTAL, "wrong number of items");
    let unique: HashSet<_> = tags.iter().copied().collect();
    assert_eq!(unique.len(), TOTAL, "duplicated items");
    assert!(tags.iter().all(|&t| t < TOTAL), "corrupted tag");
}

#[test]
fn bounded_no_loss_no_duplication() {
    let queue = Arc::new(BoundedQueue::new(32).unwrap());
    let tags = drain_tags(
        Arc::clone(&queue),
        |q, v| q.enqueue(v),
        BoundedQueue::try_dequeue,
    );
    assert_each_tag_once(&tags);
    assert!(queue.is_empty());
}

#[test]
fn unbounded_no_loss_no_duplication() {
    let queue = Arc::new(UnboundedQueue::new());
    let tags = drain_tags(
        Arc::clone(&queue),
        |q, v| q.enqueue(v),
        UnboundedQueue::try_dequeue,
    );
    assert_each_tag_once(&tags);
    assert!(queue.is_empty());
}

// ============================================================================
// Timed stress
// ============================================================================

#[test]
fn bounded_timed_stress_reconciles() {
    let queue = Arc::new(BoundedQueue::<Box<[u8; 128]>>::new(100).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..5u8)
        .map(|p| {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut sent = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    if queue.try_enqueue(Box::new([p; 128])).is_ok() {
                        sent += 1;
                    }
                }
                sent
            })
        })
        .collect();

    let consumers: Vec<_> = (0..5)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut received = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    if let Some(msg) = queue.try_dequeue() {
                        assert!(msg.iter().all(|&b| b == msg[0] && b < 5), "corrupted payload");
                        received += 1;
                    }
                }
                received
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(500));
    stop.store(true, Ordering::Relaxed);

    let sent: usize = producers.into_iter().map(|h| h.join().unwrap()).sum();
    let received: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();

    assert!(queue.len() <= queue.capacity());
    assert_eq!(received + queue.len(), sent);

    let mut drained = 0;
    while queue.try_dequeue().is_some() {
        drained += 1;
    }
    assert_eq!(received + drained, sent);
}
