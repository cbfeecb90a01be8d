//! Timed stress run: producers and consumers hammer both queues, then the
//! totals are reconciled.
//!
//! Run with:
//!   cargo run --release --bin stress
//!   cargo run --release --features tracing --bin stress

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nexus_mpmc::{BoundedQueue, UnboundedQueue};

const PRODUCERS: usize = 5;
const CONSUMERS: usize = 5;
const CAPACITY: usize = 100;
const DURATION: Duration = Duration::from_secs(2);
const PAYLOAD: usize = 128;

/// A tagged payload; every byte is derived from the tag so corruption
/// shows up on receipt.
struct Message {
    tag: u64,
    body: [u8; PAYLOAD],
}

impl Message {
    fn new(producer: usize, seq: u64) -> Box<Self> {
        let producer = u64::try_from(producer).expect("producer index fits u64");
        let tag = (producer << 48) | seq;
        Box::new(Self {
            tag,
            body: [tag.to_le_bytes()[0]; PAYLOAD],
        })
    }

    fn is_intact(&self) -> bool {
        let expected = self.tag.to_le_bytes()[0];
        self.body.iter().all(|&b| b == expected)
    }
}

#[derive(Default)]
struct Tally {
    sent: u64,
    received: u64,
    corrupt: u64,
}

fn run_bounded() -> Tally {
    let queue = BoundedQueue::<Box<Message>>::new(CAPACITY).expect("capacity is positive");
    let stop = AtomicBool::new(false);
    let mut tally = Tally::default();

    thread::scope(|s| {
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = &queue;
                let stop = &stop;
                s.spawn(move || {
                    let mut seq = 0u64;
                    let mut sent = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        // Full queue: the rejected message comes back and is dropped.
                        if queue.try_enqueue(Message::new(p, seq)).is_ok() {
                            sent += 1;
                        }
                        seq += 1;
                    }
                    sent
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = &queue;
                let stop = &stop;
                s.spawn(move || {
                    let (mut received, mut corrupt) = (0u64, 0u64);
                    while !stop.load(Ordering::Relaxed) {
                        match queue.try_dequeue() {
                            Some(msg) => {
                                received += 1;
                                corrupt += u64::from(!msg.is_intact());
                            }
                            None => std::hint::spin_loop(),
                        }
                    }
                    (received, corrupt)
                })
            })
            .collect();

        thread::sleep(DURATION);
        stop.store(true, Ordering::Relaxed);

        for p in producers {
            tally.sent += p.join().unwrap();
        }
        for c in consumers {
            let (received, corrupt) = c.join().unwrap();
            tally.received += received;
            tally.corrupt += corrupt;
        }
    });

    let left = u64::try_from(queue.len()).expect("queue length fits u64");
    println!(
        "bounded:   sent={} received={} left={} corrupt={}",
        tally.sent, tally.received, left, tally.corrupt
    );
    tally.received += left;
    tally
}

fn run_unbounded() -> Tally {
    let queue = UnboundedQueue::<Box<Message>>::new();
    let stop = AtomicBool::new(false);
    let mut tally = Tally::default();

    thread::scope(|s| {
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = &queue;
                let stop = &stop;
                s.spawn(move || {
                    let mut seq = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        queue.enqueue(Message::new(p, seq));
                        seq += 1;
                        // Keep the list from outgrowing memory.
                        while queue.len() > CAPACITY * 100 && !stop.load(Ordering::Relaxed) {
                            thread::yield_now();
                        }
                    }
                    seq
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = &queue;
                let stop = &stop;
                s.spawn(move || {
                    let (mut received, mut corrupt) = (0u64, 0u64);
                    while !stop.load(Ordering::Relaxed) {
                        match queue.try_dequeue() {
                            Some(msg) => {
                                received += 1;
                                corrupt += u64::from(!msg.is_intact());
                            }
                            None => std::hint::spin_loop(),
                        }
                    }
                    (received, corrupt)
                })
            })
            .collect();

        thread::sleep(DURATION);
        stop.store(true, Ordering::Relaxed);

        for p in producers {
            tally.sent += p.join().unwrap();
        }
        for c in consumers {
            let (received, corrupt) = c.join().unwrap();
            tally.received += received;
            tally.corrupt += corrupt;
        }
    });

    let mut left = 0u64;
    while queue.try_dequeue().is_some() {
        left += 1;
    }
    println!(
        "unbounded: sent={} received={} left={} corrupt={}",
        tally.sent, tally.received, left, tally.corrupt
    );
    tally.received += left;
    tally
}

fn main() {
    nexus_mpmc::trace::init_tracing();

    println!(
        "{PRODUCERS} producers, {CONSUMERS} consumers, capacity {CAPACITY}, {:?} per queue",
        DURATION
    );

    let start = Instant::now();
    let results = [run_bounded(), run_unbounded()];
    println!("elapsed: {:?}", start.elapsed());

    let ok = results
        .iter()
        .all(|t| t.sent == t.received && t.corrupt == 0);
    if !ok {
        eprintln!("FAILED: item counts do not reconcile");
        std::process::exit(1);
    }
    println!("ok");
}
