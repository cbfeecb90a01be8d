//! Ping-pong latency benchmark for the bounded and unbounded queues.
//!
//! One message in flight; reports RTT/2 as the one-way estimate.
//!
//! Run: cargo build --release --bench perf_mpmc_latency
//! Profile: sudo taskset -c 0,2 ./target/release/deps/perf_mpmc_latency-*

use std::sync::Arc;
use std::thread;

use hdrhistogram::Histogram;
use nexus_mpmc::{BoundedQueue, UnboundedQueue};

const WARMUP: u64 = 10_000;
const SAMPLES: u64 = 100_000;
const CAPACITY: usize = 64;

/// The two operations the ping-pong loop needs.
trait PingPong: Send + Sync + 'static {
    fn push(&self, v: u64);
    fn pop(&self) -> Option<u64>;
}

impl PingPong for BoundedQueue<u64> {
    fn push(&self, v: u64) {
        self.enqueue(v);
    }
    fn pop(&self) -> Option<u64> {
        self.try_dequeue()
    }
}

impl PingPong for UnboundedQueue<u64> {
    fn push(&self, v: u64) {
        self.enqueue(v);
    }
    fn pop(&self) -> Option<u64> {
        self.try_dequeue()
    }
}

fn ping_pong<Q: PingPong>(name: &str, fwd: Arc<Q>, ret: Arc<Q>) {
    let total = WARMUP + SAMPLES;

    // Worker thread: receive and echo back
    let worker = {
        let fwd = Arc::clone(&fwd);
        let ret = Arc::clone(&ret);
        thread::spawn(move || {
            for _ in 0..total {
                let val = loop {
                    if let Some(v) = fwd.pop() {
                        break v;
                    }
                    std::hint::spin_loop();
                };
                ret.push(val);
            }
        })
    };

    let mut hist = Histogram::<u64>::new_with_max(1_000_000, 3).unwrap();

    for i in 0..total {
        let start = rdtsc();

        fwd.push(i);
        while ret.pop().is_none() {
            std::hint::spin_loop();
        }

        let elapsed = rdtsc().wrapping_sub(start) / 2;
        if i >= WARMUP {
            let _ = hist.record(elapsed.min(1_000_000));
        }
    }

    worker.join().unwrap();

    println!(
        "{name} latency (cycles): min={} p50={} p99={} p99.9={} max={}",
        hist.min(),
        hist.value_at_quantile(0.50),
        hist.value_at_quantile(0.99),
        hist.value_at_quantile(0.999),
        hist.max()
    );
}

fn main() {
    ping_pong(
        "bounded",
        Arc::new(BoundedQueue::new(CAPACITY).unwrap()),
        Arc::new(BoundedQueue::new(CAPACITY).unwrap()),
    );
    ping_pong(
        "unbounded",
        Arc::new(UnboundedQueue::new()),
        Arc::new(UnboundedQueue::new()),
    );
}

#[inline]
fn rdtsc() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        let mut aux: u32 = 0;
        core::arch::x86_64::__rdtscp(&mut aux)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        use std::time::Instant;
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        START.get_or_init(Instant::now).elapsed().as_nanos() as u64
    }
}
