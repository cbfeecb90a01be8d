//! # nexus-mpmc
//!
//! Multi-producer multi-consumer queues for pipelines where a mutex would
//! become the bottleneck.
//!
//! ## Queues
//!
//! - [`BoundedQueue`]: fixed-capacity slot array. Producers and consumers
//!   take a *permit* from a shared counter, then claim a slot with a single
//!   compare-and-swap.
//! - [`UnboundedQueue`]: linked list. Enqueue never fails (short of
//!   allocation failure); dequeuers serialize through an exclusion token
//!   embedded in the head pointer.
//!
//! Neither queue parks threads. The blocking `enqueue`/`dequeue` calls spin
//! and then yield until the corresponding `try_*` call succeeds.
//!
//! ## Ordering
//!
//! | Queue | Ordering |
//! |-------|----------|
//! | `BoundedQueue` | FIFO per claimed slot; racing producers may publish out of order |
//! | `UnboundedQueue` | Exact append order |
//!
//! ## Example
//!
//! ```
//! use nexus_mpmc::{BoundedQueue, UnboundedQueue};
//!
//! let bounded = BoundedQueue::<u64>::new(3).unwrap();
//! assert!(bounded.try_enqueue(1).is_ok());
//! assert_eq!(bounded.try_dequeue(), Some(1));
//!
//! let unbounded = UnboundedQueue::new();
//! unbounded.enqueue("hello");
//! assert_eq!(unbounded.try_dequeue(), Some("hello"));
//! ```
//!
//! ## Features
//!
//! - `tracing`: emit construction and diagnostic events through
//!   [`tracing`](https://docs.rs/tracing). Disabled by default; without it
//!   every trace call compiles to nothing.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod bounded;
pub mod error;
pub mod trace;
pub mod unbounded;

pub use bounded::BoundedQueue;
pub use error::{AllocError, Full, InvalidCapacity};
pub use unbounded::UnboundedQueue;
