// nexus-mpmc/src/error.rs

//! Error and rejection types.
//!
//! A full bounded queue and a failed node allocation both hand the rejected
//! item back to the caller, who stays responsible for it.

use std::fmt;

/// Capacity passed to [`BoundedQueue::new`](crate::BoundedQueue::new) was
/// zero or too large for the signed permit counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCapacity {
    /// The rejected capacity.
    pub capacity: usize,
}

impl fmt::Display for InvalidCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.capacity == 0 {
            write!(f, "capacity must be positive")
        } else {
            write!(
                f,
                "capacity {} exceeds max {}",
                self.capacity,
                isize::MAX
            )
        }
    }
}

impl std::error::Error for InvalidCapacity {}

/// The bounded queue had no free slot. Contains the rejected value.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that couldn't be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> std::error::Error for Full<T> {}

/// A node for the unbounded queue could not be allocated. Contains the
/// value that couldn't be enqueued.
///
/// This is resource exhaustion, not a capacity limit: the unbounded queue
/// has none.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AllocError<T>(pub T);

impl<T> AllocError<T> {
    /// Returns the value that couldn't be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for AllocError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AllocError(..)")
    }
}

impl<T> fmt::Display for AllocError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node allocation failed")
    }
}

impl<T> std::error::Error for AllocError<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_capacity_messages() {
        assert_eq!(
            InvalidCapacity { capacity: 0 }.to_string(),
            "capacity must be positive"
        );
        let msg = InvalidCapacity {
            capacity: usize::MAX,
        }
        .to_string();
        assert!(msg.contains("exceeds max"));
    }

    #[test]
    fn rejected_value_is_returned() {
        let err = Full(String::from("order"));
        assert_eq!(err.to_string(), "queue is full");
        assert_eq!(err.into_inner(), "order");

        let err = AllocError(vec![1u8, 2, 3]);
        assert_eq!(err.to_string(), "node allocation failed");
        assert_eq!(err.into_inner(), vec![1, 2, 3]);
    }
}
