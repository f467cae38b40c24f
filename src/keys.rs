//! Run-wide surrogate key generator for `songplay_id`.

use std::ops::Range;
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out contiguous, non-overlapping blocks of ids.
///
/// Ids start at 1 and are unique within the process. They are not stable
/// across runs.
#[derive(Debug)]
pub struct SurrogateKeys {
    next: AtomicI64,
}

impl SurrogateKeys {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }

    /// Reserve `count` consecutive ids.
    pub fn allocate(&self, count: usize) -> Range<i64> {
        let count = count as i64;
        let start = self.next.fetch_add(count, Ordering::Relaxed);
        start..start + count
    }
}

impl Default for SurrogateKeys {
    fn default() -> Self {
        Self::new()
    }
}
