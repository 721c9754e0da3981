//! Round-robin cursor shared by every dispatch attempt.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared round-robin position.
///
/// The position is always kept in `[0, n)` for the healthy-set size `n` seen by
/// the most recent attempt, and advances by exactly one per attempt.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    position: AtomicUsize,
}

impl RoundRobinCursor {
    /// Create a cursor starting at the first backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and advance the cursor for a healthy set of `len` backends.
    ///
    /// Returns the starting offset into that set, or `None` without advancing
    /// when the set is empty. The read and the advance are one atomic step, so
    /// concurrent callers never see the same pre-advance value.
    pub fn next_offset(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }

        let previous = self
            .position
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pos| {
                Some((pos % len + 1) % len)
            })
            .unwrap_or_else(|pos| pos);

        Some(previous % len)
    }

    /// Advance once and return `healthy` rotated to start at the chosen offset.
    ///
    /// The result is the failover order for one dispatch attempt.
    pub fn candidates(&self, healthy: &[usize]) -> Vec<usize> {
        match self.next_offset(healthy.len()) {
            Some(offset) => rotation(healthy, offset).collect(),
            None => Vec::new(),
        }
    }

    /// Current raw position, for diagnostics.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }
}

/// Iterate `items` starting at `offset`, wrapping around once.
pub fn rotation(items: &[usize], offset: usize) -> impl Iterator<Item = usize> + '_ {
    let len = items.len();
    (0..len).map(move |i| items[(offset + i) % len])
}
