//! Acknowledgement range tracking and completeness checks.

use serde::{Deserialize, Serialize};

/// An ordered, coalescing set of inclusive message-number ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSet {
    ranges: Vec<(u64, u64)>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn insert(&mut self, number: u64) {
        self.insert_range(number, number);
    }

    /// Insert an inclusive range, merging with any overlapping or adjacent
    /// existing ranges.
    pub fn insert_range(&mut self, lower: u64, upper: u64) {
        debug_assert!(lower <= upper);
        let mut merged = Vec::with_capacity(self.ranges.len() + 1);
        let mut lo = lower;
        let mut hi = upper;
        for &(a, b) in &self.ranges {
            // Saturating: bounds at u64::MAX must not wrap the adjacency test.
            if b.saturating_add(1) < lo {
                merged.push((a, b));
            } else if hi.saturating_add(1) < a {
                // Everything after is disjoint and already sorted.
                merged.push((lo, hi));
                lo = a;
                hi = b;
            } else {
                lo = lo.min(a);
                hi = hi.max(b);
            }
        }
        merged.push((lo, hi));
        merged.sort_unstable();
        self.ranges = merged;
    }

    pub fn contains(&self, number: u64) -> bool {
        self.ranges.iter().any(|&(a, b)| a <= number && number <= b)
    }

    pub fn max(&self) -> Option<u64> {
        self.ranges.last().map(|&(_, b)| b)
    }

    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges
    }

    /// True when the first range covers 1..=upper (or when `upper` is 0).
    fn covers_prefix(&self, upper: u64) -> bool {
        if upper == 0 {
            return true;
        }
        matches!(self.ranges.first(), Some(&(1, b)) if b >= upper)
    }
}

/// Whether a sequence's acknowledgement state is "clean": every message
/// number below `next_expected` has been acknowledged. A non-positive
/// `next_expected` means no message number has been assigned yet, which
/// counts as clean.
pub fn is_complete(completed: &RangeSet, next_expected: i64) -> bool {
    if next_expected <= 1 {
        return true;
    }
    completed.covers_prefix((next_expected - 1) as u64)
}

/// Whether the completed set contains a number at or beyond `next_expected`.
/// That state indicates a protocol violation by the peer.
pub fn violates_window(completed: &RangeSet, next_expected: i64) -> bool {
    if next_expected < 0 {
        return false;
    }
    completed
        .max()
        .map(|m| m >= next_expected as u64)
        .unwrap_or(false)
}
