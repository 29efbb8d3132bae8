//! Bounded session bar window and the daily reset predicate.
//!
//! The window is an owned ring buffer of the most recent N bars, evicted
//! FIFO. It exists only for duplicate detection, regression checks, and
//! access to the latest bar; the session stats use separate O(1)
//! accumulators and are never recomputed from this window.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::VecDeque;

use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct SessionWindow {
    bars: VecDeque<Bar>,
    capacity: usize,
    session_date: Option<NaiveDate>,
}

impl SessionWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            session_date: None,
        }
    }

    /// The UTC calendar date the current accumulators belong to.
    pub fn session_date(&self) -> Option<NaiveDate> {
        self.session_date
    }

    /// True when `date` starts a new UTC session: no session yet, or a later
    /// calendar date (never a decrease).
    pub fn should_reset(&self, date: NaiveDate) -> bool {
        match self.session_date {
            None => true,
            Some(current) => date > current,
        }
    }

    /// Clear the window and rebind it to `date`.
    pub fn reset(&mut self, date: NaiveDate) {
        self.bars.clear();
        self.session_date = Some(date);
    }

    /// Exact-timestamp duplicate check. Bars arrive in non-decreasing
    /// timestamp order, so the deque is sorted and binary search applies.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.bars
            .binary_search_by_key(&timestamp, |bar| bar.timestamp)
            .is_ok()
    }

    /// True when `timestamp` precedes the latest retained bar (out-of-order
    /// delivery, distinct from an exact duplicate).
    pub fn is_regression(&self, timestamp: DateTime<Utc>) -> bool {
        self.latest()
            .map(|bar| timestamp < bar.timestamp)
            .unwrap_or(false)
    }

    /// Append a bar, evicting the oldest once over capacity.
    pub fn push(&mut self, bar: Bar) {
        while self.bars.len() >= self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
