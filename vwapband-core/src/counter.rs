//! Daily entry-signal tally, shared across engines.

use std::sync::Mutex;

use chrono::{NaiveDate, Utc};

#[derive(Debug, Default)]
struct CounterInner {
    count: u64,
    last_reset: Option<NaiveDate>,
}

/// Counts entry signals (fresh entries and scale-ins) per UTC day.
///
/// The tally rolls over lazily: the first access after UTC midnight zeroes
/// the count. Exits, take-profits and stop-losses are never counted.
#[derive(Debug, Default)]
pub struct SignalCounter {
    inner: Mutex<CounterInner>,
}

impl SignalCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Today's running count.
    pub fn today(&self) -> u64 {
        self.count_for(Utc::now().date_naive())
    }

    /// Record `n` entry signals against today's tally.
    pub fn record(&self, n: u64) {
        self.record_for(Utc::now().date_naive(), n);
    }

    /// Count as of `date`, rolling the tally if the day has changed.
    pub fn count_for(&self, date: NaiveDate) -> u64 {
        let mut inner = self.lock();
        Self::roll(&mut inner, date);
        inner.count
    }

    /// Record against an explicit date. Exposed for deterministic tests.
    pub fn record_for(&self, date: NaiveDate, n: u64) {
        let mut inner = self.lock();
        Self::roll(&mut inner, date);
        inner.count += n;
    }

    fn roll(inner: &mut CounterInner, date: NaiveDate) {
        if inner.last_reset != Some(date) {
            inner.count = 0;
            inner.last_reset = Some(date);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CounterInner> {
        // A poisoned counter only ever holds a stale tally; recover it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
