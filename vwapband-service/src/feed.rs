//! Bar feeds: where live closed bars come from.
//!
//! `PollingFeed` asks a `HistoricalBarSource` for fresh bars on a fixed
//! cadence. `ChannelFeed` adapts an `mpsc` receiver, which is what tests
//! and any push-based transport use. `drive_feed` is the main ingest loop.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use vwapband_core::{Bar, Ingest, RejectReason};

use crate::batcher::SignalBatcher;
use crate::hub::EngineHub;
use crate::source::{HistoricalBarSource, SourceError};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("feed closed")]
    Closed,
}

/// A blocking stream of closed bars. `Ok(None)` means "nothing right now";
/// `Err(FeedError::Closed)` ends the drive loop.
pub trait BarFeed {
    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError>;
}

/// Polls a historical source for each tracked symbol in turn.
///
/// Keeps a per-symbol cursor just past the last bar it handed out, so each
/// poll only yields bars the loop has not seen from this feed before. The
/// engines deduplicate anyway; the cursor just keeps requests small.
pub struct PollingFeed {
    source: Arc<dyn HistoricalBarSource>,
    symbols: Vec<String>,
    cursors: Vec<DateTime<Utc>>,
    queue: std::collections::VecDeque<Bar>,
    poll_interval: Duration,
    next_poll_at: Instant,
    page: usize,
}

impl PollingFeed {
    pub fn new(
        source: Arc<dyn HistoricalBarSource>,
        symbols: Vec<String>,
        start: DateTime<Utc>,
        poll_interval: Duration,
        page: usize,
    ) -> Self {
        let cursors = vec![start; symbols.len()];
        Self {
            source,
            symbols,
            cursors,
            queue: std::collections::VecDeque::new(),
            poll_interval,
            next_poll_at: Instant::now(),
            page,
        }
    }

    fn poll_round(&mut self) -> Result<(), FeedError> {
        for i in 0..self.symbols.len() {
            let symbol = &self.symbols[i];
            match self.source.fetch(symbol, self.cursors[i], self.page) {
                Ok(bars) => {
                    if let Some(last) = bars.last() {
                        self.cursors[i] = last.timestamp + chrono::Duration::milliseconds(1);
                    }
                    debug!(symbol, fetched = bars.len(), "poll round");
                    self.queue.extend(bars);
                }
                Err(e) => {
                    // One symbol failing must not starve the rest.
                    warn!(symbol, error = %e, "poll fetch failed");
                }
            }
        }
        Ok(())
    }
}

impl BarFeed for PollingFeed {
    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        if let Some(bar) = self.queue.pop_front() {
            return Ok(Some(bar));
        }

        let now = Instant::now();
        if now < self.next_poll_at {
            std::thread::sleep(self.next_poll_at - now);
        }
        self.next_poll_at = Instant::now() + self.poll_interval;

        self.poll_round()?;
        Ok(self.queue.pop_front())
    }
}

/// Adapts an `mpsc::Receiver<Bar>`; the feed ends when every sender drops.
pub struct ChannelFeed {
    rx: mpsc::Receiver<Bar>,
}

impl ChannelFeed {
    pub fn new(rx: mpsc::Receiver<Bar>) -> Self {
        Self { rx }
    }
}

impl BarFeed for ChannelFeed {
    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        match self.rx.recv() {
            Ok(bar) => Ok(Some(bar)),
            Err(mpsc::RecvError) => Err(FeedError::Closed),
        }
    }
}

/// Main ingest loop: pull bars from the feed, route them through the hub,
/// forward emitted signals to the batcher. Returns when the feed closes.
pub fn drive_feed(
    feed: &mut dyn BarFeed,
    hub: &EngineHub,
    batcher: &SignalBatcher,
) -> Result<(), FeedError> {
    loop {
        let bar = match feed.next_bar() {
            Ok(Some(bar)) => bar,
            Ok(None) => continue,
            Err(FeedError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };

        match hub.ingest(&bar) {
            None => {
                warn!(symbol = %bar.symbol, "bar for untracked symbol dropped");
            }
            Some(Ingest::Applied { events }) => {
                batcher.submit_all(events);
            }
            Some(Ingest::Duplicate) | Some(Ingest::Disabled) => {}
            Some(Ingest::Rejected(reason)) => match reason {
                RejectReason::TimestampRegression => {
                    debug!(symbol = %bar.symbol, "stale bar dropped");
                }
                other => {
                    warn!(symbol = %bar.symbol, reason = %other, "bar rejected");
                }
            },
        }
    }
}
