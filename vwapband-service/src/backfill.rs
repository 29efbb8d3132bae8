//! Session backfill and catch-up.
//!
//! On startup every engine replays the current UTC session from midnight so
//! VWAP, bands and the duplicate window match a process that had been
//! running all day. Signals produced during backfill are historical and are
//! not notified. Catch-up runs periodically afterwards and fetches anything
//! the live feed missed; those bars are current, so their signals go out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use tracing::{info, warn};
use vwapband_core::Ingest;

use crate::batcher::SignalBatcher;
use crate::hub::EngineHub;
use crate::source::HistoricalBarSource;

const BACKFILL_PAGE: usize = 1000;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub symbols: usize,
    pub bars_applied: usize,
    pub bars_duplicate: usize,
    pub bars_rejected: usize,
    pub failures: usize,
}

/// Replay today's session into every engine, symbols in parallel.
pub fn session_backfill(
    hub: &EngineHub,
    source: &Arc<dyn HistoricalBarSource>,
    now: DateTime<Utc>,
) -> BackfillReport {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);

    let symbols = hub.symbols();
    let per_symbol: Vec<BackfillReport> = symbols
        .par_iter()
        .map(|symbol| backfill_symbol(hub, source, symbol, midnight))
        .collect();

    let mut report = BackfillReport {
        symbols: symbols.len(),
        ..BackfillReport::default()
    };
    for part in per_symbol {
        report.bars_applied += part.bars_applied;
        report.bars_duplicate += part.bars_duplicate;
        report.bars_rejected += part.bars_rejected;
        report.failures += part.failures;
    }
    info!(
        symbols = report.symbols,
        applied = report.bars_applied,
        failures = report.failures,
        "session backfill complete"
    );
    report
}

fn backfill_symbol(
    hub: &EngineHub,
    source: &Arc<dyn HistoricalBarSource>,
    symbol: &str,
    mut cursor: DateTime<Utc>,
) -> BackfillReport {
    let mut report = BackfillReport::default();

    loop {
        let page = match source.fetch(symbol, cursor, BACKFILL_PAGE) {
            Ok(page) => page,
            Err(e) => {
                warn!(symbol, error = %e, "backfill fetch failed");
                report.failures += 1;
                return report;
            }
        };
        if page.is_empty() {
            break;
        }

        let last_ts = page[page.len() - 1].timestamp;
        if let Some(summary) = hub.backfill(symbol, &page) {
            report.bars_applied += summary.applied;
            report.bars_duplicate += summary.duplicates;
            report.bars_rejected += summary.rejected;
        }

        if page.len() < BACKFILL_PAGE {
            break;
        }
        cursor = last_ts + Duration::milliseconds(1);
    }

    report
}

/// Fetch bars for any symbol whose newest bar lags `now` by more than
/// `lag_secs`. Unlike startup backfill these bars are current, so their
/// signal events are forwarded to the batcher.
pub fn catch_up(
    hub: &EngineHub,
    source: &Arc<dyn HistoricalBarSource>,
    batcher: &SignalBatcher,
    now: DateTime<Utc>,
    lag_secs: i64,
    page: usize,
) {
    for symbol in hub.symbols() {
        let last = match hub.latest_bar_at(&symbol) {
            Some(ts) => ts,
            None => continue,
        };
        let lag = now - last;
        if lag < Duration::seconds(lag_secs) {
            continue;
        }

        info!(symbol = %symbol, lag_secs = lag.num_seconds(), "catching up");
        let start = last + Duration::milliseconds(1);
        let bars = match source.fetch(&symbol, start, page) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "catch-up fetch failed");
                continue;
            }
        };

        for bar in &bars {
            if let Some(Ingest::Applied { events }) = hub.ingest(bar) {
                batcher.submit_all(events);
            }
        }
    }
}
