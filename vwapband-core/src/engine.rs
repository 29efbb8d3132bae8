//! `SignalEngine`, the per-symbol composition root.
//!
//! Ingest pipeline: enabled gate → symbol check → validation → duplicate
//! drop → daily reset → regression check → history append → (volume > 0
//! only) stats fold + state machine. All-or-nothing per bar: a rejected bar
//! mutates nothing.

use chrono::NaiveDate;
use thiserror::Error;

use crate::bands::Bands;
use crate::config::SymbolConfig;
use crate::domain::{Bar, BarError, Position, SignalEvent};
use crate::machine::PositionStateMachine;
use crate::session::SessionWindow;
use crate::stats::IncrementalStats;

/// Why a bar was rejected at the ingestion boundary. Rejections are local
/// and recoverable; the engine never raises a fault that aborts the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("malformed bar: {0}")]
    Malformed(#[from] BarError),

    #[error("timestamp regression: bar precedes the latest retained bar")]
    TimestampRegression,

    #[error("bar for '{got}' routed to the '{expected}' engine")]
    SymbolMismatch { expected: String, got: String },
}

/// Outcome of ingesting one bar.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// Bar accepted; zero or more signal events were emitted.
    Applied { events: Vec<SignalEvent> },
    /// Exact-timestamp duplicate, silently absorbed (idempotent ingestion
    /// under at-least-once delivery).
    Duplicate,
    /// Engine disabled; bar dropped without mutating state.
    Disabled,
    /// Malformed or out-of-order; bar dropped without mutating state.
    Rejected(RejectReason),
}

/// Tally of a backfill pass over an ordered range of bars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillSummary {
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub dropped: usize,
    pub events: Vec<SignalEvent>,
}

/// One symbol's engine: session stats + bar window + position machine.
///
/// All access to one engine must be serialized by the caller (a mutex or a
/// single-owner task); the transition logic reads-then-writes several fields
/// that must change as a unit per bar.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    symbol: String,
    config: SymbolConfig,
    stats: IncrementalStats,
    window: SessionWindow,
    machine: PositionStateMachine,
    enabled: bool,
}

impl SignalEngine {
    pub fn new(symbol: impl Into<String>, config: SymbolConfig) -> Self {
        let window = SessionWindow::new(config.retention_bars);
        Self {
            symbol: symbol.into(),
            config,
            stats: IncrementalStats::new(),
            window,
            machine: PositionStateMachine::new(),
            enabled: true,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &SymbolConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle ingestion. Disabling drops bars without mutating state;
    /// re-enabling resumes from the current (not reset) state.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Ingest one closed bar.
    pub fn ingest_bar(&mut self, bar: &Bar) -> Ingest {
        if !self.enabled {
            return Ingest::Disabled;
        }
        if bar.symbol != self.symbol {
            return Ingest::Rejected(RejectReason::SymbolMismatch {
                expected: self.symbol.clone(),
                got: bar.symbol.clone(),
            });
        }
        if let Err(err) = bar.validate() {
            return Ingest::Rejected(RejectReason::Malformed(err));
        }
        if self.window.contains(bar.timestamp) {
            return Ingest::Duplicate;
        }

        let bar_date = bar.timestamp.date_naive();
        if self.window.should_reset(bar_date) {
            self.stats.reset();
            self.window.reset(bar_date);
        } else if self.window.is_regression(bar.timestamp) {
            return Ingest::Rejected(RejectReason::TimestampRegression);
        }

        self.window.push(bar.clone());

        // Zero-volume bars participate in duplicate detection and "latest
        // bar" but are skipped entirely for stats and signal checks.
        if bar.volume <= 0.0 {
            return Ingest::Applied { events: Vec::new() };
        }

        self.stats.update(bar.typical_price(), bar.volume);

        let snapshot = match self.stats.current() {
            Some(snapshot) => snapshot,
            None => return Ingest::Applied { events: Vec::new() },
        };
        let bands = Bands::from_snapshot(snapshot, self.config.calc_mode, self.config.band_multiplier);
        let events = self.machine.on_bar(bar, &bands, &self.config);

        Ingest::Applied { events }
    }

    /// Apply `ingest_bar` to each bar of an ordered range.
    ///
    /// Deduplication makes repeated backfill of overlapping ranges a no-op
    /// for already-seen bars.
    pub fn backfill_range(&mut self, bars: &[Bar]) -> BackfillSummary {
        let mut summary = BackfillSummary::default();
        for bar in bars {
            match self.ingest_bar(bar) {
                Ingest::Applied { mut events } => {
                    summary.applied += 1;
                    summary.events.append(&mut events);
                }
                Ingest::Duplicate => summary.duplicates += 1,
                Ingest::Rejected(_) => summary.rejected += 1,
                Ingest::Disabled => summary.dropped += 1,
            }
        }
        summary
    }

    /// Snapshot of the current position.
    pub fn position(&self) -> &Position {
        self.machine.position()
    }

    /// Current VWAP/upper/lower, or None while the session has no volume.
    pub fn current_bands(&self) -> Option<Bands> {
        self.stats
            .current()
            .map(|snapshot| Bands::from_snapshot(snapshot, self.config.calc_mode, self.config.band_multiplier))
    }

    pub fn latest_bar(&self) -> Option<&Bar> {
        self.window.latest()
    }

    pub fn session_date(&self) -> Option<NaiveDate> {
        self.window.session_date()
    }

    pub fn bar_count(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionState;
    use chrono::{TimeZone, Utc};

    fn engine() -> SignalEngine {
        SignalEngine::new(
            "ETHUSDT",
            SymbolConfig {
                session_delay_min: 0,
                ..SymbolConfig::default()
            },
        )
    }

    fn bar(minute: u32, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar {
            symbol: "ETHUSDT".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn duplicate_bar_is_absorbed() {
        let mut eng = engine();
        let b = bar(0, 101.0, 99.0, 100.0, 10.0);
        assert!(matches!(eng.ingest_bar(&b), Ingest::Applied { .. }));
        assert_eq!(eng.ingest_bar(&b), Ingest::Duplicate);
        assert_eq!(eng.bar_count(), 1);
    }

    #[test]
    fn regression_rejected_without_mutation() {
        let mut eng = engine();
        eng.ingest_bar(&bar(5, 101.0, 99.0, 100.0, 10.0));
        let bands_before = eng.current_bands();

        let outcome = eng.ingest_bar(&bar(3, 101.0, 99.0, 100.0, 10.0));
        assert_eq!(
            outcome,
            Ingest::Rejected(RejectReason::TimestampRegression)
        );
        assert_eq!(eng.current_bands(), bands_before);
        assert_eq!(eng.bar_count(), 1);
    }

    #[test]
    fn malformed_bar_rejected_without_mutation() {
        let mut eng = engine();
        let mut b = bar(0, 101.0, 99.0, 100.0, 10.0);
        b.close = f64::NAN;
        assert!(matches!(
            eng.ingest_bar(&b),
            Ingest::Rejected(RejectReason::Malformed(_))
        ));
        assert_eq!(eng.bar_count(), 0);
        assert_eq!(eng.current_bands(), None);
    }

    #[test]
    fn wrong_symbol_rejected() {
        let mut eng = engine();
        let mut b = bar(0, 101.0, 99.0, 100.0, 10.0);
        b.symbol = "BTCUSDT".into();
        assert!(matches!(
            eng.ingest_bar(&b),
            Ingest::Rejected(RejectReason::SymbolMismatch { .. })
        ));
    }

    #[test]
    fn disabled_engine_drops_bars_and_resumes() {
        let mut eng = engine();
        eng.ingest_bar(&bar(0, 101.0, 99.0, 100.0, 10.0));
        let bands_before = eng.current_bands();

        eng.set_enabled(false);
        assert_eq!(eng.ingest_bar(&bar(1, 102.0, 98.0, 101.0, 20.0)), Ingest::Disabled);
        assert_eq!(eng.current_bands(), bands_before);

        eng.set_enabled(true);
        assert!(matches!(
            eng.ingest_bar(&bar(2, 102.0, 98.0, 101.0, 20.0)),
            Ingest::Applied { .. }
        ));
        assert_ne!(eng.current_bands(), bands_before);
    }

    #[test]
    fn zero_volume_bar_skips_stats_and_signals() {
        let mut eng = engine();
        let outcome = eng.ingest_bar(&bar(0, 100.0, 98.0, 99.0, 0.0));
        assert_eq!(outcome, Ingest::Applied { events: Vec::new() });
        assert_eq!(eng.current_bands(), None);
        assert_eq!(eng.bar_count(), 1);

        // Same timestamp later is still a duplicate.
        assert_eq!(eng.ingest_bar(&bar(0, 100.0, 98.0, 99.0, 5.0)), Ingest::Duplicate);
    }

    #[test]
    fn day_rollover_resets_stats_but_not_position() {
        let mut eng = engine();
        // First bar of a session always crosses the collapsed bands, so
        // this tape opens a long, reverses short, then reverses back long.
        eng.ingest_bar(&bar(0, 102.0, 98.0, 100.0, 100.0));
        eng.ingest_bar(&bar(1, 103.0, 98.0, 99.0, 100.0));
        let outcome = eng.ingest_bar(&bar(2, 100.0, 95.0, 99.0, 100.0));
        if let Ingest::Applied { events } = outcome {
            assert!(!events.is_empty());
        } else {
            panic!("expected applied");
        }
        assert_eq!(eng.position().state, PositionState::Long);
        assert_eq!(eng.bar_count(), 3);

        // First bar of the next UTC day.
        let next_day = Bar {
            symbol: "ETHUSDT".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
            open: 99.0,
            high: 100.0,
            low: 98.0,
            close: 99.5,
            volume: 10.0,
        };
        eng.ingest_bar(&next_day);

        assert_eq!(eng.session_date(), Some(next_day.timestamp.date_naive()));
        assert_eq!(eng.bar_count(), 1);
        // VWAP after reset reflects only the new bar's typical price.
        let bands = eng.current_bands().unwrap();
        assert!((bands.vwap - next_day.typical_price()).abs() < 1e-12);
        // The open position survives the session reset.
        assert_eq!(eng.position().state, PositionState::Long);
    }

    #[test]
    fn backfill_is_idempotent() {
        let mut eng = engine();
        let bars: Vec<Bar> = (0..10)
            .map(|i| bar(i, 101.0 + i as f64 * 0.1, 99.0, 100.0, 10.0))
            .collect();

        let first = eng.backfill_range(&bars);
        assert_eq!(first.applied, 10);
        assert_eq!(first.duplicates, 0);

        let bands_after = eng.current_bands();
        let position_after = eng.position().clone();

        let second = eng.backfill_range(&bars);
        assert_eq!(second.applied, 0);
        assert_eq!(second.duplicates, 10);
        assert!(second.events.is_empty());
        assert_eq!(eng.current_bands(), bands_after);
        assert_eq!(eng.position(), &position_after);
    }
}
