//! End-to-end replay scenarios through `SignalEngine::ingest_bar`.

use chrono::{Duration, TimeZone, Utc};
use vwapband_core::{
    Bar, CalcMode, Ingest, PositionState, SignalEngine, SignalKind, SymbolConfig,
};

fn bar(day: u32, hour: u32, minute: i64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    // `minute` may run past 59; it is an offset from the hour, not a clock
    // field.
    Bar {
        symbol: "ETHUSDT".into(),
        timestamp: Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
            + Duration::minutes(minute),
        open: close,
        high,
        low,
        close,
        volume,
    }
}

fn events(outcome: Ingest) -> Vec<vwapband_core::SignalEvent> {
    match outcome {
        Ingest::Applied { events } => events,
        other => panic!("expected Applied, got {other:?}"),
    }
}

#[test]
fn zero_volume_opening_bar_produces_no_state() {
    let mut engine = SignalEngine::new(
        "ETHUSDT",
        SymbolConfig {
            session_delay_min: 0,
            ..SymbolConfig::default()
        },
    );

    let out = engine.ingest_bar(&bar(1, 12, 0, 100.0, 98.0, 99.0, 0.0));
    assert!(events(out).is_empty());
    assert_eq!(engine.current_bands(), None);
    assert_eq!(engine.position().state, PositionState::None);

    // First bar with volume establishes VWAP = typical price, stdev = 0,
    // so the bands collapse onto the VWAP.
    let out = engine.ingest_bar(&bar(1, 12, 1, 100.0, 98.0, 99.0, 10.0));
    let fired = events(out);
    let bands = engine.current_bands().unwrap();
    assert!((bands.vwap - 99.0).abs() < 1e-12);
    assert!((bands.upper - 99.0).abs() < 1e-12);
    assert!((bands.lower - 99.0).abs() < 1e-12);
    // Collapsed bands are crossed both ways; flat ties break to BUY.
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].kind, SignalKind::Buy);
    assert!((fired[0].entry_price - 99.0).abs() < 1e-12);
}

#[test]
fn long_entry_then_stop_out() {
    let mut engine = SignalEngine::new(
        "ETHUSDT",
        SymbolConfig {
            calc_mode: CalcMode::PercentOfVwap,
            session_delay_min: 0,
            ..SymbolConfig::default()
        },
    );

    // Establish a session well inside the bands.
    assert!(events(engine.ingest_bar(&bar(1, 12, 0, 101.0, 99.0, 100.0, 10.0))).is_empty());

    // Deep low pierces the lower band.
    let fired = events(engine.ingest_bar(&bar(1, 12, 1, 97.0, 94.0, 96.0, 10.0)));
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].kind, SignalKind::Buy);
    assert_eq!(engine.position().state, PositionState::Long);
    let entry = engine.position().entry_price.unwrap();
    let stop = engine.position().stop_price.unwrap();
    assert!((stop - entry * 0.97).abs() < 1e-9);

    // A bar trading through the stop emits exactly one STOPLOSS and flattens.
    let fired = events(engine.ingest_bar(&bar(1, 12, 2, 95.0, stop - 1.0, 94.0, 10.0)));
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].kind, SignalKind::StopLoss);
    assert_eq!(fired[0].entry_price, entry);
    assert_eq!(fired[0].stop_price, Some(stop));
    assert!(fired[0].peak_profit_pct.is_some());
    assert_eq!(engine.position().state, PositionState::None);
    assert_eq!(engine.position().entry_price, None);
}

#[test]
fn session_delay_suppresses_early_entries() {
    let mut engine = SignalEngine::new(
        "ETHUSDT",
        SymbolConfig {
            calc_mode: CalcMode::PercentOfVwap,
            session_delay_min: 30,
            cooldown_min: 0,
            ..SymbolConfig::default()
        },
    );

    assert!(events(engine.ingest_bar(&bar(1, 0, 5, 101.0, 99.0, 100.0, 10.0))).is_empty());
    // Qualifying cross at minute 10: stats update, no signal.
    let fired = events(engine.ingest_bar(&bar(1, 0, 10, 97.0, 90.0, 95.0, 10.0)));
    assert!(fired.is_empty());
    assert_eq!(engine.position().state, PositionState::None);
    assert!(engine.current_bands().is_some());

    // Same shape at minute 30 fires.
    let fired = events(engine.ingest_bar(&bar(1, 0, 30, 97.0, 90.0, 95.0, 10.0)));
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].kind, SignalKind::Buy);
}

#[test]
fn midnight_rollover_isolates_sessions() {
    let mut engine = SignalEngine::new(
        "ETHUSDT",
        SymbolConfig {
            session_delay_min: 0,
            ..SymbolConfig::default()
        },
    );

    // Heavy day-one volume far from day two's prices.
    engine.ingest_bar(&bar(1, 23, 58, 201.0, 199.0, 200.0, 1000.0));
    engine.ingest_bar(&bar(1, 23, 59, 202.0, 198.0, 201.0, 1000.0));
    assert!(engine.current_bands().unwrap().vwap > 199.0);

    // Day two opens much lower; after the reset the VWAP reflects only the
    // new session, not yesterday's 200-level prints.
    let opening = bar(2, 0, 0, 101.0, 99.0, 100.0, 1.0);
    engine.ingest_bar(&opening);
    assert_eq!(engine.bar_count(), 1);
    assert_eq!(engine.session_date(), Some(opening.timestamp.date_naive()));
    let bands = engine.current_bands().unwrap();
    assert!((bands.vwap - opening.typical_price()).abs() < 1e-12);
}

#[test]
fn replayed_feed_is_an_exact_no_op() {
    let mut engine = SignalEngine::new(
        "ETHUSDT",
        SymbolConfig {
            session_delay_min: 0,
            ..SymbolConfig::default()
        },
    );

    let feed: Vec<Bar> = (0..120)
        .map(|i| {
            let wobble = (i % 7) as f64;
            bar(1, 12, i, 101.0 + wobble, 98.0 - wobble, 100.0, 10.0 + wobble)
        })
        .collect();

    let first = engine.backfill_range(&feed);
    assert_eq!(first.applied, 120);

    let bands = engine.current_bands();
    let position = engine.position().clone();

    // At-least-once delivery: the whole tape arrives again.
    let second = engine.backfill_range(&feed);
    assert_eq!(second.applied, 0);
    assert_eq!(second.duplicates, 120);
    assert!(second.events.is_empty());
    assert_eq!(engine.current_bands(), bands);
    assert_eq!(engine.position(), &position);
}
