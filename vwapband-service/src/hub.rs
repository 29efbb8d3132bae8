//! `EngineHub`: one locked `SignalEngine` per tracked symbol.
//!
//! Feed, backfill and command threads all go through the hub. Locking is
//! per symbol, so a slow ingest on one market never blocks the others.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use vwapband_core::{
    BackfillSummary, Bands, Bar, Ingest, Position, SignalCounter, SignalEngine, SymbolConfig,
};

pub struct EngineHub {
    engines: BTreeMap<String, Mutex<SignalEngine>>,
    counter: SignalCounter,
    running: AtomicBool,
}

/// Point-in-time view of one symbol, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolStatus {
    pub symbol: String,
    pub position: Position,
    pub bands: Option<Bands>,
    pub last_close: Option<f64>,
    pub last_bar_at: Option<DateTime<Utc>>,
    pub bar_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub signals_today: u64,
    pub symbols: Vec<SymbolStatus>,
}

impl EngineHub {
    pub fn new(symbols: &[String], config: SymbolConfig) -> Self {
        let engines = symbols
            .iter()
            .map(|symbol| {
                (
                    symbol.clone(),
                    Mutex::new(SignalEngine::new(symbol.clone(), config.clone())),
                )
            })
            .collect();
        Self {
            engines,
            counter: SignalCounter::new(),
            running: AtomicBool::new(true),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }

    pub fn tracks(&self, symbol: &str) -> bool {
        self.engines.contains_key(symbol)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Pause or resume signal generation across every engine.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        for engine in self.engines.values() {
            self.locked(engine).set_enabled(running);
        }
    }

    /// Route one bar to its engine. `None` means the symbol is not tracked.
    ///
    /// Entry events bump the daily signal counter.
    pub fn ingest(&self, bar: &Bar) -> Option<Ingest> {
        let engine = self.engines.get(&bar.symbol)?;
        let outcome = self.locked(engine).ingest_bar(bar);
        if let Ingest::Applied { events } = &outcome {
            let entries = events.iter().filter(|e| e.kind.is_entry()).count() as u64;
            if entries > 0 {
                self.counter.record_for(bar.timestamp.date_naive(), entries);
            }
        }
        Some(outcome)
    }

    /// Backfill an ordered range into one symbol's engine.
    pub fn backfill(&self, symbol: &str, bars: &[Bar]) -> Option<BackfillSummary> {
        let engine = self.engines.get(symbol)?;
        Some(self.locked(engine).backfill_range(bars))
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        let engine = self.engines.get(symbol)?;
        Some(self.locked(engine).position().clone())
    }

    pub fn bands(&self, symbol: &str) -> Option<Bands> {
        let engine = self.engines.get(symbol)?;
        self.locked(engine).current_bands()
    }

    pub fn latest_bar_at(&self, symbol: &str) -> Option<DateTime<Utc>> {
        let engine = self.engines.get(symbol)?;
        self.locked(engine).latest_bar().map(|bar| bar.timestamp)
    }

    pub fn signals_today(&self) -> u64 {
        self.counter.today()
    }

    pub fn signals_on(&self, date: chrono::NaiveDate) -> u64 {
        self.counter.count_for(date)
    }

    pub fn status(&self) -> StatusSnapshot {
        let symbols = self
            .engines
            .iter()
            .map(|(symbol, engine)| {
                let engine = self.locked(engine);
                SymbolStatus {
                    symbol: symbol.clone(),
                    position: engine.position().clone(),
                    bands: engine.current_bands(),
                    last_close: engine.latest_bar().map(|bar| bar.close),
                    last_bar_at: engine.latest_bar().map(|bar| bar.timestamp),
                    bar_count: engine.bar_count(),
                }
            })
            .collect();

        StatusSnapshot {
            running: self.is_running(),
            signals_today: self.signals_today(),
            symbols,
        }
    }

    fn locked<'a>(&self, engine: &'a Mutex<SignalEngine>) -> std::sync::MutexGuard<'a, SignalEngine> {
        engine.lock().unwrap_or_else(|poisoned| {
            warn!("engine mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
