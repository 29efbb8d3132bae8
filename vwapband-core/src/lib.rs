//! Per-symbol incremental VWAP/band signal engine.
//!
//! This crate contains the algorithmic heart of the system:
//! - Domain types (bars, positions, signal events, per-symbol config)
//! - Incremental session VWAP and standard deviation (O(1) per bar)
//! - Band derivation (stdev or percent-of-VWAP basis)
//! - Bounded session bar window with duplicate detection and daily reset
//! - Position state machine (stop-loss, scale-in, reversal, cooldowns)
//! - The `SignalEngine` composition root with idempotent ingestion
//!
//! Everything here is pure, synchronous, non-blocking computation. All I/O
//! (feeds, backfill, notification delivery, commands) lives in the service
//! crate and calls in with already-materialized bar data.

pub mod bands;
pub mod config;
pub mod counter;
pub mod domain;
pub mod engine;
pub mod machine;
pub mod session;
pub mod stats;

pub use bands::Bands;
pub use config::{CalcMode, SymbolConfig};
pub use counter::SignalCounter;
pub use domain::{Bar, BarError, ExitReason, Position, PositionState, SignalEvent, SignalKind};
pub use engine::{BackfillSummary, Ingest, RejectReason, SignalEngine};
pub use machine::PositionStateMachine;
pub use session::SessionWindow;
pub use stats::{IncrementalStats, VwapSnapshot};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: engine state is Send + Sync so a hub can share
    /// per-symbol engines across worker threads behind a mutex.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Bar>();
        require_sync::<Bar>();
        require_send::<Position>();
        require_sync::<Position>();
        require_send::<SignalEvent>();
        require_sync::<SignalEvent>();
        require_send::<SymbolConfig>();
        require_sync::<SymbolConfig>();
        require_send::<IncrementalStats>();
        require_sync::<IncrementalStats>();
        require_send::<SessionWindow>();
        require_sync::<SessionWindow>();
        require_send::<PositionStateMachine>();
        require_sync::<PositionStateMachine>();
        require_send::<SignalEngine>();
        require_sync::<SignalEngine>();
        require_send::<SignalCounter>();
        require_sync::<SignalCounter>();
    }
}
