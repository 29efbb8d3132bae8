//! Position state machine: stop-loss, scale-in, reversal, fresh entry.
//!
//! Transitions run once per accepted bar, in fixed priority order:
//!
//! 1. Peak-profit update (runs first so the running maximum reflects every
//!    bar the position was held, including the bar it exits on)
//! 2. Stop-loss, terminal for the bar; no further logic runs
//! 3. Session suppression (first `session_delay_min` minutes of the UTC day,
//!    computed from the bar timestamp, not wall clock)
//! 4. Per-direction cooldown gates (entries and scale-ins only; exits and
//!    stop-losses are never gated)
//! 5. Scale-in chain (same-direction re-entry with minimum 1% profit)
//! 6. Entry/reversal chain
//!
//! A scale-in whose minimum-profit check fails does not consume the bar: the
//! entry/reversal chain still runs. If both bands are crossed while flat,
//! the BUY path wins; a deterministic tie-break, not a race.

use chrono::{DateTime, Timelike, Utc};

use crate::bands::Bands;
use crate::config::SymbolConfig;
use crate::domain::{Bar, ExitReason, Position, PositionState, SignalEvent, SignalKind};

/// Minimum favorable move, as a fraction of entry, before a scale-in fires.
const SCALE_IN_MIN_PROFIT: f64 = 0.01;

#[derive(Debug, Clone, Default)]
pub struct PositionStateMachine {
    position: Position,
}

impl PositionStateMachine {
    pub fn new() -> Self {
        Self {
            position: Position::flat(),
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Evaluate one accepted bar against the current bands.
    ///
    /// Returns zero, one, or two events (exit before entry for scale-ins and
    /// reversals). The position is mutated only on the paths that emit.
    pub fn on_bar(&mut self, bar: &Bar, bands: &Bands, config: &SymbolConfig) -> Vec<SignalEvent> {
        let mut events = Vec::new();

        if self.position.state.is_open() {
            if let Some(profit) = self.position.unrealized_profit_pct(bar.close) {
                if profit > self.position.peak_profit_pct {
                    self.position.peak_profit_pct = profit;
                }
            }
        }

        if let Some(event) = self.check_stop_loss(bar) {
            events.push(event);
            return events;
        }

        let suppressed = minutes_into_session(bar.timestamp) < config.session_delay_min;
        let cooldown = chrono::Duration::minutes(config.cooldown_min);
        let buy_ready = cooldown_elapsed(self.position.last_buy_at, bar.timestamp, cooldown);
        let sell_ready = cooldown_elapsed(self.position.last_sell_at, bar.timestamp, cooldown);
        let buy_cross = bar.low <= bands.lower;
        let sell_cross = bar.high >= bands.upper;

        // Scale-in chain: same-direction band re-cross with >= 1% favorable move.
        match self.position.state {
            PositionState::Short if !suppressed && sell_cross && sell_ready => {
                if let Some(entry) = self.position.entry_price {
                    if bar.close <= entry * (1.0 - SCALE_IN_MIN_PROFIT) {
                        events.push(SignalEvent::exit(
                            SignalKind::Tp1,
                            &bar.symbol,
                            entry,
                            bar.close,
                            self.position.peak_profit_pct,
                            ExitReason::ScaleInShort,
                            bar.timestamp,
                        ));
                        self.open_short(bar, bands.upper, config, SignalKind::ScaleInSell, &mut events);
                        return events;
                    }
                }
            }
            PositionState::Long if !suppressed && buy_cross && buy_ready => {
                if let Some(entry) = self.position.entry_price {
                    if bar.close >= entry * (1.0 + SCALE_IN_MIN_PROFIT) {
                        events.push(SignalEvent::exit(
                            SignalKind::Tp1,
                            &bar.symbol,
                            entry,
                            bar.close,
                            self.position.peak_profit_pct,
                            ExitReason::ScaleInLong,
                            bar.timestamp,
                        ));
                        self.open_long(bar, bands.lower, config, SignalKind::ScaleInBuy, &mut events);
                        return events;
                    }
                }
            }
            _ => {}
        }

        // Entry/reversal chain. Reversals are exits first, so they bypass the
        // cooldown gates; the entry they open still stamps a fresh anchor.
        match self.position.state {
            PositionState::None if !suppressed => {
                if buy_cross && buy_ready {
                    self.open_long(bar, bands.lower, config, SignalKind::Buy, &mut events);
                } else if sell_cross && sell_ready {
                    self.open_short(bar, bands.upper, config, SignalKind::Sell, &mut events);
                }
            }
            PositionState::Long if sell_cross && !suppressed => {
                if let Some(entry) = self.position.entry_price {
                    events.push(SignalEvent::exit(
                        SignalKind::ExitLong,
                        &bar.symbol,
                        entry,
                        bar.close,
                        self.position.peak_profit_pct,
                        ExitReason::OppositeSignal,
                        bar.timestamp,
                    ));
                }
                self.open_short(bar, bands.upper, config, SignalKind::Sell, &mut events);
            }
            PositionState::Short if buy_cross && !suppressed => {
                if let Some(entry) = self.position.entry_price {
                    events.push(SignalEvent::exit(
                        SignalKind::ExitShort,
                        &bar.symbol,
                        entry,
                        bar.close,
                        self.position.peak_profit_pct,
                        ExitReason::OppositeSignal,
                        bar.timestamp,
                    ));
                }
                self.open_long(bar, bands.lower, config, SignalKind::Buy, &mut events);
            }
            _ => {}
        }

        events
    }

    /// Stop-loss check. LONG stops out on `low <= stop`, SHORT on
    /// `high >= stop`. Terminal: clears the position and suppresses all
    /// further transition logic for this bar.
    fn check_stop_loss(&mut self, bar: &Bar) -> Option<SignalEvent> {
        let (entry, stop) = match (self.position.entry_price, self.position.stop_price) {
            (Some(entry), Some(stop)) => (entry, stop),
            _ => return None,
        };
        let hit = match self.position.state {
            PositionState::Long => bar.low <= stop,
            PositionState::Short => bar.high >= stop,
            PositionState::None => false,
        };
        if !hit {
            return None;
        }

        let event = SignalEvent::stop_loss(
            &bar.symbol,
            entry,
            stop,
            self.position.peak_profit_pct,
            bar.timestamp,
        );
        self.position.state = PositionState::None;
        self.position.entry_price = None;
        self.position.stop_price = None;
        self.position.peak_profit_pct = 0.0;
        Some(event)
    }

    fn open_long(
        &mut self,
        bar: &Bar,
        entry: f64,
        config: &SymbolConfig,
        kind: SignalKind,
        events: &mut Vec<SignalEvent>,
    ) {
        let stop = entry * (1.0 - config.stoploss_percent / 100.0);
        events.push(SignalEvent::entry(kind, &bar.symbol, entry, stop, bar.timestamp));
        self.position.state = PositionState::Long;
        self.position.entry_price = Some(entry);
        self.position.stop_price = Some(stop);
        self.position.peak_profit_pct = 0.0;
        self.position.last_buy_at = Some(bar.timestamp);
    }

    fn open_short(
        &mut self,
        bar: &Bar,
        entry: f64,
        config: &SymbolConfig,
        kind: SignalKind,
        events: &mut Vec<SignalEvent>,
    ) {
        let stop = entry * (1.0 + config.stoploss_percent / 100.0);
        events.push(SignalEvent::entry(kind, &bar.symbol, entry, stop, bar.timestamp));
        self.position.state = PositionState::Short;
        self.position.entry_price = Some(entry);
        self.position.stop_price = Some(stop);
        self.position.peak_profit_pct = 0.0;
        self.position.last_sell_at = Some(bar.timestamp);
    }
}

/// Minutes elapsed since UTC midnight of the bar's own day.
fn minutes_into_session(timestamp: DateTime<Utc>) -> i64 {
    i64::from(timestamp.hour() * 60 + timestamp.minute())
}

fn cooldown_elapsed(
    anchor: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: chrono::Duration,
) -> bool {
    match anchor {
        None => true,
        Some(at) => now - at >= cooldown,
    }
}
