//! Signal events emitted by the position state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of signal kinds.
///
/// Entry kinds (`Buy`, `Sell`, `ScaleInBuy`, `ScaleInSell`) count toward the
/// daily signal tally; exits and stop-losses do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Buy,
    Sell,
    ScaleInBuy,
    ScaleInSell,
    ExitLong,
    ExitShort,
    Tp1,
    StopLoss,
}

impl SignalKind {
    pub fn is_entry(self) -> bool {
        matches!(
            self,
            SignalKind::Buy | SignalKind::Sell | SignalKind::ScaleInBuy | SignalKind::ScaleInSell
        )
    }

    /// Human-readable label used in notification messages.
    pub fn label(self) -> &'static str {
        match self {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::ScaleInBuy => "2ND BUY",
            SignalKind::ScaleInSell => "2ND SELL",
            SignalKind::ExitLong => "EXIT LONG",
            SignalKind::ExitShort => "EXIT SHORT",
            SignalKind::Tp1 => "TP1",
            SignalKind::StopLoss => "STOPLOSS",
        }
    }
}

/// Why a position was (partially) closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    ScaleInLong,
    ScaleInShort,
    OppositeSignal,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::ScaleInLong => write!(f, "Scale-In LONG"),
            ExitReason::ScaleInShort => write!(f, "Scale-In SHORT"),
            ExitReason::OppositeSignal => write!(f, "Opposite Signal"),
        }
    }
}

/// A single signal event, delivered to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub kind: SignalKind,
    pub symbol: String,
    pub entry_price: f64,
    pub stop_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub peak_profit_pct: Option<f64>,
    pub reason: Option<ExitReason>,
    pub timestamp: DateTime<Utc>,
}

impl SignalEvent {
    /// A new or scaled-in entry at `entry_price` with its computed stop.
    pub fn entry(
        kind: SignalKind,
        symbol: impl Into<String>,
        entry_price: f64,
        stop_price: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        debug_assert!(kind.is_entry());
        Self {
            kind,
            symbol: symbol.into(),
            entry_price,
            stop_price: Some(stop_price),
            exit_price: None,
            peak_profit_pct: None,
            reason: None,
            timestamp,
        }
    }

    /// An exit (reversal leg or scale-in TP1) at `exit_price`.
    pub fn exit(
        kind: SignalKind,
        symbol: impl Into<String>,
        entry_price: f64,
        exit_price: f64,
        peak_profit_pct: f64,
        reason: ExitReason,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            entry_price,
            stop_price: None,
            exit_price: Some(exit_price),
            peak_profit_pct: Some(peak_profit_pct),
            reason: Some(reason),
            timestamp,
        }
    }

    /// A stop-loss exit; `stop_price` doubles as the exit level.
    pub fn stop_loss(
        symbol: impl Into<String>,
        entry_price: f64,
        stop_price: f64,
        peak_profit_pct: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: SignalKind::StopLoss,
            symbol: symbol.into(),
            entry_price,
            stop_price: Some(stop_price),
            exit_price: None,
            peak_profit_pct: Some(peak_profit_pct),
            reason: None,
            timestamp,
        }
    }
}
