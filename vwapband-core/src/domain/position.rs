//! Per-symbol position tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    None,
    Long,
    Short,
}

impl PositionState {
    pub fn is_open(self) -> bool {
        self != PositionState::None
    }
}

/// Position record for one symbol.
///
/// `entry_price` and `stop_price` are set iff the position is open. The
/// cooldown anchors are monotonic and independent of the current state: a
/// long-side cooldown persists after exiting to a short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub state: PositionState,
    pub entry_price: Option<f64>,
    pub stop_price: Option<f64>,
    /// Running maximum of unrealized profit percent since entry (>= 0).
    pub peak_profit_pct: f64,
    pub last_buy_at: Option<DateTime<Utc>>,
    pub last_sell_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            state: PositionState::None,
            entry_price: None,
            stop_price: None,
            peak_profit_pct: 0.0,
            last_buy_at: None,
            last_sell_at: None,
        }
    }

    /// Unrealized profit percent at `close`, relative to the entry price.
    ///
    /// Long: (close - entry) / entry * 100. Short: (entry - close) / entry * 100.
    /// Returns None when flat.
    pub fn unrealized_profit_pct(&self, close: f64) -> Option<f64> {
        let entry = self.entry_price?;
        match self.state {
            PositionState::Long => Some((close - entry) / entry * 100.0),
            PositionState::Short => Some((entry - close) / entry * 100.0),
            PositionState::None => None,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}
