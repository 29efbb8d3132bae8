//! The fundamental market data unit: one closed OHLCV candle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A closed OHLCV bar for a single symbol at minute resolution.
///
/// Immutable once ingested. The engine requires non-decreasing timestamps
/// per symbol and rejects anything older than the latest retained bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Validation failures for a single bar. These are rejection reports, not
/// faults: a malformed bar is dropped with no state mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarError {
    #[error("non-finite {field}")]
    NonFinite { field: &'static str },

    #[error("negative volume")]
    NegativeVolume,

    #[error("high {high} below low {low}")]
    HighBelowLow { high: String, low: String },
}

impl Bar {
    /// Typical price: (high + low + close) / 3.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Validate finiteness and basic OHLCV sanity.
    ///
    /// Volume may be zero (such bars carry no information for a
    /// volume-weighted statistic) but never negative.
    pub fn validate(&self) -> Result<(), BarError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(BarError::NonFinite { field });
            }
        }
        if self.volume < 0.0 {
            return Err(BarError::NegativeVolume);
        }
        if self.high < self.low {
            return Err(BarError::HighBelowLow {
                high: self.high.to_string(),
                low: self.low.to_string(),
            });
        }
        Ok(())
    }
}
