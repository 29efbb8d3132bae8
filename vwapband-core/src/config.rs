//! Per-symbol engine configuration.

use serde::{Deserialize, Serialize};

/// How the band basis is derived from the session stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalcMode {
    /// Basis = session standard deviation around the VWAP.
    StandardDeviation,
    /// Basis = 1% of the current VWAP.
    PercentOfVwap,
}

/// Engine parameters for one symbol.
///
/// Defaults mirror the production deployment: 3.1x stdev bands, 30-minute
/// session delay and cooldown, 3% hard stop, one day of minute bars retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    /// Band width multiplier applied to the basis.
    pub band_multiplier: f64,
    pub calc_mode: CalcMode,
    /// Signals are suppressed for the first N minutes of the UTC session.
    pub session_delay_min: i64,
    /// Minimum minutes between same-direction entries.
    pub cooldown_min: i64,
    /// Hard stop distance as a percent of the entry price.
    pub stoploss_percent: f64,
    /// Bar history retention (duplicate detection window).
    pub retention_bars: usize,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            band_multiplier: 3.1,
            calc_mode: CalcMode::StandardDeviation,
            session_delay_min: 30,
            cooldown_min: 30,
            stoploss_percent: 3.0,
            retention_bars: 1440,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let cfg = SymbolConfig::default();
        assert_eq!(cfg.band_multiplier, 3.1);
        assert_eq!(cfg.calc_mode, CalcMode::StandardDeviation);
        assert_eq!(cfg.session_delay_min, 30);
        assert_eq!(cfg.cooldown_min, 30);
        assert_eq!(cfg.stoploss_percent, 3.0);
        assert_eq!(cfg.retention_bars, 1440);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: SymbolConfig =
            serde_json::from_str(r#"{"band_multiplier": 2.0, "calc_mode": "percent-of-vwap"}"#)
                .unwrap();
        assert_eq!(cfg.band_multiplier, 2.0);
        assert_eq!(cfg.calc_mode, CalcMode::PercentOfVwap);
        assert_eq!(cfg.cooldown_min, 30);
    }
}
