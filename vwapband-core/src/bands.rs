//! Band derivation: VWAP +/- basis * multiplier.

use serde::{Deserialize, Serialize};

use crate::config::CalcMode;
use crate::stats::VwapSnapshot;

/// Upper/lower signal bands around the session VWAP.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub vwap: f64,
    pub upper: f64,
    pub lower: f64,
}

impl Bands {
    /// Pure derivation from the current stats snapshot.
    ///
    /// `StandardDeviation` uses the session stdev as basis; `PercentOfVwap`
    /// uses 1% of the VWAP. With a single bar in the session the stdev is 0
    /// and both bands collapse onto the VWAP.
    pub fn from_snapshot(snapshot: VwapSnapshot, mode: CalcMode, multiplier: f64) -> Self {
        let basis = match mode {
            CalcMode::StandardDeviation => snapshot.stdev,
            CalcMode::PercentOfVwap => snapshot.vwap * 0.01,
        };
        Bands {
            vwap: snapshot.vwap,
            upper: snapshot.vwap + basis * multiplier,
            lower: snapshot.vwap - basis * multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdev_mode_offsets_by_stdev() {
        let snap = VwapSnapshot {
            vwap: 100.0,
            stdev: 2.0,
        };
        let bands = Bands::from_snapshot(snap, CalcMode::StandardDeviation, 3.1);
        assert!((bands.upper - 106.2).abs() < 1e-12);
        assert!((bands.lower - 93.8).abs() < 1e-12);
        assert_eq!(bands.vwap, 100.0);
    }

    #[test]
    fn percent_mode_offsets_by_percent_of_vwap() {
        let snap = VwapSnapshot {
            vwap: 200.0,
            stdev: 5.0,
        };
        let bands = Bands::from_snapshot(snap, CalcMode::PercentOfVwap, 2.0);
        // basis = 200 * 0.01 = 2, offset = 4
        assert!((bands.upper - 204.0).abs() < 1e-12);
        assert!((bands.lower - 196.0).abs() < 1e-12);
    }

    #[test]
    fn zero_stdev_collapses_bands_onto_vwap() {
        let snap = VwapSnapshot {
            vwap: 99.0,
            stdev: 0.0,
        };
        let bands = Bands::from_snapshot(snap, CalcMode::StandardDeviation, 3.1);
        assert_eq!(bands.upper, 99.0);
        assert_eq!(bands.lower, 99.0);
    }
}
