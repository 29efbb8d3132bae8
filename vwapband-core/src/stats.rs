//! Incremental session VWAP and standard deviation.
//!
//! One pass, O(1) per bar: cumulative volume, cumulative price*volume, and a
//! cumulative variance contribution. The deviation for each bar is measured
//! against the *post-update* VWAP, so the accumulated variance mixes terms
//! with differing baselines. That makes this a streaming approximation of
//! the volume-weighted variance, not the exact population figure. Signals
//! depend on the exact values this recurrence produces; do not replace it
//! with a two-pass formula.

/// Current VWAP estimate. Defined only once non-zero volume has been folded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VwapSnapshot {
    pub vwap: f64,
    /// Always >= 0; exactly 0 after a single bar (no deviation yet).
    pub stdev: f64,
}

/// Running accumulators for one symbol's session.
#[derive(Debug, Clone, Default)]
pub struct IncrementalStats {
    cum_volume: f64,
    cum_price_volume: f64,
    cum_variance: f64,
    current: Option<VwapSnapshot>,
}

impl IncrementalStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one bar into the accumulators.
    ///
    /// Bars with `volume <= 0` are a no-op: they carry no information for a
    /// volume-weighted statistic.
    pub fn update(&mut self, typical_price: f64, volume: f64) {
        if volume <= 0.0 {
            return;
        }

        self.cum_price_volume += typical_price * volume;
        self.cum_volume += volume;

        let vwap = self.cum_price_volume / self.cum_volume;
        let deviation = typical_price - vwap;
        self.cum_variance += volume * deviation * deviation;

        let variance = self.cum_variance / self.cum_volume;
        let stdev = if variance > 0.0 { variance.sqrt() } else { 0.0 };

        self.current = Some(VwapSnapshot { vwap, stdev });
    }

    /// Zero all accumulators (session boundary).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Present estimate, or None while no volume has been observed.
    pub fn current(&self) -> Option<VwapSnapshot> {
        self.current
    }

    pub fn cumulative_volume(&self) -> f64 {
        self.cum_volume
    }
}
