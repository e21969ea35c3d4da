//! Counter-to-rate derivation.
//!
//! Counters are cumulative totals reported by the remote agent. A rate is the
//! difference between two successive samples divided by the time between
//! them. A counter that goes backwards (agent restart, 32-bit wraparound) is
//! treated as a reset: the cycle reports 0 and the new value becomes the
//! baseline. Lost deltas across a reset are not reconstructed.

/// Per-second rate between two counter readings.
///
/// Returns 0 when there is no previous reading, when `elapsed_seconds` is not
/// a positive finite number, or when the counter decreased.
pub fn rate(current: f64, previous: Option<f64>, elapsed_seconds: f64) -> f64 {
    let Some(previous) = previous else {
        return 0.0;
    };
    if !(elapsed_seconds.is_finite() && elapsed_seconds > 0.0) {
        return 0.0;
    }
    if current < previous {
        return 0.0;
    }
    (current - previous) / elapsed_seconds
}

/// Baseline for one (endpoint, counter metric) pair.
///
/// Owned by the collector. Created on the first successful sample and only
/// ever advanced afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterState {
    pub last_value: f64,
    /// Unix epoch seconds of `last_value`.
    pub last_timestamp: f64,
}

impl CounterState {
    pub fn new(value: f64, at: f64) -> Self {
        Self {
            last_value: value,
            last_timestamp: at,
        }
    }

    /// Rate from the stored baseline to `value`, then move the baseline.
    ///
    /// The baseline always moves, including after a reset, so the following
    /// cycle differences against the post-reset value.
    pub fn advance(&mut self, value: f64, at: f64) -> f64 {
        let r = rate(value, Some(self.last_value), at - self.last_timestamp);
        self.last_value = value;
        self.last_timestamp = at;
        r
    }
}
