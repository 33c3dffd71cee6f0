//! Stuck value heuristic.
//!
//! A jitter source that produces a perfectly repeating or perfectly linear
//! sequence of timing deltas is no longer behaving randomly. A delta is
//! classified as stuck when its value, its first difference, or its second
//! difference is zero.

use super::delta::{delta, RawDelta};

/// Samples needed before the second difference is meaningful.
const PRIMING_SAMPLES: u8 = 2;

/// Rolling history for the stuck classification.
#[derive(Debug, Clone, Default)]
pub struct StuckDetector {
    /// Previous delta.
    last_delta: RawDelta,
    /// Previous first-order difference.
    last_delta2: RawDelta,
    /// Samples seen since the last reset, saturating at `PRIMING_SAMPLES`.
    primed: u8,
}

impl StuckDetector {
    /// Creates a detector with empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `current_delta` and rolls it into the history.
    ///
    /// The first two samples after a reset only prime the history and are
    /// always reported as not stuck.
    pub fn classify(&mut self, current_delta: RawDelta) -> bool {
        let delta2 = delta(self.last_delta, current_delta);
        let delta3 = delta(self.last_delta2, delta2);

        self.last_delta = current_delta;
        self.last_delta2 = delta2;

        if self.primed < PRIMING_SAMPLES {
            self.primed += 1;
            return false;
        }

        current_delta == 0 || delta2 == 0 || delta3 == 0
    }

    /// Returns true once enough history exists to judge a sample.
    pub fn is_primed(&self) -> bool {
        self.primed >= PRIMING_SAMPLES
    }

    /// Forgets the history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
