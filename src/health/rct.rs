//! Repetition Count Test (SP800-90B section 4.4.1).
//!
//! The cutoffs assume an entropy of `1/osr` bits per delta, the minimum that
//! still yields full entropy after oversampling, so `C = ceil(-log2(alpha) / H)`.
//! The count starts at zero rather than one, which already accounts for the
//! off-by-one relative to the pseudo code in SP800-90B.

use super::flags::HealthFailure;

/// Intermittent cutoff for alpha = 2^-30.
pub const fn rct_intermittent_cutoff(osr: u32) -> u32 {
    osr.saturating_mul(30)
}

/// Permanent cutoff for alpha = 2^-60.
pub const fn rct_permanent_cutoff(osr: u32) -> u32 {
    osr.saturating_mul(60)
}

/// Counter of consecutive stuck samples.
#[derive(Debug, Clone)]
pub struct RepetitionCountTest {
    count: u32,
    cutoff_intermittent: u32,
    cutoff_permanent: u32,
}

impl RepetitionCountTest {
    /// Creates a test with cutoffs derived from the oversampling rate.
    pub fn new(osr: u32) -> Self {
        Self {
            count: 0,
            cutoff_intermittent: rct_intermittent_cutoff(osr),
            cutoff_permanent: rct_permanent_cutoff(osr),
        }
    }

    /// Feeds one stuck classification and returns the flag it raises.
    pub fn insert(&mut self, stuck: bool) -> HealthFailure {
        if !stuck {
            self.count = 0;
            return HealthFailure::NONE;
        }

        self.count = self.count.saturating_add(1);
        if self.count >= self.cutoff_permanent {
            HealthFailure::RCT_PERMANENT
        } else if self.count >= self.cutoff_intermittent {
            HealthFailure::RCT_INTERMITTENT
        } else {
            HealthFailure::NONE
        }
    }

    /// Current run length of stuck samples.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Cutoff raising `RCT_INTERMITTENT`.
    pub fn cutoff_intermittent(&self) -> u32 {
        self.cutoff_intermittent
    }

    /// Cutoff raising `RCT_PERMANENT`.
    pub fn cutoff_permanent(&self) -> u32 {
        self.cutoff_permanent
    }

    /// Starts a new test period.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}
