//! Failure classification bitmask.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Set of health test failures.
///
/// Bit values follow the layout used by jitterentropy so that masks can be
/// compared against logs from other implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthFailure(u32);

impl HealthFailure {
    /// No failure.
    pub const NONE: Self = Self(0);
    /// RCT crossed the intermittent cutoff (alpha = 2^-30).
    pub const RCT_INTERMITTENT: Self = Self(1 << 0);
    /// APT crossed the intermittent cutoff.
    pub const APT_FAILURE: Self = Self(1 << 1);
    /// RCT crossed the permanent cutoff (alpha = 2^-60).
    pub const RCT_PERMANENT: Self = Self(1 << 3);
    /// APT crossed the permanent cutoff.
    pub const APT_PERMANENT: Self = Self(1 << 4);
    /// The most recent sample was stuck. Informational, never latched.
    pub const STUCK: Self = Self(1 << 6);

    /// Failures that stop the source from delivering output.
    pub const FATAL: Self = Self(Self::APT_FAILURE.0 | Self::RCT_PERMANENT.0 | Self::APT_PERMANENT.0);
    /// Failures that survive an NTG.1 runtime reinitialization.
    pub const PERMANENT: Self = Self(Self::RCT_PERMANENT.0 | Self::APT_PERMANENT.0);
    /// Every flag that can be latched.
    pub const LATCHABLE: Self = Self(Self::RCT_INTERMITTENT.0 | Self::FATAL.0);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::RCT_INTERMITTENT, "RCT_INTERMITTENT"),
        (Self::APT_FAILURE, "APT_FAILURE"),
        (Self::RCT_PERMANENT, "RCT_PERMANENT"),
        (Self::APT_PERMANENT, "APT_PERMANENT"),
        (Self::STUCK, "STUCK"),
    ];

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds a mask from raw bits, dropping unknown ones.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & (Self::LATCHABLE.0 | Self::STUCK.0))
    }

    /// True when no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every flag of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any flag of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True when a fatal failure is present.
    pub const fn is_fatal(self) -> bool {
        self.intersects(Self::FATAL)
    }

    /// Sets every flag of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears every flag of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Iterates over the names of the set flags.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl BitOr for HealthFailure {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for HealthFailure {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for HealthFailure {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for HealthFailure {
    type Output = Self;

    fn not(self) -> Self {
        Self::from_bits_truncate(!self.0)
    }
}

impl fmt::Display for HealthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for name in self.names() {
            if !first {
                f.write_str(" | ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}
