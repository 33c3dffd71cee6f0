//! Timer abstraction for the noise source.
//!
//! Real platform timers are out of scope here; the implementations below
//! generate synthetic counter readings for tests and demonstrations.

use crate::health::HealthFailure;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while sampling a noise source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The timer could not be read.
    #[error("timer read failed: {0}")]
    Timer(String),
    /// A fatal failure is latched.
    #[error("health tests failed ({flags}); output refused")]
    Unhealthy {
        /// Latched failure flags.
        flags: HealthFailure,
    },
    /// The NTG.1 startup test failed.
    #[error("startup health test failed; source permanently blocked")]
    StartupFailed,
}

/// A monotonic, possibly wrapping, high resolution counter.
pub trait TimeSource {
    /// Reads the current counter value.
    fn now(&mut self) -> Result<u64, SourceError>;
}

/// Shape of the synthetic timing deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JitterProfile {
    /// `base` plus a uniform jitter in `0..spread`.
    Jitter {
        /// Minimum delta.
        base: u64,
        /// Width of the jitter range.
        spread: u64,
    },
    /// Every delta equals `step`.
    Constant {
        /// Delta between readings.
        step: u64,
    },
    /// The counter never advances.
    Frozen,
    /// Deltas grow by `slope` each sample.
    Linear {
        /// First delta.
        start: u64,
        /// Increment per sample.
        slope: u64,
    },
}

impl Default for JitterProfile {
    fn default() -> Self {
        Self::Jitter {
            base: 1_000,
            spread: 4_096,
        }
    }
}

/// Simulated timer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Shape of the generated deltas.
    pub profile: JitterProfile,
    /// ChaCha20 seed for the jitter.
    pub seed: u64,
    /// First counter value; values near `u64::MAX` exercise wraparound.
    pub start: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            profile: JitterProfile::default(),
            seed: 0x6a69_7474_6572,
            start: 0,
        }
    }
}

/// Deterministic synthetic timer.
#[derive(Debug, Clone)]
pub struct SimulatedTimer {
    rng: ChaCha20Rng,
    profile: JitterProfile,
    counter: u64,
    step: u64,
}

impl SimulatedTimer {
    /// Creates a timer starting at `config.start`.
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(config.seed),
            profile: config.profile,
            counter: config.start,
            step: 0,
        }
    }

    /// Changes the delta profile without touching the counter.
    pub fn set_profile(&mut self, profile: JitterProfile) {
        self.profile = profile;
        self.step = 0;
    }

    fn next_delta(&mut self) -> u64 {
        let delta = match self.profile {
            JitterProfile::Jitter { base, spread } => {
                base.wrapping_add(self.rng.next_u64() % spread.max(1))
            }
            JitterProfile::Constant { step } => step,
            JitterProfile::Frozen => 0,
            JitterProfile::Linear { start, slope } => start.wrapping_add(slope.wrapping_mul(self.step)),
        };
        self.step += 1;
        delta
    }
}

impl TimeSource for SimulatedTimer {
    fn now(&mut self) -> Result<u64, SourceError> {
        let value = self.counter;
        let delta = self.next_delta();
        self.counter = self.counter.wrapping_add(delta);
        Ok(value)
    }
}

/// Replays a fixed sequence of counter values.
#[derive(Debug, Clone)]
pub struct ScriptedTimer {
    values: std::vec::IntoIter<u64>,
}

impl ScriptedTimer {
    /// Creates a timer that returns `values` in order, then fails.
    pub fn new(values: Vec<u64>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }
}

impl TimeSource for ScriptedTimer {
    fn now(&mut self) -> Result<u64, SourceError> {
        self.values
            .next()
            .ok_or_else(|| SourceError::Timer("scripted timer exhausted".into()))
    }
}
