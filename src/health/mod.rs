//! Continuous health tests for timing-jitter noise sources.
//!
//! Every raw delta goes through the stuck heuristic, the Repetition Count
//! Test and the Adaptive Proportion Test. Failures latch in a per-instance
//! [`HealthState`] until it is explicitly reinitialized.

mod apt;
mod config;
mod delta;
mod flags;
mod rct;
mod state;
mod stuck;

pub use apt::{apt_cutoff, AdaptiveProportionTest, DEFAULT_WINDOW_SIZE};
pub use config::{ConfigError, FileConfig, HealthConfig};
pub use delta::{delta, RawDelta};
pub use flags::HealthFailure;
pub use rct::{rct_intermittent_cutoff, rct_permanent_cutoff, RepetitionCountTest};
pub use state::{HealthState, HealthStatus, InitType};
pub use stuck::StuckDetector;
