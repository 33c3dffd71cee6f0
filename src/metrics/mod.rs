//! Prometheus metrics for health test monitoring.
//!
//! # Metrics Exposed
//!
//! - `jitter_health_status` - Health status (0=healthy, 1=soft failure, 2=fatal)
//! - `jitter_health_failure_flags` - Latched failure bitmask
//! - `jitter_health_rct_count` - Current RCT run length
//! - `jitter_health_apt_count` - Current APT repeat count
//! - `jitter_health_apt_observations` - Deltas in the current APT window
//! - `jitter_health_samples_total` - Total deltas analyzed
//! - `jitter_health_stuck_samples_total` - Total stuck deltas
//!
//! # Example
//!
//! ```no_run
//! use jitter_health::health::{HealthConfig, HealthState, InitType};
//! use jitter_health::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let health = HealthState::new(HealthConfig::default(), InitType::Common).unwrap();
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.update(&MetricsSnapshot::from_health(&health));
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
