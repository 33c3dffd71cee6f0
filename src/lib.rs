//! Jitter Health Library
//!
//! Continuous health tests for timing-jitter entropy sources, following
//! SP800-90B (Repetition Count Test, Adaptive Proportion Test) with an
//! additional stuck value heuristic and AIS 20/31 NTG.1 startup/runtime
//! initialization policies.
//!
//! # Architecture
//!
//! ```text
//! timer → delta → stuck ─┬→ RCT ─┐
//!                        └→ APT ─┴→ HealthState (latched flags)
//!                                        ↓
//!                          FailureRegistry (callback, switch gate)
//! ```
//!
//! # Design Principles
//!
//! - **Fail-closed**: Fatal failures latch until explicit reinitialization
//! - **Per-instance state**: One `HealthState` per entropy source, fed in order
//! - **No silent recovery**: NTG.1 runtime retests keep fatal evidence
//! - **Injectable notification**: The failure callback lives in a registry object
//!
//! # Example
//!
//! ```no_run
//! use jitter_health::{
//!     health::{HealthConfig, HealthState, InitType, delta},
//!     registry,
//! };
//!
//! let registry = registry::init();
//! registry
//!     .set_failure_callback(|event| eprintln!("health failure: {}", event.new_flags))
//!     .unwrap();
//!
//! let mut health = HealthState::new(HealthConfig::default(), InitType::Ntg1Startup).unwrap();
//! let (prev, next) = (1_000u64, 2_345u64);
//! let stuck = health.stuck(delta(prev, next));
//!
//! if health.is_fatal() {
//!     // Refuse to deliver output.
//! }
//! # let _ = stuck;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod health;
pub mod metrics;
pub mod registry;
pub mod source;

// Re-export commonly used types at crate root
pub use health::{delta, HealthConfig, HealthFailure, HealthState, HealthStatus, InitType};
pub use registry::{FailureEvent, FailureRegistry, RegistryError};
pub use source::{MonitoredSource, SimulatedTimer, SourceError, TimeSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
