//! Noise source plumbing around the health tests.
//!
//! Provides a timer abstraction with synthetic implementations and a
//! monitored source that surfaces fatal health failures as a refusal to
//! produce output.

mod monitored;
mod timer;

pub use monitored::{MonitoredSource, Sample};
pub use timer::{JitterProfile, ScriptedTimer, SimulatedTimer, SimulationConfig, SourceError, TimeSource};
