//! Noise source wrapped by continuous health tests.
//!
//! The monitored source owns the `HealthState` of its instance. It feeds
//! every delta through the tests, reports newly latched failures to the
//! failure registry and refuses to hand out deltas while a fatal failure is
//! latched.

use super::timer::{SourceError, TimeSource};
use crate::health::{delta, ConfigError, HealthConfig, HealthState, InitType, RawDelta};
use crate::registry::{FailureEvent, FailureRegistry};
use chrono::Utc;
use std::sync::Arc;

/// One health-checked timing delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Distance between the two timer readings.
    pub delta: RawDelta,
    /// The stuck heuristic flagged this delta.
    pub stuck: bool,
}

/// A timer whose deltas are only released while the health tests pass.
pub struct MonitoredSource<T: TimeSource> {
    name: String,
    timer: T,
    health: HealthState,
    registry: Arc<FailureRegistry>,
    prev: Option<u64>,
    seen_epoch: u64,
}

impl<T: TimeSource> MonitoredSource<T> {
    /// Creates a source and initializes its health tests.
    pub fn new(
        name: impl Into<String>,
        timer: T,
        config: HealthConfig,
        registry: Arc<FailureRegistry>,
        init_type: InitType,
    ) -> Result<Self, ConfigError> {
        let health = HealthState::new(config, init_type)?;
        let seen_epoch = registry.switch_epoch();
        Ok(Self {
            name: name.into(),
            timer,
            health,
            registry,
            prev: None,
            seen_epoch,
        })
    }

    /// Collects one delta and runs the health tests on it.
    ///
    /// While an NTG.1 startup test is running, deltas are fed to the tests
    /// but withheld; the first delta is released only after the startup
    /// window has passed.
    pub fn next_sample(&mut self) -> Result<Sample, SourceError> {
        self.refuse_if_failed()?;

        if self.health.in_startup() {
            tracing::debug!(source = %self.name, "Running startup health test");
            while self.health.in_startup() {
                self.collect()?;
                self.refuse_if_failed()?;
            }
        }

        let sample = self.collect()?;
        self.refuse_if_failed()?;
        Ok(sample)
    }

    fn collect(&mut self) -> Result<Sample, SourceError> {
        let epoch = self.registry.switch_epoch();
        if epoch != self.seen_epoch {
            self.seen_epoch = epoch;
            // The previous reading belongs to the old noise source.
            self.prev = None;
            self.health.begin_switch_grace();
        }

        let prev = match self.prev {
            Some(prev) => prev,
            None => self.timer.now()?,
        };
        let next = self.timer.now()?;
        self.prev = Some(next);

        let delta = delta(prev, next);
        let stuck = self.health.stuck(delta);

        if let Some(new_flags) = self.health.take_new_failures() {
            let event = FailureEvent {
                source: self.name.clone(),
                new_flags,
                latched: self.health.health_failure(),
                status: self.health.status(),
                sample: self.health.samples(),
                observed_at: Utc::now(),
            };
            if !self.registry.notify(&event) {
                tracing::debug!(source = %self.name, flags = %new_flags, "No failure callback registered");
            }
        }

        Ok(Sample { delta, stuck })
    }

    fn refuse_if_failed(&self) -> Result<(), SourceError> {
        if self.health.startup_blocked() {
            return Err(SourceError::StartupFailed);
        }
        if self.health.is_fatal() {
            return Err(SourceError::Unhealthy {
                flags: self.health.health_failure(),
            });
        }
        Ok(())
    }

    /// Reinitializes the health tests, e.g. after a reseed.
    pub fn reinit(&mut self, init_type: InitType) {
        self.health.health_init(init_type);
        self.prev = None;
    }

    /// Name reported in failure events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Health test state of this instance.
    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// Underlying timer, e.g. to switch its profile.
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}
