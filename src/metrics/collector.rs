//! Metrics collection and registry.

use crate::health::{HealthState, HealthStatus};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation, registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of health test state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// 0 = healthy, 1 = soft failure, 2 = fatal.
    pub status: i64,
    /// Latched failure bitmask.
    pub failure_flags: u32,
    /// Current RCT run length.
    pub rct_count: u32,
    /// Current APT repeat count.
    pub apt_count: u32,
    /// Deltas observed in the current APT window.
    pub apt_observations: u32,
    /// Total deltas analyzed.
    pub total_samples: u64,
    /// Total deltas classified as stuck.
    pub stuck_samples: u64,
}

/// Prometheus metrics registry for health test monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Health status
    health_status: IntGauge,
    failure_flags: IntGauge,

    // Test counters
    rct_count: IntGauge,
    apt_count: IntGauge,
    apt_observations: IntGauge,

    // Sample totals
    total_samples: IntCounter,
    stuck_samples: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all health metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let health_status = IntGauge::new(
            "jitter_health_status",
            "Current health status (0=healthy, 1=soft failure, 2=fatal)",
        )?;
        let failure_flags = IntGauge::new(
            "jitter_health_failure_flags",
            "Latched health failure bitmask",
        )?;

        let rct_count = IntGauge::new(
            "jitter_health_rct_count",
            "Current run length of stuck deltas",
        )?;
        let apt_count = IntGauge::new(
            "jitter_health_apt_count",
            "Repeats of the APT reference delta in the current window",
        )?;
        let apt_observations = IntGauge::new(
            "jitter_health_apt_observations",
            "Deltas observed in the current APT window",
        )?;

        let total_samples = IntCounter::new(
            "jitter_health_samples_total",
            "Total number of deltas analyzed",
        )?;
        let stuck_samples = IntCounter::new(
            "jitter_health_stuck_samples_total",
            "Total number of deltas classified as stuck",
        )?;

        registry.register(Box::new(health_status.clone()))?;
        registry.register(Box::new(failure_flags.clone()))?;
        registry.register(Box::new(rct_count.clone()))?;
        registry.register(Box::new(apt_count.clone()))?;
        registry.register(Box::new(apt_observations.clone()))?;
        registry.register(Box::new(total_samples.clone()))?;
        registry.register(Box::new(stuck_samples.clone()))?;

        Ok(Self {
            registry,
            health_status,
            failure_flags,
            rct_count,
            apt_count,
            apt_observations,
            total_samples,
            stuck_samples,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.health_status.set(snapshot.status);
        self.failure_flags.set(i64::from(snapshot.failure_flags));
        self.rct_count.set(i64::from(snapshot.rct_count));
        self.apt_count.set(i64::from(snapshot.apt_count));
        self.apt_observations.set(i64::from(snapshot.apt_observations));

        // Counters only move forward; add the difference
        let current_samples = self.total_samples.get();
        if snapshot.total_samples > current_samples {
            self.total_samples.inc_by(snapshot.total_samples - current_samples);
        }
        let current_stuck = self.stuck_samples.get();
        if snapshot.stuck_samples > current_stuck {
            self.stuck_samples.inc_by(snapshot.stuck_samples - current_stuck);
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from a health state.
    pub fn from_health(health: &HealthState) -> Self {
        let status = match health.status() {
            HealthStatus::Healthy => 0,
            HealthStatus::SoftFailure => 1,
            HealthStatus::FatalLatched => 2,
        };

        Self {
            status,
            failure_flags: health.health_failure().bits(),
            rct_count: health.rct_count(),
            apt_count: health.apt_count(),
            apt_observations: health.apt_observations(),
            total_samples: health.samples(),
            stuck_samples: health.stuck_samples(),
        }
    }
}
