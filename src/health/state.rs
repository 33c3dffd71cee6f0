//! Per-instance health state.
//!
//! Aggregates the stuck detector, RCT and APT, and latches their failures.
//! One `HealthState` belongs to exactly one entropy source instance and is fed
//! one delta per collected sample, in chronological order.

use super::apt::AdaptiveProportionTest;
use super::config::{ConfigError, HealthConfig};
use super::delta::RawDelta;
use super::flags::HealthFailure;
use super::rct::RepetitionCountTest;
use super::stuck::StuckDetector;
use serde::{Deserialize, Serialize};

/// Initialization policy for the health tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitType {
    /// Fresh instantiation: everything is cleared.
    Common,
    /// NTG.1 power-on self test: a failure inside the startup window blocks
    /// the instance for good.
    Ntg1Startup,
    /// NTG.1 continuous retest: counters restart, fatal evidence is kept.
    Ntg1Runtime,
}

/// Coarse health classification derived from the latched flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// No failure latched.
    Healthy,
    /// Only soft failures (`RCT_INTERMITTENT`) latched.
    SoftFailure,
    /// A fatal failure is latched; the source must not produce output.
    FatalLatched,
}

impl HealthStatus {
    fn classify(flags: HealthFailure, startup_blocked: bool) -> Self {
        if startup_blocked || flags.is_fatal() {
            Self::FatalLatched
        } else if !flags.is_empty() {
            Self::SoftFailure
        } else {
            Self::Healthy
        }
    }
}

/// Health test state of one entropy source instance.
#[derive(Debug, Clone)]
pub struct HealthState {
    config: HealthConfig,
    init_type: InitType,
    stuck: StuckDetector,
    rct: RepetitionCountTest,
    apt: AdaptiveProportionTest,
    /// Latched failures. Never contains `STUCK`.
    failure_flags: HealthFailure,
    /// Latched failures already handed out by `take_new_failures`.
    reported: HealthFailure,
    last_stuck: bool,
    startup_remaining: u32,
    startup_blocked: bool,
    grace_remaining: u32,
    samples: u64,
    stuck_samples: u64,
}

impl HealthState {
    /// Creates and initializes the health state for a new instance.
    pub fn new(config: HealthConfig, init_type: InitType) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut state = Self {
            rct: RepetitionCountTest::new(config.osr),
            apt: AdaptiveProportionTest::new(config.apt_window_size, config.osr),
            config,
            init_type,
            stuck: StuckDetector::new(),
            failure_flags: HealthFailure::NONE,
            reported: HealthFailure::NONE,
            last_stuck: false,
            startup_remaining: 0,
            startup_blocked: false,
            grace_remaining: 0,
            samples: 0,
            stuck_samples: 0,
        };
        state.health_init(init_type);
        Ok(state)
    }

    /// Reinitializes the health tests according to `init_type`.
    ///
    /// `Common` and `Ntg1Startup` clear every latched flag, `Ntg1Runtime`
    /// keeps the fatal ones. An instance whose startup test failed stays
    /// fatal whatever the init type. `Ntg1Runtime` requested while a startup
    /// test is still running restarts the counters but finishes the startup
    /// window first.
    ///
    /// The configuration is fixed for the lifetime of the state, so the
    /// cutoffs derived in [`HealthState::new`] are kept.
    pub fn health_init(&mut self, init_type: InitType) {
        let retained = match init_type {
            InitType::Common | InitType::Ntg1Startup => HealthFailure::NONE,
            InitType::Ntg1Runtime => self.failure_flags & HealthFailure::FATAL,
        };
        let resume_startup = init_type == InitType::Ntg1Runtime && self.in_startup();

        self.rct.reset();
        self.apt.reset();
        self.stuck.reset();
        self.failure_flags = retained;
        self.reported = self.reported & retained;
        self.last_stuck = false;
        self.grace_remaining = 0;
        self.startup_remaining = match init_type {
            InitType::Ntg1Startup => self.config.startup_samples,
            InitType::Ntg1Runtime if resume_startup => self.startup_remaining,
            _ => 0,
        };
        self.init_type = if resume_startup {
            InitType::Ntg1Startup
        } else {
            init_type
        };

        tracing::info!(
            init = ?init_type,
            osr = self.config.osr,
            rct_cutoff = self.rct.cutoff_intermittent(),
            rct_cutoff_permanent = self.rct.cutoff_permanent(),
            apt_cutoff = self.apt.cutoff(),
            apt_cutoff_permanent = self.apt.cutoff_permanent(),
            retained = %retained,
            resume_startup,
            "Health tests initialized"
        );
        if self.startup_blocked {
            tracing::warn!("Startup health test failed earlier; instance stays blocked");
        }
    }

    /// Classifies one delta as stuck and runs RCT and APT on it.
    ///
    /// Inside a switch grace window only the stuck history is updated.
    pub fn stuck(&mut self, current_delta: RawDelta) -> bool {
        self.samples += 1;

        let stuck = self.stuck.classify(current_delta);
        self.last_stuck = stuck;
        if stuck {
            self.stuck_samples += 1;
        }

        if self.grace_remaining > 0 {
            self.grace_remaining -= 1;
            tracing::trace!(
                delta = current_delta,
                remaining = self.grace_remaining,
                "Sample inside switch grace window"
            );
        } else {
            let raised = self.apt.insert(current_delta) | self.rct.insert(stuck);
            if !raised.is_empty() {
                self.latch(raised);
            }
        }

        self.advance_startup();
        stuck
    }

    fn latch(&mut self, raised: HealthFailure) {
        let new = raised & !self.failure_flags;
        self.failure_flags |= raised;
        if new.is_empty() {
            return;
        }

        tracing::warn!(
            flags = %new,
            rct_count = self.rct.count(),
            apt_count = self.apt.count(),
            apt_observations = self.apt.observations(),
            "Health test failure latched"
        );

        if self.in_startup() && !self.startup_blocked {
            self.startup_blocked = true;
            tracing::error!(flags = %new, "Startup health test failed; instance blocked");
        }
    }

    fn advance_startup(&mut self) {
        if self.startup_remaining == 0 {
            return;
        }
        self.startup_remaining -= 1;
        if self.startup_remaining == 0 && !self.startup_blocked {
            self.init_type = InitType::Ntg1Runtime;
            tracing::info!(
                samples = self.config.startup_samples,
                "Startup health test passed"
            );
        }
    }

    /// Reseeds the APT window with `current_delta` as reference value.
    pub fn apt_reinit(&mut self, current_delta: RawDelta, apt_count: u32, apt_observations: u32) {
        self.apt.reinit(current_delta, apt_count, apt_observations);
    }

    /// Opens a grace window after a deliberate noise source switch.
    ///
    /// Resets the stuck history, the RCT count and the APT window, then skips
    /// RCT/APT for `switch_grace_samples` deltas. Ignored during an NTG.1
    /// startup test; returns whether the window was opened.
    pub fn begin_switch_grace(&mut self) -> bool {
        if self.in_startup() {
            tracing::debug!("Switch grace window ignored during startup test");
            return false;
        }
        self.stuck.reset();
        self.rct.reset();
        self.apt.reset();
        self.grace_remaining = self.config.switch_grace_samples;
        tracing::debug!(samples = self.grace_remaining, "Switch grace window opened");
        true
    }

    /// Latched failure flags.
    ///
    /// `STUCK` is transient and never latched; use
    /// [`HealthState::sample_status`] to see it for the latest sample.
    pub fn health_failure(&self) -> HealthFailure {
        self.failure_flags
    }

    /// Latched failure flags plus `STUCK` if the last sample was stuck.
    pub fn sample_status(&self) -> HealthFailure {
        if self.last_stuck {
            self.failure_flags | HealthFailure::STUCK
        } else {
            self.failure_flags
        }
    }

    /// Health classification derived from the latched flags.
    pub fn status(&self) -> HealthStatus {
        HealthStatus::classify(self.failure_flags, self.startup_blocked)
    }

    /// True when the instance must not deliver output.
    pub fn is_fatal(&self) -> bool {
        self.status() == HealthStatus::FatalLatched
    }

    /// Returns flags latched since the previous call, if any.
    pub fn take_new_failures(&mut self) -> Option<HealthFailure> {
        let new = self.failure_flags & !self.reported;
        self.reported = self.failure_flags;
        (!new.is_empty()).then_some(new)
    }

    /// Configuration the cutoffs were derived from.
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Init policy currently in effect.
    pub fn init_type(&self) -> InitType {
        self.init_type
    }

    /// True while an NTG.1 startup test is running.
    pub fn in_startup(&self) -> bool {
        self.startup_remaining > 0
    }

    /// True once a failure inside the startup window blocked the instance.
    pub fn startup_blocked(&self) -> bool {
        self.startup_blocked
    }

    /// True while RCT/APT are skipped after a noise source switch.
    pub fn in_switch_grace(&self) -> bool {
        self.grace_remaining > 0
    }

    /// Current run length of stuck deltas.
    pub fn rct_count(&self) -> u32 {
        self.rct.count()
    }

    /// RCT intermittent cutoff, `30 × osr`.
    pub fn rct_cutoff_intermittent(&self) -> u32 {
        self.rct.cutoff_intermittent()
    }

    /// RCT permanent cutoff, `60 × osr`.
    pub fn rct_cutoff_permanent(&self) -> u32 {
        self.rct.cutoff_permanent()
    }

    /// Repeats of the APT reference delta in the current window.
    pub fn apt_count(&self) -> u32 {
        self.apt.count()
    }

    /// Deltas observed in the current APT window.
    pub fn apt_observations(&self) -> u32 {
        self.apt.observations()
    }

    /// Reference delta of the current APT window, if one is open.
    pub fn apt_base(&self) -> Option<RawDelta> {
        self.apt.base()
    }

    /// APT intermittent cutoff.
    pub fn apt_cutoff(&self) -> u32 {
        self.apt.cutoff()
    }

    /// APT permanent cutoff.
    pub fn apt_cutoff_permanent(&self) -> u32 {
        self.apt.cutoff_permanent()
    }

    /// Total deltas fed since creation.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Total deltas classified as stuck since creation.
    pub fn stuck_samples(&self) -> u64 {
        self.stuck_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STUCK_DELTA: u64 = 5;

    fn config(osr: u32) -> HealthConfig {
        HealthConfig {
            osr,
            apt_window_size: 512,
            startup_samples: 200,
            switch_grace_samples: 40,
        }
    }

    fn state(osr: u32, init: InitType) -> HealthState {
        HealthState::new(config(osr), init).unwrap()
    }

    /// Two priming samples followed by `stuck` repeats of the same delta.
    fn feed_stuck(state: &mut HealthState, stuck: u32) {
        state.stuck(STUCK_DELTA);
        state.stuck(STUCK_DELTA);
        for _ in 0..stuck {
            assert!(state.stuck(STUCK_DELTA));
        }
    }

    /// Cubic sequence: values, first and second differences never repeat.
    fn feed_healthy(state: &mut HealthState, from: u64, count: u64) {
        for i in from..from + count {
            state.stuck(i * i * i + 1000);
        }
    }

    #[test]
    fn test_rct_below_intermittent_clean() {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 29);
        assert_eq!(state.rct_count(), 29);
        assert_eq!(state.health_failure(), HealthFailure::NONE);
        assert_eq!(state.status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_rct_intermittent_not_permanent() {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 30);
        let flags = state.health_failure();
        assert!(flags.contains(HealthFailure::RCT_INTERMITTENT));
        assert!(!flags.contains(HealthFailure::RCT_PERMANENT));
        assert_eq!(state.status(), HealthStatus::SoftFailure);
        assert!(!state.is_fatal());
    }

    #[test]
    fn test_rct_permanent() {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 60);
        assert!(state.health_failure().contains(HealthFailure::RCT_PERMANENT));
        assert!(state.is_fatal());
    }

    #[test]
    fn test_non_stuck_resets_count_but_keeps_flags() {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 29);
        assert!(!state.stuck(17));
        assert_eq!(state.rct_count(), 0);

        let mut state = state_with_intermittent();
        assert!(!state.stuck(17));
        assert_eq!(state.rct_count(), 0);
        assert!(state.health_failure().contains(HealthFailure::RCT_INTERMITTENT));
    }

    fn state_with_intermittent() -> HealthState {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 30);
        state
    }

    #[test]
    fn test_health_failure_idempotent() {
        let state = state_with_intermittent();
        let first = state.health_failure();
        for _ in 0..5 {
            assert_eq!(state.health_failure(), first);
        }
    }

    #[test]
    fn test_sample_status_reports_stuck_transiently() {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 1);
        assert!(state.sample_status().contains(HealthFailure::STUCK));
        assert!(!state.health_failure().contains(HealthFailure::STUCK));

        assert!(!state.stuck(17));
        assert!(!state.sample_status().contains(HealthFailure::STUCK));
        assert_eq!(state.stuck_samples(), 1);
    }

    #[test]
    fn test_apt_constant_window_fails() {
        // osr 3 keeps the RCT cutoff (90) above the window size.
        let mut state = HealthState::new(
            HealthConfig {
                apt_window_size: 64,
                ..config(3)
            },
            InitType::Common,
        )
        .unwrap();
        for _ in 0..63 {
            state.stuck(STUCK_DELTA);
        }
        assert_eq!(state.health_failure(), HealthFailure::NONE);
        state.stuck(STUCK_DELTA);
        assert!(state.health_failure().contains(HealthFailure::APT_FAILURE));
        assert!(state.is_fatal());
    }

    #[test]
    fn test_apt_distinct_window_passes() {
        let mut state = HealthState::new(
            HealthConfig {
                apt_window_size: 64,
                ..config(1)
            },
            InitType::Common,
        )
        .unwrap();
        feed_healthy(&mut state, 1, 1000);
        assert_eq!(state.health_failure(), HealthFailure::NONE);
        assert_eq!(state.stuck_samples(), 0);
    }

    #[test]
    fn test_apt_rollover_starts_fresh_reference() {
        let mut state = HealthState::new(
            HealthConfig {
                apt_window_size: 64,
                ..config(1)
            },
            InitType::Common,
        )
        .unwrap();
        feed_healthy(&mut state, 1, 64);
        assert_eq!(state.apt_base(), None);
        state.stuck(424_242);
        assert_eq!(state.apt_base(), Some(424_242));
        assert_eq!(state.apt_observations(), 1);
    }

    #[test]
    fn test_apt_reinit_through_state() {
        let mut state = state(1, InitType::Common);
        state.apt_reinit(77, 3, 10);
        assert_eq!(state.apt_base(), Some(77));
        assert_eq!(state.apt_count(), 3);
        assert_eq!(state.apt_observations(), 10);
    }

    #[test]
    fn test_startup_failure_survives_runtime_reinit() {
        let mut state = state(1, InitType::Ntg1Startup);
        feed_stuck(&mut state, 60);
        assert!(state.startup_blocked());

        state.health_init(InitType::Ntg1Runtime);
        assert!(state.is_fatal());
        assert!(state.health_failure().contains(HealthFailure::RCT_PERMANENT));

        state.health_init(InitType::Common);
        assert!(state.is_fatal());
    }

    #[test]
    fn test_soft_failure_during_startup_blocks() {
        let mut state = state(1, InitType::Ntg1Startup);
        feed_stuck(&mut state, 30);
        assert!(state.startup_blocked());
        assert_eq!(state.status(), HealthStatus::FatalLatched);
    }

    #[test]
    fn test_startup_completion_switches_to_runtime() {
        let mut state = state(1, InitType::Ntg1Startup);
        assert!(state.in_startup());
        feed_healthy(&mut state, 1, 199);
        assert_eq!(state.init_type(), InitType::Ntg1Startup);
        feed_healthy(&mut state, 200, 1);
        assert!(!state.in_startup());
        assert_eq!(state.init_type(), InitType::Ntg1Runtime);
        assert_eq!(state.status(), HealthStatus::Healthy);

        // Failures after startup are no longer promoted to a block.
        feed_stuck(&mut state, 30);
        assert!(!state.startup_blocked());
        assert_eq!(state.status(), HealthStatus::SoftFailure);
    }

    #[test]
    fn test_runtime_reinit_keeps_fatal_drops_soft() {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 60);
        state.health_init(InitType::Ntg1Runtime);
        let flags = state.health_failure();
        assert!(flags.contains(HealthFailure::RCT_PERMANENT));
        assert!(!flags.contains(HealthFailure::RCT_INTERMITTENT));
        assert_eq!(state.rct_count(), 0);
    }

    #[test]
    fn test_transition_table() {
        use HealthStatus::*;
        use InitType::*;

        fn build(status: HealthStatus) -> HealthState {
            let mut state = state(1, Common);
            match status {
                Healthy => {}
                SoftFailure => feed_stuck(&mut state, 30),
                FatalLatched => feed_stuck(&mut state, 60),
            }
            assert_eq!(state.status(), status);
            state
        }

        let table = [
            (Healthy, Common, Healthy),
            (Healthy, Ntg1Startup, Healthy),
            (Healthy, Ntg1Runtime, Healthy),
            (SoftFailure, Common, Healthy),
            (SoftFailure, Ntg1Startup, Healthy),
            (SoftFailure, Ntg1Runtime, Healthy),
            (FatalLatched, Common, Healthy),
            (FatalLatched, Ntg1Startup, Healthy),
            (FatalLatched, Ntg1Runtime, FatalLatched),
        ];
        for (from, init, expected) in table {
            let mut state = build(from);
            state.health_init(init);
            assert_eq!(state.status(), expected, "{from:?} + {init:?}");
        }

        for init in [Common, Ntg1Startup, Ntg1Runtime] {
            let mut state = state(1, Ntg1Startup);
            feed_stuck(&mut state, 60);
            state.health_init(init);
            assert_eq!(state.status(), FatalLatched, "startup-blocked + {init:?}");
        }

        // A runtime reinit does not skip a startup test that is still running.
        let mut state = state(1, Ntg1Startup);
        feed_healthy(&mut state, 1, 9);
        state.health_init(Ntg1Runtime);
        assert!(state.in_startup());
        assert_eq!(state.init_type(), Ntg1Startup);
        feed_stuck(&mut state, 40);
        assert!(state.startup_blocked());
        assert_eq!(state.status(), FatalLatched, "in-startup + Ntg1Runtime");
    }

    #[test]
    fn test_runtime_reinit_during_startup_keeps_window_length() {
        let mut state = state(1, InitType::Ntg1Startup);
        feed_healthy(&mut state, 1, 9);
        state.health_init(InitType::Ntg1Runtime);

        feed_healthy(&mut state, 10, 190);
        assert!(state.in_startup());
        feed_healthy(&mut state, 200, 1);
        assert!(!state.in_startup());
        assert_eq!(state.init_type(), InitType::Ntg1Runtime);
        assert_eq!(state.status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_runtime_reinit_keeps_apt_failure() {
        let mut state = state(1, InitType::Common);
        // One match short of the intermittent cutoff (325), far from 355.
        state.apt_reinit(777, 324, 400);
        state.stuck(777);
        assert_eq!(state.health_failure(), HealthFailure::APT_FAILURE);

        state.health_init(InitType::Ntg1Runtime);
        assert_eq!(state.health_failure(), HealthFailure::APT_FAILURE);
        assert_eq!(state.status(), HealthStatus::FatalLatched);
    }

    #[test]
    fn test_health_init_keeps_cutoffs_and_resets_windows() {
        let mut state = state(2, InitType::Common);
        state.apt_reinit(9, 5, 20);
        feed_stuck(&mut state, 3);

        state.health_init(InitType::Ntg1Runtime);
        assert_eq!(state.apt_cutoff(), 422);
        assert_eq!(state.apt_cutoff_permanent(), 447);
        assert_eq!(state.rct_cutoff_intermittent(), 60);
        assert_eq!(state.rct_cutoff_permanent(), 120);
        assert_eq!(state.apt_base(), None);
        assert_eq!(state.apt_observations(), 0);
        assert_eq!(state.rct_count(), 0);
    }

    #[test]
    fn test_take_new_failures_once_per_transition() {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 30);
        assert_eq!(state.take_new_failures(), Some(HealthFailure::RCT_INTERMITTENT));
        assert_eq!(state.take_new_failures(), None);

        for _ in 0..30 {
            state.stuck(STUCK_DELTA);
        }
        assert_eq!(state.take_new_failures(), Some(HealthFailure::RCT_PERMANENT));
        assert_eq!(state.take_new_failures(), None);

        // Retained flags were already reported.
        state.health_init(InitType::Ntg1Runtime);
        assert_eq!(state.take_new_failures(), None);
    }

    #[test]
    fn test_switch_grace_suppresses_detection() {
        let mut state = state(1, InitType::Common);
        feed_stuck(&mut state, 20);
        assert!(state.begin_switch_grace());
        assert_eq!(state.rct_count(), 0);

        for _ in 0..40 {
            state.stuck(STUCK_DELTA);
        }
        assert!(!state.in_switch_grace());
        assert_eq!(state.rct_count(), 0);
        assert_eq!(state.health_failure(), HealthFailure::NONE);

        for _ in 0..30 {
            state.stuck(STUCK_DELTA);
        }
        assert!(state.health_failure().contains(HealthFailure::RCT_INTERMITTENT));
    }

    #[test]
    fn test_switch_grace_ignored_during_startup() {
        let mut state = state(1, InitType::Ntg1Startup);
        assert!(!state.begin_switch_grace());
        assert!(!state.in_switch_grace());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = HealthState::new(HealthConfig::with_osr(0), InitType::Common);
        assert!(matches!(result, Err(ConfigError::InvalidOsr(0))));
    }
}
