//! Adaptive Proportion Test (SP800-90B section 4.4.2).
//!
//! Within a window of `window_size` deltas, counts how often the window's
//! first delta (the reference) occurs. The reference counts as its own first
//! occurrence, so a window of identical deltas reaches `window_size`.

use super::delta::RawDelta;
use super::flags::HealthFailure;

/// Window size used when none is configured.
pub const DEFAULT_WINDOW_SIZE: u32 = 512;

/// Intermittent false positive rate, 2^-30.
const ALPHA_INTERMITTENT: f64 = 9.313_225_746_154_785e-10;
/// Permanent false positive rate, 2^-60.
const ALPHA_PERMANENT: f64 = 8.673_617_379_884_035e-19;

/// Computes `min(W, 1 + CRITBINOM(W, 2^(-1/osr), 1 - alpha))`.
///
/// The binomial upper tail is summed exactly in log space from the top, so
/// tails far below `f64::EPSILON` are still resolved.
pub fn apt_cutoff(window_size: u32, osr: u32, alpha: f64) -> u32 {
    let w = window_size as usize;
    let p = (-1.0 / f64::from(osr.max(1))).exp2();
    let (ln_p, ln_q) = (p.ln(), (1.0 - p).ln());

    let mut ln_fact = Vec::with_capacity(w + 1);
    ln_fact.push(0.0_f64);
    for i in 1..=w {
        ln_fact.push(ln_fact[i - 1] + (i as f64).ln());
    }

    let ln_pmf = |j: usize| ln_fact[w] - ln_fact[j] - ln_fact[w - j] + j as f64 * ln_p + (w - j) as f64 * ln_q;

    // Smallest k with P(X > k) <= alpha.
    let mut tail = 0.0_f64;
    let mut k = w;
    while k > 0 {
        let next = tail + ln_pmf(k).exp();
        if next > alpha {
            break;
        }
        tail = next;
        k -= 1;
    }

    (k as u32).saturating_add(1).min(window_size)
}

/// Windowed repeat counter.
#[derive(Debug, Clone)]
pub struct AdaptiveProportionTest {
    base: RawDelta,
    base_set: bool,
    count: u32,
    observations: u32,
    window_size: u32,
    cutoff: u32,
    cutoff_permanent: u32,
}

impl AdaptiveProportionTest {
    /// Creates a test whose cutoffs are derived from `window_size` and `osr`.
    pub fn new(window_size: u32, osr: u32) -> Self {
        let window_size = window_size.max(2);
        Self {
            base: 0,
            base_set: false,
            count: 0,
            observations: 0,
            window_size,
            cutoff: apt_cutoff(window_size, osr, ALPHA_INTERMITTENT),
            cutoff_permanent: apt_cutoff(window_size, osr, ALPHA_PERMANENT),
        }
    }

    /// Feeds one delta and returns the flag it raises.
    pub fn insert(&mut self, current_delta: RawDelta) -> HealthFailure {
        if !self.base_set {
            self.reinit(current_delta, 1, 1);
            return HealthFailure::NONE;
        }

        let mut raised = HealthFailure::NONE;
        if current_delta == self.base {
            self.count += 1;
            if self.count >= self.cutoff_permanent {
                // Small windows can have both cutoffs at the window size.
                raised = HealthFailure::APT_FAILURE | HealthFailure::APT_PERMANENT;
            } else if self.count >= self.cutoff {
                raised = HealthFailure::APT_FAILURE;
            }
        }

        self.observations += 1;
        if self.observations >= self.window_size {
            // Window complete; the next delta becomes the reference.
            self.reset();
        }

        raised
    }

    /// Reseeds the window with `current_delta` as reference and the given
    /// counters, clamped so that `count <= observations <= window_size`.
    pub fn reinit(&mut self, current_delta: RawDelta, apt_count: u32, apt_observations: u32) {
        let observations = apt_observations.min(self.window_size);
        self.base = current_delta;
        self.base_set = true;
        self.count = apt_count.min(observations);
        self.observations = observations;
    }

    /// Drops the reference: the next delta opens a new window.
    pub fn reset(&mut self) {
        self.base_set = false;
        self.count = 0;
        self.observations = 0;
    }

    /// Reference delta of the open window, if any.
    pub fn base(&self) -> Option<RawDelta> {
        self.base_set.then_some(self.base)
    }

    /// Occurrences of the reference delta in this window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Deltas observed in this window.
    pub fn observations(&self) -> u32 {
        self.observations
    }

    /// Configured window size.
    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// Intermittent cutoff (alpha = 2^-30).
    pub fn cutoff(&self) -> u32 {
        self.cutoff
    }

    /// Permanent cutoff (alpha = 2^-60).
    pub fn cutoff_permanent(&self) -> u32 {
        self.cutoff_permanent
    }
}
