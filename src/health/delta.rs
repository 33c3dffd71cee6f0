//! Wrap-safe distance between two counter samples.

/// Elapsed time between two consecutive timer readings.
pub type RawDelta = u64;

/// Returns the distance from `prev` to `next`.
///
/// Computed with modular subtraction, so a monotonic counter that wrapped
/// between the two readings still yields the true cyclic distance.
#[inline]
pub fn delta(prev: u64, next: u64) -> RawDelta {
    next.wrapping_sub(prev)
}
