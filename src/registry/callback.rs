//! Failure callback slot and noise source switch gate.

use crate::health::{HealthFailure, HealthStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors returned by the failure registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A callback is already registered; the new one was dropped.
    #[error("a failure callback is already registered")]
    AlreadyRegistered,
    /// The process-wide registry has not been created with `init()`.
    #[error("failure registry not initialized")]
    NotInitialized,
}

/// Description of a newly latched health failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEvent {
    /// Name of the entropy source instance.
    pub source: String,
    /// Flags latched since the last notification.
    pub new_flags: HealthFailure,
    /// All flags latched at the time of the event.
    pub latched: HealthFailure,
    /// Health classification at the time of the event.
    pub status: HealthStatus,
    /// Index of the sample that triggered the event.
    pub sample: u64,
    /// Wall-clock time the failure was observed.
    pub observed_at: DateTime<Utc>,
}

/// Callback invoked for every [`FailureEvent`].
pub type FailureCallback = Arc<dyn Fn(&FailureEvent) + Send + Sync>;

/// Holds the single failure callback and the switch epoch.
///
/// Only the first registration succeeds until the callback is cleared.
#[derive(Default)]
pub struct FailureRegistry {
    callback: RwLock<Option<FailureCallback>>,
    switch_epoch: AtomicU64,
}

impl FailureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`, failing without side effect if one exists.
    pub fn set_failure_callback<F>(&self, callback: F) -> Result<(), RegistryError>
    where
        F: Fn(&FailureEvent) + Send + Sync + 'static,
    {
        let mut slot = self.callback.write().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            tracing::warn!("Rejected second failure callback registration");
            return Err(RegistryError::AlreadyRegistered);
        }
        let callback: FailureCallback = Arc::new(callback);
        *slot = Some(callback);
        tracing::debug!("Failure callback registered");
        Ok(())
    }

    /// Unregisters the callback. Returns whether one was registered.
    pub fn clear_failure_callback(&self) -> bool {
        let mut slot = self.callback.write().unwrap_or_else(|e| e.into_inner());
        slot.take().is_some()
    }

    /// True when a callback is registered.
    pub fn is_registered(&self) -> bool {
        self.callback
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Invokes the callback with `event`. Returns whether it was invoked.
    ///
    /// The lock is released before the call, so the callback may use the
    /// registry itself.
    pub fn notify(&self, event: &FailureEvent) -> bool {
        let callback = self
            .callback
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }

    /// Announces a deliberate noise source switch.
    ///
    /// Sources observing the new epoch open a grace window in which RCT and
    /// APT are not evaluated. Returns the new epoch.
    pub fn block_switch(&self) -> u64 {
        let epoch = self.switch_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(epoch, "Noise source switch announced");
        epoch
    }

    /// Number of switches announced so far.
    pub fn switch_epoch(&self) -> u64 {
        self.switch_epoch.load(Ordering::Acquire)
    }
}

impl fmt::Debug for FailureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureRegistry")
            .field("registered", &self.is_registered())
            .field("switch_epoch", &self.switch_epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(flags: HealthFailure) -> FailureEvent {
        FailureEvent {
            source: "test".into(),
            new_flags: flags,
            latched: flags,
            status: HealthStatus::FatalLatched,
            sample: 1,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = FailureRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        assert!(registry
            .set_failure_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .is_ok());

        let counter = second.clone();
        let result = registry.set_failure_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(result, Err(RegistryError::AlreadyRegistered));

        assert!(registry.notify(&event(HealthFailure::RCT_PERMANENT)));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_allows_new_registration() {
        let registry = FailureRegistry::new();
        registry.set_failure_callback(|_| {}).unwrap();
        assert!(registry.clear_failure_callback());
        assert!(!registry.clear_failure_callback());
        assert!(registry.set_failure_callback(|_| {}).is_ok());
    }

    #[test]
    fn test_notify_without_callback() {
        let registry = FailureRegistry::new();
        assert!(!registry.notify(&event(HealthFailure::APT_FAILURE)));
    }

    #[test]
    fn test_callback_may_reenter_registry() {
        let registry = Arc::new(FailureRegistry::new());
        let inner = registry.clone();
        registry
            .set_failure_callback(move |_| {
                assert!(inner.is_registered());
            })
            .unwrap();
        assert!(registry.notify(&event(HealthFailure::APT_FAILURE)));
    }

    #[test]
    fn test_block_switch_advances_epoch() {
        let registry = FailureRegistry::new();
        assert_eq!(registry.switch_epoch(), 0);
        assert_eq!(registry.block_switch(), 1);
        assert_eq!(registry.block_switch(), 2);
        assert_eq!(registry.switch_epoch(), 2);
    }

    #[test]
    fn test_concurrent_registration_single_winner() {
        let registry = Arc::new(FailureRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.set_failure_callback(|_| {}).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}
