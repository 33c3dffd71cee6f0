//! Process-wide failure notification.
//!
//! [`FailureRegistry`] is an ordinary object that can be injected into
//! sources directly. A process-wide instance is available through
//! [`init`], [`global`] and [`teardown`]; [`set_failure_callback`] and
//! [`block_switch`] act on it.

mod callback;

pub use callback::{FailureCallback, FailureEvent, FailureRegistry, RegistryError};

use std::sync::{Arc, Mutex};

/// Process-wide registry, present between `init()` and `teardown()`.
static GLOBAL: Mutex<Option<Arc<FailureRegistry>>> = Mutex::new(None);

/// Creates the process-wide registry, or returns the existing one.
pub fn init() -> Arc<FailureRegistry> {
    let mut slot = GLOBAL.lock().unwrap_or_else(|e| e.into_inner());
    slot.get_or_insert_with(|| {
        tracing::info!("Failure registry initialized");
        Arc::new(FailureRegistry::new())
    })
    .clone()
}

/// Returns the process-wide registry if initialized.
pub fn global() -> Option<Arc<FailureRegistry>> {
    GLOBAL.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Removes the process-wide registry and its callback.
///
/// Sources still holding the returned `Arc` keep working against it.
pub fn teardown() -> Option<Arc<FailureRegistry>> {
    let registry = GLOBAL.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(registry) = &registry {
        registry.clear_failure_callback();
        tracing::info!("Failure registry torn down");
    }
    registry
}

/// Registers the process-wide failure callback.
pub fn set_failure_callback<F>(callback: F) -> Result<(), RegistryError>
where
    F: Fn(&FailureEvent) + Send + Sync + 'static,
{
    global()
        .ok_or(RegistryError::NotInitialized)?
        .set_failure_callback(callback)
}

/// Announces a noise source switch on the process-wide registry.
pub fn block_switch() -> Result<u64, RegistryError> {
    Ok(global().ok_or(RegistryError::NotInitialized)?.block_switch())
}
