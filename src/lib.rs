//! vrkit - plug-in registry, dependency resolution and mode components for VR applications

use std::sync::{Mutex, MutexGuard};

pub mod config;
pub mod error;
pub mod mode;
pub mod plugins;
pub mod signal;
pub mod strategy;
pub mod viewer;

pub use config::AppConfig;
pub use error::{Result, VrkitError};
pub use viewer::Viewer;

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
