//! Locking for the process-local maps.
//!
//! Every critical section on these maps is a single insert/get/remove, so a
//! panic inside one cannot leave a half-applied update behind. A poisoned map
//! is taken over as is and the poison flag cleared.

use std::sync::{Mutex, MutexGuard};
use tracing::warn;

pub(crate) trait LockExt<T> {
    fn locked(&self) -> MutexGuard<'_, T>;
}

impl<T> LockExt<T> for Mutex<T> {
    fn locked(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            warn!("Token map lock was poisoned by a panicking task, reusing its contents");
            self.clear_poison();
            poisoned.into_inner()
        })
    }
}
