//! Shared utility functions.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::timeout;

use crate::{Error, Result};

/// Lock a std mutex, recovering the data if a previous holder panicked.
///
/// Guards returned here must never be held across an `.await`.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Await `fut`, bounded by `duration` when one is given.
pub async fn with_optional_timeout<F, T>(duration: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match duration {
        Some(duration) => timeout(duration, fut)
            .await
            .map_err(|_| Error::Timeout(duration))?,
        None => fut.await,
    }
}
