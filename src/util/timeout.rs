//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ConduitError;

/// Bound a fallible future, mapping elapsed time to [`ConduitError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ConduitError>>,
) -> Result<T, ConduitError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ConduitError::Timeout(duration.as_millis() as u64)),
    }
}
