use crate::error::{CapsuleError, CapsuleResult};
use std::future::Future;
use std::time::Duration;
use timecapsule_blobstore::BlobStoreResult;

/// Awaits a blob store call, failing with `Storage` once `limit` elapses.
pub(crate) async fn bounded<T>(
    op: &str,
    limit: Duration,
    call: impl Future<Output = BlobStoreResult<T>>,
) -> CapsuleResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CapsuleError::Storage(format!(
            "blob store {op} timed out after {}s",
            limit.as_secs_f64()
        ))),
    }
}
