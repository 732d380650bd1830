//! Helpers shared by every service: bounded store calls and owner checks.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use gym_db::DbResult;

use crate::error::{EngineError, EngineResult};

/// Runs a store call under `limit`.
///
/// A call that does not finish in time surfaces as
/// [`EngineError::OutcomeUnknown`]: the write it carried may have landed.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> EngineResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(EngineError::from),
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(EngineError::OutcomeUnknown {
                operation: operation.to_string(),
            })
        }
    }
}

/// Fails with `Forbidden` unless `record_owner` is the caller.
pub(crate) fn ensure_owner(
    entity: &str,
    id: &str,
    record_owner: &str,
    owner_id: &str,
) -> EngineResult<()> {
    if record_owner == owner_id {
        Ok(())
    } else {
        Err(EngineError::forbidden(entity, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let value = bounded(Duration::from_secs(1), "noop", async { Ok::<_, gym_db::DbError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let err = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, gym_db::DbError>(())
        })
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::OutcomeUnknown);
    }

    #[test]
    fn test_ensure_owner() {
        assert!(ensure_owner("Product", "p1", "owner-a", "owner-a").is_ok());
        let err = ensure_owner("Product", "p1", "owner-a", "owner-b").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }
}
