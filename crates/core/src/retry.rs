//! Bounded retry loop for compare-and-set writes.

use std::future::Future;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Attempts before a contended write surfaces `ConcurrentUpdateConflict`.
pub const DEFAULT_CAS_ATTEMPTS: u32 = 8;

/// Base delay between attempts; doubled each retry, capped at 32x.
const BASE_BACKOFF: Duration = Duration::from_millis(1);

/// Result of one compare-and-set attempt.
#[derive(Debug)]
pub enum CasOutcome<T> {
    /// The write committed (or was a no-op).
    Done(T),
    /// Someone else committed first; re-read and try again.
    Lost,
}

/// Run `attempt` until it returns [`CasOutcome::Done`] or the budget runs out.
///
/// Errors from `attempt` propagate immediately and are not retried.
pub async fn retry_cas<T, F, Fut>(
    entity: &'static str,
    id: impl ToString,
    max_attempts: u32,
    mut attempt: F,
) -> CoreResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = CoreResult<CasOutcome<T>>>,
{
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        match attempt(n).await? {
            CasOutcome::Done(value) => return Ok(value),
            CasOutcome::Lost if n < max_attempts => {
                tokio::time::sleep(BASE_BACKOFF * (1 << (n - 1).min(5))).await;
            }
            CasOutcome::Lost => {}
        }
    }
    Err(CoreError::ConcurrentUpdateConflict {
        entity,
        id: id.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn succeeds_after_lost_attempts() {
        let calls = AtomicU32::new(0);
        let value = retry_cas("notification", 1, 5, |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Ok(CasOutcome::Lost)
                } else {
                    Ok(CasOutcome::Done(n))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_conflict_after_budget() {
        let result: CoreResult<()> =
            retry_cas("notification", 7, 3, |_| async { Ok(CasOutcome::Lost) }).await;
        assert_matches!(
            result,
            Err(CoreError::ConcurrentUpdateConflict { attempts: 3, ref id, .. }) if id == "7"
        );
    }

    #[tokio::test]
    async fn errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = retry_cas("notification", 1, 5, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::StorageUnavailable("down".into())) }
        })
        .await;
        assert_matches!(result, Err(CoreError::StorageUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
