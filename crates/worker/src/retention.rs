//! Periodic compaction of acknowledged notifications and old view receipts.
//!
//! Inactive notifications whose last change is older than the retention
//! period are hard-deleted on a fixed interval. Active notifications are
//! never touched, however old. View receipts past the same period are
//! forgotten; the view counts they contributed stay.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use guildhall_core::error::{CoreError, CoreResult};
use guildhall_core::store::{NotificationStore, ViewAnalyticsStore};
use guildhall_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

/// Rows removed by one compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub notifications: u64,
    pub receipts: u64,
}

/// Purge everything older than `now - retention`.
pub async fn compact_once(
    notifications: &dyn NotificationStore,
    analytics: &dyn ViewAnalyticsStore,
    retention: chrono::Duration,
    now: Timestamp,
) -> CoreResult<CompactionReport> {
    let cutoff = now.checked_sub_signed(retention).ok_or_else(|| {
        CoreError::Validation(format!("retention of {retention} reaches before the epoch range"))
    })?;
    Ok(CompactionReport {
        notifications: notifications.purge_inactive_before(cutoff).await?,
        receipts: analytics.purge_view_receipts_before(cutoff).await?,
    })
}

/// Run the compaction loop until `cancel` is triggered.
///
/// The first pass runs immediately. A failed pass is logged and retried on
/// the next tick.
pub async fn run(
    notifications: Arc<dyn NotificationStore>,
    analytics: Arc<dyn ViewAnalyticsStore>,
    retention: chrono::Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_days = retention.num_days(),
        interval_secs = every.as_secs(),
        "Compaction job started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Compaction job stopping");
                break;
            }
            _ = interval.tick() => {
                match compact_once(notifications.as_ref(), analytics.as_ref(), retention, Utc::now()).await {
                    Ok(report) if report != CompactionReport::default() => {
                        tracing::info!(
                            notifications = report.notifications,
                            receipts = report.receipts,
                            "Compaction: purged expired rows"
                        );
                    }
                    Ok(_) => {
                        tracing::debug!("Compaction: nothing to purge");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Compaction: purge failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use guildhall_core::entity::{EntityKind, EntityReference};
    use guildhall_core::notification::NewNotification;
    use guildhall_core::registry::EntityKindRegistry;
    use guildhall_core::status::NotificationStatus;
    use guildhall_db::stores::{MemoryNotificationStore, MemoryViewAnalyticsStore};

    use super::*;

    fn stores() -> (Arc<MemoryNotificationStore>, Arc<MemoryViewAnalyticsStore>) {
        let notifications = Arc::new(MemoryNotificationStore::new(Arc::new(
            EntityKindRegistry::with_builtin_kinds(),
        )));
        (notifications, Arc::new(MemoryViewAnalyticsStore::new()))
    }

    fn org() -> EntityReference {
        EntityKindRegistry::with_builtin_kinds()
            .resolve(EntityKind::ORGANIZATION.tag(), "7f1c2d3e-4b5a-4c6d-8e9f-0a1b2c3d4e5f")
            .unwrap()
    }

    async fn seed(store: &MemoryNotificationStore) -> (i64, i64) {
        let acked = store.create(NewNotification::new(org())).await.unwrap();
        let active = store.create(NewNotification::new(org())).await.unwrap();
        store
            .set_status(acked.id, NotificationStatus::Inactive)
            .await
            .unwrap();
        (acked.id, active.id)
    }

    #[tokio::test]
    async fn compact_once_respects_retention() {
        let (store, analytics) = stores();
        let (acked, active) = seed(&store).await;
        analytics.record_view_once(&org(), "req-1").await.unwrap();
        let retention = chrono::Duration::days(90);

        let report = compact_once(store.as_ref(), analytics.as_ref(), retention, Utc::now())
            .await
            .unwrap();
        assert_eq!(report, CompactionReport::default());

        let later = Utc::now() + chrono::Duration::days(91);
        let report = compact_once(store.as_ref(), analytics.as_ref(), retention, later)
            .await
            .unwrap();
        assert_eq!(
            report,
            CompactionReport {
                notifications: 1,
                receipts: 1,
            }
        );
        assert_matches!(store.get_by_id(acked).await, Err(CoreError::NotFound { .. }));
        assert!(store.get_by_id(active).await.is_ok());
        assert_eq!(analytics.get_count(&org()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn out_of_range_retention_is_rejected_without_purging() {
        let (store, analytics) = stores();
        let (acked, _) = seed(&store).await;

        assert_matches!(
            compact_once(
                store.as_ref(),
                analytics.as_ref(),
                chrono::Duration::MAX,
                Utc::now()
            )
            .await,
            Err(CoreError::Validation(_))
        );
        assert!(store.get_by_id(acked).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn run_purges_on_first_tick_and_stops_on_cancel() {
        let (store, analytics) = stores();
        let (acked, active) = seed(&store).await;
        analytics.record_view_once(&org(), "req-1").await.unwrap();
        // Negative retention puts the cutoff in the future.
        let retention = chrono::Duration::minutes(-1);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(
            store.clone(),
            analytics.clone(),
            retention,
            Duration::from_secs(3600),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_matches!(store.get_by_id(acked).await, Err(CoreError::NotFound { .. }));
        assert!(store.get_by_id(active).await.is_ok());
        assert!(analytics.record_view_once(&org(), "req-1").await.unwrap().counted);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("compaction loop should stop")
            .unwrap();
    }
}
