//! In-process notification event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`NotificationBus`] fans out [`NotificationEvent`]s to delivery channels
//! (WebSocket push, digest, webhooks) living in other services. It is
//! designed to be shared via `Arc<NotificationBus>`.

use chrono::{DateTime, Utc};
use guildhall_core::entity::EntityReference;
use guildhall_core::notification::NotificationObject;
use guildhall_core::types::DbId;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// NotificationEvent
// ---------------------------------------------------------------------------

/// What happened to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEventKind {
    Created,
    Acknowledged,
    Resurfaced,
}

/// A lifecycle change of one notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub kind: NotificationEventKind,
    pub notification_id: DbId,
    pub entity_ref: EntityReference,
    pub title: Option<String>,
    /// When the event was published (UTC).
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationEventKind, notification: &NotificationObject) -> Self {
        Self {
            kind,
            notification_id: notification.id,
            entity_ref: notification.entity_ref,
            title: notification.title.clone(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for notification lifecycle events.
///
/// # Usage
///
/// ```rust
/// use guildhall_events::bus::NotificationBus;
///
/// let bus = NotificationBus::default();
/// let mut rx = bus.subscribe();
/// assert_eq!(bus.subscriber_count(), 1);
/// ```
pub struct NotificationBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl NotificationBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    /// The notification row itself is already durable at this point.
    pub fn publish(&self, event: NotificationEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use guildhall_core::status::NotificationStatus;
    use guildhall_core::types::now_micros;
    use uuid::Uuid;

    use super::*;

    fn notification() -> NotificationObject {
        let now = now_micros();
        NotificationObject {
            id: 42,
            entity_ref: EntityReference::from_stored(1, Uuid::new_v4()),
            status: NotificationStatus::Active,
            title: Some("Welcome".into()),
            message: None,
            created_on: now,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();
        let n = notification();

        bus.publish(NotificationEvent::new(NotificationEventKind::Created, &n));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind, NotificationEventKind::Created);
        assert_eq!(received.notification_id, 42);
        assert_eq!(received.entity_ref, n.entity_ref);
        assert_eq!(received.title.as_deref(), Some("Welcome"));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = NotificationBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(NotificationEvent::new(
            NotificationEventKind::Acknowledged,
            &notification(),
        ));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.kind, NotificationEventKind::Acknowledged);
        assert_eq!(e2.kind, NotificationEventKind::Acknowledged);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = NotificationBus::default();
        bus.publish(NotificationEvent::new(
            NotificationEventKind::Resurfaced,
            &notification(),
        ));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn event_serializes_kind_as_snake_case() {
        let event = NotificationEvent::new(NotificationEventKind::Created, &notification());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "created");
        assert_eq!(json["notification_id"], 42);
    }
}
