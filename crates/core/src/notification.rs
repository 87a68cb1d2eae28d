//! Notification domain types.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::entity::EntityReference;
use crate::error::{CoreError, CoreResult};
use crate::status::{NotificationStatus, Transition};
use crate::types::{to_micros, DbId, Timestamp};

/// Maximum title length in characters (`VARCHAR(255)`).
pub const TITLE_MAX_CHARS: usize = 255;

/// A notification attached to some entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationObject {
    pub id: DbId,
    pub entity_ref: EntityReference,
    pub status: NotificationStatus,
    pub title: Option<String>,
    pub message: Option<String>,
    /// Event time supplied by the emitter. Independent of the audit columns.
    pub created_on: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Optimistic concurrency counter, bumped on every effective mutation.
    pub version: i64,
}

/// Insert DTO. Status always starts active.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewNotification {
    pub entity_ref: EntityReference,
    #[validate(length(max = 255))]
    pub title: Option<String>,
    pub message: Option<String>,
    /// Defaults to the time of insertion.
    pub created_on: Option<Timestamp>,
}

impl NewNotification {
    pub fn new(entity_ref: EntityReference) -> Self {
        Self {
            entity_ref,
            title: None,
            message: None,
            created_on: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_created_on(mut self, created_on: Timestamp) -> Self {
        self.created_on = Some(to_micros(created_on));
        self
    }

    /// Event time to persist, at the microsecond precision pagination
    /// cursors carry. Falls back to `now` when none was supplied.
    pub fn event_time(&self, now: Timestamp) -> Timestamp {
        self.created_on.map_or(now, to_micros)
    }

    pub fn check(&self) -> CoreResult<()> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }
}

/// Partial update of a notification's payload.
///
/// The outer `Option` says whether the field is touched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationPatch {
    pub title: Option<Option<String>>,
    pub message: Option<Option<String>>,
}

impl NotificationPatch {
    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(Some(title.into()));
        self
    }

    pub fn clear_title(mut self) -> Self {
        self.title = Some(None);
        self
    }

    pub fn set_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(Some(message.into()));
        self
    }

    pub fn clear_message(mut self) -> Self {
        self.message = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.message.is_none()
    }

    pub fn check(&self) -> CoreResult<()> {
        if let Some(Some(title)) = &self.title {
            check_title(title)?;
        }
        Ok(())
    }

    /// The `(title, message)` pair after applying this patch to `current`.
    pub fn apply_to(&self, current: &NotificationObject) -> (Option<String>, Option<String>) {
        let title = match &self.title {
            Some(t) => t.clone(),
            None => current.title.clone(),
        };
        let message = match &self.message {
            Some(m) => m.clone(),
            None => current.message.clone(),
        };
        (title, message)
    }

    /// Whether applying the patch to `current` would change anything.
    pub fn changes(&self, current: &NotificationObject) -> bool {
        let (title, message) = self.apply_to(current);
        title != current.title || message != current.message
    }
}

/// Result of a status write: the row after the write and what happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub notification: NotificationObject,
    pub transition: Transition,
}

pub fn check_title(title: &str) -> CoreResult<()> {
    let len = title.chars().count();
    if len > TITLE_MAX_CHARS {
        return Err(CoreError::Validation(format!(
            "title must be at most {TITLE_MAX_CHARS} characters, got {len}"
        )));
    }
    Ok(())
}

/// Next `updated_at` for a mutation: now, but strictly after `previous`.
pub fn next_updated_at(previous: Timestamp, now: Timestamp) -> Timestamp {
    let floor = previous + chrono::Duration::microseconds(1);
    now.max(floor)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use uuid::Uuid;

    use super::*;
    use crate::entity::EntityKind;
    use crate::types::now_micros;

    fn sample() -> NotificationObject {
        let now = now_micros();
        NotificationObject {
            id: 1,
            entity_ref: EntityReference::from_stored(EntityKind::ORGANIZATION.tag(), Uuid::new_v4()),
            status: NotificationStatus::Active,
            title: Some("Welcome".into()),
            message: Some("Hello".into()),
            created_on: now,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn new_notification_rejects_long_title() {
        let r = EntityReference::from_stored(1, Uuid::new_v4());
        assert!(NewNotification::new(r)
            .with_title("x".repeat(TITLE_MAX_CHARS))
            .check()
            .is_ok());
        assert_matches!(
            NewNotification::new(r)
                .with_title("x".repeat(TITLE_MAX_CHARS + 1))
                .check(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn title_length_counts_characters_not_bytes() {
        assert!(check_title(&"é".repeat(TITLE_MAX_CHARS)).is_ok());
    }

    #[test]
    fn patch_leaves_unspecified_fields() {
        let current = sample();
        let (title, message) = NotificationPatch::default()
            .set_title("Renamed")
            .apply_to(&current);
        assert_eq!(title.as_deref(), Some("Renamed"));
        assert_eq!(message.as_deref(), Some("Hello"));
    }

    #[test]
    fn patch_can_clear_a_field() {
        let current = sample();
        let patch = NotificationPatch::default().clear_message();
        assert!(patch.changes(&current));
        assert_eq!(patch.apply_to(&current).1, None);
    }

    #[test]
    fn patch_with_same_values_changes_nothing() {
        let current = sample();
        let patch = NotificationPatch::default().set_title("Welcome");
        assert!(!patch.changes(&current));
        assert!(NotificationPatch::default().is_empty());
    }

    #[test]
    fn event_time_is_truncated_to_microseconds() {
        let r = EntityReference::from_stored(1, Uuid::new_v4());
        let base = now_micros();
        let precise = base + chrono::Duration::nanoseconds(800);

        let built = NewNotification::new(r).with_created_on(precise);
        assert_eq!(built.event_time(now_micros()), base);

        // Fields set directly still go through the same truncation.
        let mut raw = NewNotification::new(r);
        raw.created_on = Some(precise);
        assert_eq!(raw.event_time(now_micros()), base);

        let fallback = now_micros();
        assert_eq!(NewNotification::new(r).event_time(fallback), fallback);
    }

    #[test]
    fn next_updated_at_is_strictly_increasing() {
        let t = now_micros();
        assert!(next_updated_at(t, t) > t);
        let later = t + chrono::Duration::seconds(5);
        assert_eq!(next_updated_at(t, later), later);
    }
}
