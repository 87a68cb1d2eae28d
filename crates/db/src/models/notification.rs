//! Row model for the `notification_object` table.

use guildhall_core::entity::EntityReference;
use guildhall_core::error::CoreError;
use guildhall_core::notification::NotificationObject;
use guildhall_core::status::{NotificationStatus, StatusId};
use guildhall_core::types::{DbId, EntityId, Timestamp};
use sqlx::FromRow;

/// Column list for `notification_object` queries.
pub const COLUMNS: &str = "\
    id, entity_type, entity_id, created_on, status, title, message, \
    version, created_at, updated_at";

/// A row from the `notification_object` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: DbId,
    pub entity_type: i16,
    pub entity_id: EntityId,
    pub created_on: Timestamp,
    pub status: StatusId,
    pub title: Option<String>,
    pub message: Option<String>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<NotificationRow> for NotificationObject {
    type Error = CoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(NotificationObject {
            id: row.id,
            entity_ref: EntityReference::from_stored(row.entity_type, row.entity_id),
            status: NotificationStatus::try_from(row.status)?,
            title: row.title,
            message: row.message,
            created_on: row.created_on,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt status value.
pub fn into_objects(rows: Vec<NotificationRow>) -> Result<Vec<NotificationObject>, CoreError> {
    rows.into_iter().map(NotificationObject::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: StatusId) -> NotificationRow {
        let now = chrono::Utc::now();
        NotificationRow {
            id: 9,
            entity_type: 1,
            entity_id: uuid::Uuid::new_v4(),
            created_on: now,
            status,
            title: Some("Welcome".into()),
            message: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_to_domain_object() {
        let r = row(1);
        let entity_id = r.entity_id;
        let obj = NotificationObject::try_from(r).unwrap();
        assert_eq!(obj.status, NotificationStatus::Active);
        assert_eq!(obj.entity_ref.entity_id(), entity_id);
        assert_eq!(obj.title.as_deref(), Some("Welcome"));
    }

    #[test]
    fn corrupt_status_is_rejected() {
        assert!(NotificationObject::try_from(row(7)).is_err());
    }
}
