//! Row model for the `entity_view_analytics` table.

use guildhall_core::analytics::EntityViewAnalytics;
use guildhall_core::entity::EntityReference;
use guildhall_core::error::CoreError;
use guildhall_core::types::{EntityId, Timestamp};
use sqlx::FromRow;
use uuid::Uuid;

/// Column list for `entity_view_analytics` queries.
pub const COLUMNS: &str = "\
    id, entity_type, entity_id, view_count, first_viewed_at, last_viewed_at, \
    created_at, updated_at";

/// A row from the `entity_view_analytics` table.
///
/// `id` is decoded as nullable so a missing server-side default is caught
/// here instead of leaking a null identifier to callers.
#[derive(Debug, Clone, FromRow)]
pub struct ViewAnalyticsRow {
    pub id: Option<Uuid>,
    pub entity_type: i16,
    pub entity_id: EntityId,
    pub view_count: i64,
    pub first_viewed_at: Timestamp,
    pub last_viewed_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ViewAnalyticsRow> for EntityViewAnalytics {
    type Error = CoreError;

    fn try_from(row: ViewAnalyticsRow) -> Result<Self, Self::Error> {
        let entity_ref = EntityReference::from_stored(row.entity_type, row.entity_id);
        let id = row.id.filter(|id| !id.is_nil()).ok_or_else(|| {
            tracing::error!(entity = %entity_ref, "Analytics row written without an id");
            CoreError::Internal(format!("analytics row for {entity_ref} has no id"))
        })?;
        Ok(EntityViewAnalytics {
            id,
            entity_ref,
            view_count: row.view_count,
            first_viewed_at: row.first_viewed_at,
            last_viewed_at: row.last_viewed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn row(id: Option<Uuid>) -> ViewAnalyticsRow {
        let now = chrono::Utc::now();
        ViewAnalyticsRow {
            id,
            entity_type: 2,
            entity_id: Uuid::new_v4(),
            view_count: 3,
            first_viewed_at: now,
            last_viewed_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn null_or_nil_id_is_rejected_after_write() {
        assert_matches!(
            EntityViewAnalytics::try_from(row(None)),
            Err(CoreError::Internal(_))
        );
        assert_matches!(
            EntityViewAnalytics::try_from(row(Some(Uuid::nil()))),
            Err(CoreError::Internal(_))
        );
    }

    #[test]
    fn generated_id_is_kept() {
        let id = Uuid::new_v4();
        let analytics = EntityViewAnalytics::try_from(row(Some(id))).unwrap();
        assert_eq!(analytics.id, id);
        assert_eq!(analytics.view_count, 3);
    }
}
