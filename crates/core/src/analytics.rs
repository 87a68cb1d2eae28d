//! Entity view analytics domain types.

use serde::Serialize;
use uuid::Uuid;

use crate::entity::EntityReference;
use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

/// Maximum length of an idempotency key for [`record_view_once`].
///
/// [`record_view_once`]: crate::store::ViewAnalyticsStore::record_view_once
pub const VIEW_KEY_MAX_CHARS: usize = 128;

/// Aggregated view counter for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityViewAnalytics {
    /// Generated by storage at insert time. Never caller-supplied.
    pub id: Uuid,
    pub entity_ref: EntityReference,
    pub view_count: i64,
    pub first_viewed_at: Timestamp,
    pub last_viewed_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Outcome of an idempotent view write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRecord {
    pub analytics: EntityViewAnalytics,
    /// `false` when the key had already been counted.
    pub counted: bool,
}

pub fn check_view_key(key: &str) -> CoreResult<()> {
    if key.trim().is_empty() {
        return Err(CoreError::Validation("view key must not be blank".into()));
    }
    let len = key.chars().count();
    if len > VIEW_KEY_MAX_CHARS {
        return Err(CoreError::Validation(format!(
            "view key must be at most {VIEW_KEY_MAX_CHARS} characters, got {len}"
        )));
    }
    Ok(())
}
