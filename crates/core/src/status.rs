//! Notification lifecycle status.
//!
//! A two-state machine stored as `SMALLINT`: `inactive = 0`, `active = 1`.
//! Both directions are legal; applying the current state again is a no-op.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Inactive = 0,
    #[default]
    Active = 1,
}

/// Effect of applying a target status to a current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Target equals current status. Nothing is written.
    Unchanged,
    /// Active to inactive (acknowledgment or expiry).
    Deactivated,
    /// Inactive to active (resurfacing).
    Reactivated,
}

impl Transition {
    pub fn is_change(self) -> bool {
        !matches!(self, Transition::Unchanged)
    }
}

impl NotificationStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn is_active(self) -> bool {
        matches!(self, NotificationStatus::Active)
    }

    /// Classify the move from `self` to `target`.
    pub fn transition_to(self, target: NotificationStatus) -> Transition {
        match (self, target) {
            (NotificationStatus::Active, NotificationStatus::Inactive) => Transition::Deactivated,
            (NotificationStatus::Inactive, NotificationStatus::Active) => Transition::Reactivated,
            _ => Transition::Unchanged,
        }
    }
}

impl From<NotificationStatus> for StatusId {
    fn from(value: NotificationStatus) -> Self {
        value as StatusId
    }
}

impl TryFrom<StatusId> for NotificationStatus {
    type Error = CoreError;

    fn try_from(value: StatusId) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NotificationStatus::Inactive),
            1 => Ok(NotificationStatus::Active),
            other => Err(CoreError::Internal(format!(
                "unknown notification status id {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ids_match_column_values() {
        assert_eq!(NotificationStatus::Inactive.id(), 0);
        assert_eq!(NotificationStatus::Active.id(), 1);
        assert_eq!(NotificationStatus::default(), NotificationStatus::Active);
    }

    #[test]
    fn status_id_round_trip_and_rejects_unknown() {
        assert_eq!(
            NotificationStatus::try_from(0).unwrap(),
            NotificationStatus::Inactive
        );
        assert_eq!(
            NotificationStatus::try_from(1).unwrap(),
            NotificationStatus::Active
        );
        assert!(NotificationStatus::try_from(2).is_err());
    }

    #[test]
    fn transitions() {
        use NotificationStatus::*;
        assert_eq!(Active.transition_to(Inactive), Transition::Deactivated);
        assert_eq!(Inactive.transition_to(Active), Transition::Reactivated);
        assert_eq!(Active.transition_to(Active), Transition::Unchanged);
        assert_eq!(Inactive.transition_to(Inactive), Transition::Unchanged);
        assert!(!Transition::Unchanged.is_change());
    }
}
