//! Polymorphic entity references.
//!
//! An [`EntityReference`] is the `(entity_type, entity_id)` pair that
//! notifications and view analytics attach to. There is no foreign key
//! behind it: the kind tag selects a collection in some other store and the
//! identifier is only checked for shape. Validation lives in
//! [`EntityKindRegistry`](crate::registry::EntityKindRegistry).

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::EntityId;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Small-integer tag naming an entity collection.
///
/// Persisted as `entity_type SMALLINT`. The tags below form version 1 of the
/// kind table; further kinds are added through the registry rather than
/// new constants here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(i16);

impl EntityKind {
    pub const ORGANIZATION: EntityKind = EntityKind(1);
    pub const EVENT: EntityKind = EntityKind(2);
    pub const USER: EntityKind = EntityKind(3);
    pub const ROLE: EntityKind = EntityKind(4);

    pub const fn new(tag: i16) -> Self {
        Self(tag)
    }

    /// The database value of this kind.
    pub const fn tag(self) -> i16 {
        self.0
    }
}

impl From<EntityKind> for i16 {
    fn from(value: EntityKind) -> Self {
        value.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityReference
// ---------------------------------------------------------------------------

/// Target of a notification or analytics record.
///
/// New references come out of the resolver. [`EntityReference::from_stored`]
/// exists for rows read back from storage, which were validated when they
/// were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityReference {
    entity_type: EntityKind,
    entity_id: EntityId,
}

impl EntityReference {
    pub(crate) fn new(entity_type: EntityKind, entity_id: EntityId) -> Self {
        Self {
            entity_type,
            entity_id,
        }
    }

    /// Rebuild a reference from persisted columns without re-validating it.
    pub fn from_stored(entity_type: i16, entity_id: EntityId) -> Self {
        Self::new(EntityKind::new(entity_type), entity_id)
    }

    pub fn entity_type(&self) -> EntityKind {
        self.entity_type
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

// ---------------------------------------------------------------------------
// Identifier shapes
// ---------------------------------------------------------------------------

/// Shape check applied to a parsed identifier for one entity kind.
///
/// Returns a human-readable reason on rejection.
pub trait IdentifierShape: Send + Sync + fmt::Debug {
    fn check(&self, id: &EntityId) -> Result<(), String>;
}

/// Built-in UUID shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UuidShape {
    /// Any non-nil UUID.
    Any,
    /// A UUID of one specific version (e.g. 4 for random, 7 for time-ordered).
    Version(usize),
}

impl IdentifierShape for UuidShape {
    fn check(&self, id: &EntityId) -> Result<(), String> {
        match self {
            UuidShape::Any => Ok(()),
            UuidShape::Version(expected) => {
                let actual = id.get_version_num();
                if actual == *expected {
                    Ok(())
                } else {
                    Err(format!("expected UUID v{expected}, got v{actual}"))
                }
            }
        }
    }
}

/// Parse the raw identifier text every kind shares.
///
/// Accepts hyphenated, simple, braced and URN forms. The nil UUID is never
/// a valid entity identifier.
pub fn parse_identifier(raw: &str) -> Result<EntityId, String> {
    if raw.is_empty() {
        return Err("identifier is empty".to_string());
    }
    let id = Uuid::parse_str(raw).map_err(|e| format!("not a UUID: {e}"))?;
    if id.is_nil() {
        return Err("nil UUID is not a valid identifier".to_string());
    }
    Ok(id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_kind_tags_are_stable() {
        assert_eq!(EntityKind::ORGANIZATION.tag(), 1);
        assert_eq!(EntityKind::EVENT.tag(), 2);
        assert_eq!(EntityKind::USER.tag(), 3);
        assert_eq!(EntityKind::ROLE.tag(), 4);
    }

    #[test]
    fn parse_identifier_accepts_hyphenated_and_simple() {
        let hyphenated = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let simple = "67e5504410b1426f9247bb680e5fe0c8";
        assert_eq!(
            parse_identifier(hyphenated).unwrap(),
            parse_identifier(simple).unwrap()
        );
    }

    #[test]
    fn parse_identifier_rejects_garbage_empty_and_nil() {
        assert!(parse_identifier("").is_err());
        assert!(parse_identifier("org-42").is_err());
        assert!(parse_identifier("00000000-0000-0000-0000-000000000000").is_err());
    }

    #[test]
    fn uuid_version_shape() {
        let v4 = Uuid::new_v4();
        let v7 = Uuid::now_v7();
        assert!(UuidShape::Version(4).check(&v4).is_ok());
        assert!(UuidShape::Version(4).check(&v7).is_err());
        assert!(UuidShape::Any.check(&v7).is_ok());
    }

    #[test]
    fn reference_display_is_kind_colon_id() {
        let id = Uuid::new_v4();
        let r = EntityReference::from_stored(2, id);
        assert_eq!(r.to_string(), format!("2:{id}"));
        assert_eq!(r.entity_type(), EntityKind::EVENT);
    }
}
