//! Entity kind registry and reference resolver.
//!
//! The set of kinds a reference may point at is closed at any moment but
//! versioned: every registration or retirement bumps [`EntityKindRegistry::version`].
//! Kinds are never removed. A retired kind still resolves stored references
//! for reads but rejects new writes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::entity::{parse_identifier, EntityKind, EntityReference, IdentifierShape, UuidShape};
use crate::error::{CoreError, CoreResult};
use crate::types::EntityId;

/// Version of the built-in kind table (organization, event, user, role).
pub const BUILTIN_KIND_TABLE_VERSION: u32 = 1;

static KIND_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Existence probe
// ---------------------------------------------------------------------------

/// Existence check supplied by the store that owns an entity kind.
///
/// Only consulted in strict resolution and by the dispatcher's orphan
/// filter. Errors are treated as "unknown" by callers that fail open.
#[async_trait]
pub trait EntityProbe: Send + Sync {
    async fn exists(&self, entity_id: EntityId) -> CoreResult<bool>;
}

// ---------------------------------------------------------------------------
// Kind descriptors
// ---------------------------------------------------------------------------

/// Registration request for a new entity kind.
pub struct EntityKindSpec {
    kind: EntityKind,
    name: String,
    shape: Arc<dyn IdentifierShape>,
    probe: Option<Arc<dyn EntityProbe>>,
}

impl EntityKindSpec {
    /// A kind accepting any non-nil UUID, with no existence probe.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            shape: Arc::new(UuidShape::Any),
            probe: None,
        }
    }

    pub fn with_shape(mut self, shape: impl IdentifierShape + 'static) -> Self {
        self.shape = Arc::new(shape);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn EntityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }
}

/// A registered entity kind.
#[derive(Clone)]
pub struct KindDescriptor {
    pub kind: EntityKind,
    pub name: String,
    /// Registry version in which the kind was added.
    pub introduced_in: u32,
    /// Registry version in which the kind stopped accepting new references.
    pub retired_in: Option<u32>,
    shape: Arc<dyn IdentifierShape>,
    probe: Option<Arc<dyn EntityProbe>>,
}

impl KindDescriptor {
    pub fn is_retired(&self) -> bool {
        self.retired_in.is_some()
    }

    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn probe(&self) -> Option<Arc<dyn EntityProbe>> {
        self.probe.clone()
    }

    fn check_shape(&self, id: &EntityId, raw: &str) -> CoreResult<()> {
        self.shape
            .check(id)
            .map_err(|reason| CoreError::MalformedIdentifier {
                kind: self.name.clone(),
                value: raw.to_string(),
                reason,
            })
    }
}

impl fmt::Debug for KindDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("introduced_in", &self.introduced_in)
            .field("retired_in", &self.retired_in)
            .field("shape", &self.shape)
            .field("has_probe", &self.probe.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Map from kind tag to validator and optional prober.
///
/// Built once at startup and shared as `Arc<EntityKindRegistry>`.
#[derive(Debug, Clone)]
pub struct EntityKindRegistry {
    kinds: BTreeMap<EntityKind, KindDescriptor>,
    version: u32,
}

impl Default for EntityKindRegistry {
    fn default() -> Self {
        Self::with_builtin_kinds()
    }
}

impl EntityKindRegistry {
    /// An empty registry at version 0.
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
            version: 0,
        }
    }

    /// Registry preloaded with organization, event, user and role.
    pub fn with_builtin_kinds() -> Self {
        let builtins = [
            (EntityKind::ORGANIZATION, "organization"),
            (EntityKind::EVENT, "event"),
            (EntityKind::USER, "user"),
            (EntityKind::ROLE, "role"),
        ];
        let kinds = builtins
            .into_iter()
            .map(|(kind, name)| {
                let descriptor = KindDescriptor {
                    kind,
                    name: name.to_string(),
                    introduced_in: BUILTIN_KIND_TABLE_VERSION,
                    retired_in: None,
                    shape: Arc::new(UuidShape::Any),
                    probe: None,
                };
                (kind, descriptor)
            })
            .collect();
        Self {
            kinds,
            version: BUILTIN_KIND_TABLE_VERSION,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn get(&self, kind: EntityKind) -> Option<&KindDescriptor> {
        self.kinds.get(&kind)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&KindDescriptor> {
        self.kinds.values().find(|d| d.name == name)
    }

    /// All registered kinds, retired ones included, in tag order.
    pub fn kinds(&self) -> impl Iterator<Item = &KindDescriptor> {
        self.kinds.values()
    }

    /// Add a kind. Returns the new registry version.
    pub fn register(&mut self, spec: EntityKindSpec) -> CoreResult<u32> {
        if spec.kind.tag() <= 0 {
            return Err(CoreError::Validation(format!(
                "entity kind tag must be positive, got {}",
                spec.kind
            )));
        }
        if !KIND_NAME_RE.is_match(&spec.name) {
            return Err(CoreError::Validation(format!(
                "entity kind name must be snake_case, got {:?}",
                spec.name
            )));
        }
        if let Some(existing) = self.kinds.get(&spec.kind) {
            return Err(CoreError::Validation(format!(
                "entity kind tag {} is already registered as {:?}",
                spec.kind, existing.name
            )));
        }
        if self.get_by_name(&spec.name).is_some() {
            return Err(CoreError::Validation(format!(
                "entity kind name {:?} is already registered",
                spec.name
            )));
        }

        self.version += 1;
        self.kinds.insert(
            spec.kind,
            KindDescriptor {
                kind: spec.kind,
                name: spec.name,
                introduced_in: self.version,
                retired_in: None,
                shape: spec.shape,
                probe: spec.probe,
            },
        );
        Ok(self.version)
    }

    /// Attach (or replace) the existence probe of an already registered kind.
    pub fn attach_probe(&mut self, kind: EntityKind, probe: Arc<dyn EntityProbe>) -> CoreResult<()> {
        let descriptor = self
            .kinds
            .get_mut(&kind)
            .ok_or(CoreError::UnknownEntityKind(kind.tag()))?;
        descriptor.probe = Some(probe);
        Ok(())
    }

    /// Stop accepting new references to a kind. Idempotent.
    ///
    /// Returns the registry version after the call.
    pub fn retire(&mut self, kind: EntityKind) -> CoreResult<u32> {
        let next_version = self.version + 1;
        let descriptor = self
            .kinds
            .get_mut(&kind)
            .ok_or(CoreError::UnknownEntityKind(kind.tag()))?;
        if descriptor.retired_in.is_none() {
            descriptor.retired_in = Some(next_version);
            self.version = next_version;
        }
        Ok(self.version)
    }

    /// Validate a raw `(entity_type, entity_id)` pair.
    ///
    /// Pure: no existence check against the target's store.
    pub fn resolve(&self, entity_type: i16, entity_id: &str) -> CoreResult<EntityReference> {
        parse_for(self.writable(entity_type)?, entity_id)
    }

    /// Like [`resolve`](Self::resolve), but for reads of data that already
    /// exists: retired kinds are accepted, unregistered ones are not.
    pub fn resolve_stored(&self, entity_type: i16, entity_id: &str) -> CoreResult<EntityReference> {
        let descriptor = self
            .kinds
            .get(&EntityKind::new(entity_type))
            .ok_or(CoreError::UnknownEntityKind(entity_type))?;
        parse_for(descriptor, entity_id)
    }

    /// [`resolve`](Self::resolve), then ask the kind's probe whether the
    /// entity exists. Kinds without a probe pass unchecked.
    pub async fn resolve_strict(
        &self,
        entity_type: i16,
        entity_id: &str,
    ) -> CoreResult<EntityReference> {
        let reference = self.resolve(entity_type, entity_id)?;
        if let Some(probe) = self.get(reference.entity_type()).and_then(|d| d.probe()) {
            if !probe.exists(reference.entity_id()).await? {
                return Err(CoreError::InvalidReference(format!(
                    "{reference} does not exist"
                )));
            }
        }
        Ok(reference)
    }

    /// Re-validate a typed reference before it is persisted.
    ///
    /// Every rejection is reported as [`CoreError::InvalidReference`].
    pub fn check_reference(&self, reference: &EntityReference) -> CoreResult<()> {
        let raw = reference.entity_id().to_string();
        let checked = self
            .writable(reference.entity_type().tag())
            .and_then(|d| {
                parse_identifier(&raw).map_err(|reason| CoreError::MalformedIdentifier {
                    kind: d.name.clone(),
                    value: raw.clone(),
                    reason,
                })?;
                d.check_shape(&reference.entity_id(), &raw)
            });
        checked.map_err(|e| match e {
            CoreError::InvalidReference(msg) => CoreError::InvalidReference(msg),
            other => CoreError::InvalidReference(format!("{reference}: {other}")),
        })
    }

    fn writable(&self, entity_type: i16) -> CoreResult<&KindDescriptor> {
        match self.kinds.get(&EntityKind::new(entity_type)) {
            Some(d) if !d.is_retired() => Ok(d),
            _ => Err(CoreError::UnknownEntityKind(entity_type)),
        }
    }
}

fn parse_for(descriptor: &KindDescriptor, entity_id: &str) -> CoreResult<EntityReference> {
    let id = parse_identifier(entity_id).map_err(|reason| CoreError::MalformedIdentifier {
        kind: descriptor.name.clone(),
        value: entity_id.to_string(),
        reason,
    })?;
    descriptor.check_shape(&id, entity_id)?;
    Ok(EntityReference::new(descriptor.kind, id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
