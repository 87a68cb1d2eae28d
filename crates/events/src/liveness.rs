//! Time-bounded entity liveness checks.
//!
//! A notification whose target entity was deleted is an orphan. Whether the
//! target still exists is only known to the store that owns the kind, so the
//! check goes through the [`EntityProbe`] attached in the registry. A slow
//! or failing probe must never block a read path: it yields
//! [`Liveness::Unknown`] and callers treat that as alive.

use std::time::Duration;

use guildhall_core::entity::EntityReference;
use guildhall_core::error::{CoreError, CoreResult};
use guildhall_core::registry::EntityKindRegistry;

/// Outcome of one existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    /// No probe registered, the probe failed, or it ran out of time.
    Unknown,
}

impl Liveness {
    /// Fail-open reading: only a definite `Dead` counts as an orphan.
    pub fn is_orphaned(self) -> bool {
        self == Liveness::Dead
    }
}

/// Ask the probe of `entity_ref`'s kind whether the entity exists.
pub async fn probe_liveness(
    registry: &EntityKindRegistry,
    entity_ref: &EntityReference,
    timeout: Duration,
) -> Liveness {
    let Some(probe) = registry
        .get(entity_ref.entity_type())
        .and_then(|descriptor| descriptor.probe())
    else {
        return Liveness::Unknown;
    };

    match tokio::time::timeout(timeout, probe.exists(entity_ref.entity_id())).await {
        Ok(Ok(true)) => Liveness::Alive,
        Ok(Ok(false)) => Liveness::Dead,
        Ok(Err(e)) => {
            tracing::warn!(
                entity_type = entity_ref.entity_type().tag(),
                entity_id = %entity_ref.entity_id(),
                error = %e,
                "Liveness probe failed, assuming entity exists"
            );
            Liveness::Unknown
        }
        Err(_) => {
            tracing::warn!(
                entity_type = entity_ref.entity_type().tag(),
                entity_id = %entity_ref.entity_id(),
                timeout_ms = saturating_millis(timeout),
                "Liveness probe timed out, assuming entity exists"
            );
            Liveness::Unknown
        }
    }
}

/// Strict-mode existence check used on the write path.
///
/// Unlike [`probe_liveness`] this does not fail open: a probe error is
/// returned, and a timeout surfaces as [`CoreError::StorageUnavailable`].
pub async fn require_exists(
    registry: &EntityKindRegistry,
    entity_ref: &EntityReference,
    timeout: Duration,
) -> CoreResult<()> {
    let Some(probe) = registry
        .get(entity_ref.entity_type())
        .and_then(|descriptor| descriptor.probe())
    else {
        return Ok(());
    };

    let exists = tokio::time::timeout(timeout, probe.exists(entity_ref.entity_id()))
        .await
        .map_err(|_| {
            CoreError::StorageUnavailable(format!(
                "existence check for {entity_ref} timed out after {}ms",
                saturating_millis(timeout)
            ))
        })??;

    if exists {
        Ok(())
    } else {
        Err(CoreError::InvalidReference(format!(
            "{entity_ref} does not exist"
        )))
    }
}

/// Whole milliseconds in `timeout`, clamped to `u64::MAX`.
fn saturating_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use guildhall_core::entity::EntityKind;
    use guildhall_core::registry::EntityProbe;
    use guildhall_core::types::EntityId;
    use uuid::Uuid;

    use super::*;

    enum Behaviour {
        Exists(bool),
        Fails,
        Hangs,
    }

    struct TestProbe(Behaviour);

    #[async_trait]
    impl EntityProbe for TestProbe {
        async fn exists(&self, _entity_id: EntityId) -> CoreResult<bool> {
            match self.0 {
                Behaviour::Exists(b) => Ok(b),
                Behaviour::Fails => Err(CoreError::StorageUnavailable("down".into())),
                Behaviour::Hangs => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(true)
                }
            }
        }
    }

    fn registry_with(kind: EntityKind, behaviour: Behaviour) -> EntityKindRegistry {
        let mut registry = EntityKindRegistry::with_builtin_kinds();
        registry
            .attach_probe(kind, Arc::new(TestProbe(behaviour)))
            .unwrap();
        registry
    }

    fn reference(registry: &EntityKindRegistry, kind: EntityKind) -> EntityReference {
        registry
            .resolve(kind.tag(), &Uuid::new_v4().to_string())
            .unwrap()
    }

    const TIMEOUT: Duration = Duration::from_millis(250);

    #[tokio::test]
    async fn definite_answers_are_reported() {
        let alive = registry_with(EntityKind::EVENT, Behaviour::Exists(true));
        let r = reference(&alive, EntityKind::EVENT);
        assert_eq!(probe_liveness(&alive, &r, TIMEOUT).await, Liveness::Alive);

        let dead = registry_with(EntityKind::EVENT, Behaviour::Exists(false));
        let r = reference(&dead, EntityKind::EVENT);
        let liveness = probe_liveness(&dead, &r, TIMEOUT).await;
        assert_eq!(liveness, Liveness::Dead);
        assert!(liveness.is_orphaned());
    }

    #[tokio::test]
    async fn missing_probe_is_unknown() {
        let registry = EntityKindRegistry::with_builtin_kinds();
        let r = reference(&registry, EntityKind::USER);
        assert_eq!(probe_liveness(&registry, &r, TIMEOUT).await, Liveness::Unknown);
    }

    #[tokio::test]
    async fn failing_probe_fails_open() {
        let registry = registry_with(EntityKind::ORGANIZATION, Behaviour::Fails);
        let r = reference(&registry, EntityKind::ORGANIZATION);
        let liveness = probe_liveness(&registry, &r, TIMEOUT).await;
        assert_eq!(liveness, Liveness::Unknown);
        assert!(!liveness.is_orphaned());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_times_out() {
        let registry = registry_with(EntityKind::ORGANIZATION, Behaviour::Hangs);
        let r = reference(&registry, EntityKind::ORGANIZATION);
        assert_eq!(probe_liveness(&registry, &r, TIMEOUT).await, Liveness::Unknown);
        assert_matches!(
            require_exists(&registry, &r, TIMEOUT).await,
            Err(CoreError::StorageUnavailable(_))
        );
    }

    #[test]
    fn timeout_millis_saturate() {
        assert_eq!(saturating_millis(TIMEOUT), 250);
        assert_eq!(saturating_millis(Duration::from_secs(3)), 3_000);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn require_exists_rejects_dead_entity() {
        let registry = registry_with(EntityKind::EVENT, Behaviour::Exists(false));
        let r = reference(&registry, EntityKind::EVENT);
        assert_matches!(
            require_exists(&registry, &r, TIMEOUT).await,
            Err(CoreError::InvalidReference(_))
        );

        let unprobed = reference(&registry, EntityKind::ROLE);
        assert!(require_exists(&registry, &unprobed, TIMEOUT).await.is_ok());
    }
}
