#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(i16),

    #[error("Malformed identifier for {kind}: {value:?} ({reason})")]
    MalformedIdentifier {
        kind: String,
        value: String,
        reason: String,
    },

    #[error("Invalid entity reference: {0}")]
    InvalidReference(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Concurrent update conflict: {entity} {id} still contended after {attempts} attempts")]
    ConcurrentUpdateConflict {
        entity: &'static str,
        id: String,
        attempts: u32,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] keyed by any displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Errors the resolver produces. Surfaced to the caller, never retried.
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownEntityKind(_)
                | CoreError::MalformedIdentifier { .. }
                | CoreError::InvalidReference(_)
        )
    }
}
