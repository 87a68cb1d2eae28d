//! Translation of `sqlx` errors into [`CoreError`].

use guildhall_core::error::CoreError;

/// PostgreSQL SQLSTATE class for connection exceptions.
const SQLSTATE_CONNECTION_CLASS: &str = "08";

/// SQLSTATEs meaning the server is going away or refusing work.
const SQLSTATE_UNAVAILABLE: &[&str] = &["57P01", "57P02", "57P03", "53300"];

/// Classify a sqlx error.
///
/// - `RowNotFound` maps to `NotFound` for `entity`/`id`.
/// - Pool exhaustion, I/O, TLS and connection-class SQLSTATEs map to
///   `StorageUnavailable`. These are never retried here.
/// - Everything else maps to `Internal`.
pub fn classify(err: sqlx::Error, entity: &'static str, id: impl ToString) -> CoreError {
    match err {
        sqlx::Error::RowNotFound => CoreError::not_found(entity, id),
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => {
            tracing::error!(error = %err, entity, "Storage unavailable");
            CoreError::StorageUnavailable(err.to_string())
        }
        sqlx::Error::Database(ref db_err) => {
            let code = db_err.code();
            let unavailable = code.as_deref().is_some_and(|c| {
                c.starts_with(SQLSTATE_CONNECTION_CLASS) || SQLSTATE_UNAVAILABLE.contains(&c)
            });
            if unavailable {
                tracing::error!(error = %db_err, entity, "Storage unavailable");
                CoreError::StorageUnavailable(db_err.to_string())
            } else {
                tracing::error!(error = %db_err, entity, "Database error");
                CoreError::Internal(db_err.to_string())
            }
        }
        other => {
            tracing::error!(error = %other, entity, "Database error");
            CoreError::Internal(other.to_string())
        }
    }
}

/// [`classify`] for operations without a single row id.
pub fn storage(err: sqlx::Error, entity: &'static str) -> CoreError {
    classify(err, entity, "-")
}
