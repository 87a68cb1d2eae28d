use chrono::SubsecRound;

/// Notification primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a referenced entity in its owning store.
pub type EntityId = uuid::Uuid;

/// Current time truncated to the microsecond precision PostgreSQL stores.
///
/// In-memory backends use this so timestamps (and pagination cursors built
/// from them) compare the same way they would after a database round-trip.
pub fn now_micros() -> Timestamp {
    to_micros(chrono::Utc::now())
}

/// Drop sub-microsecond precision from a caller-supplied timestamp.
pub fn to_micros(ts: Timestamp) -> Timestamp {
    ts.trunc_subsecs(6)
}
