//! Implementations of the core storage traits.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryNotificationStore, MemoryViewAnalyticsStore};
pub use postgres::{PgNotificationStore, PgViewAnalyticsStore};
