//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async SQL operations
//! that accept `&PgPool` (or a connection, when the caller owns a
//! transaction) as the first argument.

pub mod notification_repo;
pub mod view_analytics_repo;

pub use notification_repo::NotificationRepo;
pub use view_analytics_repo::ViewAnalyticsRepo;
