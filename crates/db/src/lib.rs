//! Storage backends for the notification and view-analytics core.
//!
//! - [`repositories`]: zero-sized PostgreSQL repositories taking `&PgPool`.
//! - [`stores`]: [`NotificationStore`](guildhall_core::store::NotificationStore)
//!   and [`ViewAnalyticsStore`](guildhall_core::store::ViewAnalyticsStore)
//!   implementations, backed by PostgreSQL or by process memory.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod models;
pub mod repositories;
pub mod stores;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
