//! Background worker for the notification core.
//!
//! Loads configuration, wires the PostgreSQL stores into a
//! [`NotificationDispatcher`] and runs retention compaction.

use std::sync::Arc;

use guildhall_core::registry::EntityKindRegistry;
use guildhall_core::store::{NotificationStore, ViewAnalyticsStore};
use guildhall_db::stores::{PgNotificationStore, PgViewAnalyticsStore};
use guildhall_db::DbPool;
use guildhall_events::{NotificationBus, NotificationDispatcher};

pub mod config;
pub mod retention;
pub mod telemetry;

use config::WorkerConfig;

/// Shared handles built once at startup.
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<EntityKindRegistry>,
    pub notifications: Arc<dyn NotificationStore>,
    pub analytics: Arc<dyn ViewAnalyticsStore>,
    pub bus: Arc<NotificationBus>,
    pub dispatcher: NotificationDispatcher,
}

impl Services {
    /// Wire the PostgreSQL-backed stores behind a dispatcher.
    pub fn postgres(pool: DbPool, registry: EntityKindRegistry, config: &WorkerConfig) -> Self {
        let registry = Arc::new(registry);
        let notifications: Arc<dyn NotificationStore> =
            Arc::new(PgNotificationStore::new(pool.clone(), Arc::clone(&registry)));
        let analytics: Arc<dyn ViewAnalyticsStore> = Arc::new(PgViewAnalyticsStore::new(pool));
        let bus = Arc::new(NotificationBus::default());

        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&notifications),
            Arc::clone(&analytics),
            Arc::clone(&bus),
        )
        .with_config(config.dispatcher_config());

        Self {
            registry,
            notifications,
            analytics,
            bus,
            dispatcher,
        }
    }
}
