//! Notification delivery plumbing: the lifecycle event bus, liveness
//! probing and the dispatch/query facade used by request handlers.

pub mod bus;
pub mod dispatch;
pub mod liveness;

pub use bus::{NotificationBus, NotificationEvent, NotificationEventKind};
pub use dispatch::{
    AnnotatedNotification, DispatcherConfig, NotificationDispatcher, NotificationPayload,
};
