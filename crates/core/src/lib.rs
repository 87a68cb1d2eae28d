//! Domain core for polymorphic notifications and entity view analytics.
//!
//! - [`registry`]: the closed, versioned set of entity kinds and the
//!   reference resolver.
//! - [`notification`] / [`status`]: notification records and their
//!   active/inactive lifecycle.
//! - [`analytics`]: aggregated per-entity view counters.
//! - [`store`]: the storage traits implemented by `guildhall-db`.

pub mod analytics;
pub mod entity;
pub mod error;
pub mod notification;
pub mod pagination;
pub mod registry;
pub mod retry;
pub mod status;
pub mod store;
pub mod types;
