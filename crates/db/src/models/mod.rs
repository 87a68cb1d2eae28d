//! Database row structs.
//!
//! Each submodule contains a `FromRow` struct matching the table columns and
//! a conversion into the corresponding `guildhall_core` domain type.

pub mod notification;
pub mod view_analytics;
