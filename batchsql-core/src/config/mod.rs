//! Configuration types for a loader client.
//!
//! - `ConnectionConfig`: where to connect, timeouts, audit settings
//! - `SanitizationPolicy`: identifier/value check switches
//!
//! # Security
//! These configuration structs intentionally do NOT store passwords.
//! Credentials are handled separately through the security module.

mod connection;
mod policy;

pub use connection::{ConnectionConfig, DEFAULT_AUDIT_TABLE, DEFAULT_PORT, DEFAULT_PROJECT_NAME};
pub use policy::SanitizationPolicy;
