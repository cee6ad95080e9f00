//! HTTP API for the recommendation consumer
//!
//! Provides:
//! - context lookups and the "Recently Used" smart group
//! - active-resource, intervention and interaction notifications
//! - Server-Sent Events (SSE) for session and refresh updates
//! - user settings and health

pub mod server;

pub use server::{ApiServer, ApiServerConfig};
