//! Storage layer for the visitation log
//!
//! Provides the abstraction the sequence builder replays from, plus the
//! SQLite-backed store used in production and an in-memory log for tests
//! and embedding.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::types::ResourceVisit;
use async_trait::async_trait;

pub use memory::InMemoryVisitLog;
pub use sqlite::SqliteVisitStore;

/// Persistent store of resource visits
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// All visits, ordered by timestamp (insertion order breaks ties)
    async fn fetch_ordered_visits(&self) -> Result<Vec<ResourceVisit>>;

    /// Append a visit
    async fn save_visit(&self, visit: &ResourceVisit) -> Result<()>;

    /// Distinct non-blank paths, most recently visited first
    async fn recently_used(&self, limit: usize) -> Result<Vec<String>>;
}
