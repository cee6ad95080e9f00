//! In-memory visit log
//!
//! Same contract as the SQLite store without a database file. Useful for
//! tests and for embedding the engine behind another persistence layer.

use crate::error::{AnamnesisError, Result};
use crate::storage::VisitStore;
use crate::types::{is_blank_path, ResourceVisit};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryVisitLog {
    visits: RwLock<Vec<ResourceVisit>>,
    unavailable: AtomicBool,
}

impl InMemoryVisitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visits(visits: Vec<ResourceVisit>) -> Self {
        Self {
            visits: RwLock::new(visits),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an unavailable store; every read fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AnamnesisError::Database(
                "visit log unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VisitStore for InMemoryVisitLog {
    async fn fetch_ordered_visits(&self) -> Result<Vec<ResourceVisit>> {
        self.check_available()?;
        let mut visits = self.visits.read().await.clone();
        // Stable: equal timestamps keep insertion order
        visits.sort_by_key(|visit| visit.timestamp);
        Ok(visits)
    }

    async fn save_visit(&self, visit: &ResourceVisit) -> Result<()> {
        self.check_available()?;
        self.visits.write().await.push(visit.clone());
        Ok(())
    }

    async fn recently_used(&self, limit: usize) -> Result<Vec<String>> {
        let visits = self.fetch_ordered_visits().await?;
        let mut seen = HashSet::new();
        Ok(visits
            .iter()
            .rev()
            .filter(|visit| !is_blank_path(&visit.path))
            .filter(|visit| seen.insert(visit.path.clone()))
            .take(limit)
            .map(|visit| visit.path.clone())
            .collect())
    }
}
