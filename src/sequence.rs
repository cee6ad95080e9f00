//! Sequence builder
//!
//! Replays the full visitation log, in timestamp order, into a token
//! sequence and frequency table. Rebuilding from an unchanged log is
//! idempotent; the builder never mutates previously built output, so a
//! failed replay leaves the caller's current model untouched.

use crate::error::Result;
use crate::storage::VisitStore;
use crate::tokenizer::TokenizedLog;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SequenceBuilder {
    store: Arc<dyn VisitStore>,
}

impl SequenceBuilder {
    pub fn new(store: Arc<dyn VisitStore>) -> Self {
        Self { store }
    }

    /// Fetch the ordered visit log and tokenize it
    pub async fn build(&self) -> Result<TokenizedLog> {
        let mut visits = self.store.fetch_ordered_visits().await?;

        let ordered = visits
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp);
        if !ordered {
            warn!("Visit source returned rows out of timestamp order, re-sorting");
            visits.sort_by_key(|visit| visit.timestamp);
        }

        let log = TokenizedLog::from_visits(&visits);
        debug!(
            "Built sequence: {} visits, {} tokens, vocabulary {}",
            visits.len(),
            log.sequence.len(),
            log.vocabulary.len()
        );
        Ok(log)
    }
}
