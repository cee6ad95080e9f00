// Model generations and engine reports

use crate::model::{EmbeddingSet, EmbeddingSource};
use crate::similarity::CacheStats;
use crate::tokenizer::Vocabulary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One complete rebuild of tokens and embeddings
///
/// Installed atomically; readers hold an `Arc` to the generation they
/// started with.
#[derive(Debug, Clone)]
pub struct ModelState {
    pub generation: u64,
    pub vocabulary: Vocabulary,
    pub embeddings: EmbeddingSet,
    pub built_at: Option<DateTime<Utc>>,
}

impl ModelState {
    /// Generation zero: nothing has been built yet
    pub fn empty() -> Self {
        Self {
            generation: 0,
            vocabulary: Vocabulary::new(),
            embeddings: EmbeddingSet::empty(),
            built_at: None,
        }
    }
}

/// Outcome of a successful refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshReport {
    pub generation: u64,
    /// Tokens in the replayed sequence
    pub sequence_length: usize,
    pub vocabulary_size: usize,
    pub embedding_source: EmbeddingSource,
    pub embedding_dimension: usize,
    /// False when token indices of the previous generation were reassigned
    pub vocabulary_extended: bool,
    pub interventions: usize,
    /// Interventions dropped because a resource disappeared from the log
    pub dropped_interventions: usize,
    #[serde(with = "serde_duration_millis")]
    pub duration: Duration,
}

/// Snapshot of the engine for health and status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub generation: u64,
    pub vocabulary_size: usize,
    pub embedding_source: EmbeddingSource,
    pub embedding_dimension: usize,
    pub interventions: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub built_at: Option<DateTime<Utc>>,
}

impl EngineStatus {
    pub(crate) fn new(model: &ModelState, interventions: usize, cache: CacheStats) -> Self {
        Self {
            generation: model.generation,
            vocabulary_size: model.vocabulary.len(),
            embedding_source: model.embeddings.source(),
            embedding_dimension: model.embeddings.dimension(),
            interventions,
            cache_entries: cache.entries,
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            built_at: model.built_at,
        }
    }
}

// Custom serde module for Duration (serialize/deserialize as milliseconds)
pub(crate) mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_duration_as_millis() {
        let report = RefreshReport {
            generation: 3,
            sequence_length: 12,
            vocabulary_size: 4,
            embedding_source: EmbeddingSource::Cooccurrence,
            embedding_dimension: 4,
            vocabulary_extended: true,
            interventions: 1,
            dropped_interventions: 0,
            duration: Duration::from_millis(1500),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["embedding_source"], "cooccurrence");

        let back: RefreshReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
