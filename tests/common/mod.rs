//! Shared helpers for integration tests

#![allow(dead_code)]

use anamnesis_core::{AssociationConfig, RecommendationEngine, ResourceVisit};
use chrono::{Duration, Utc};
use tempfile::TempDir;

/// Two usage clusters: a/b used together, then c/d used together
pub const CLUSTERED_LOG: [&str; 12] = ["a", "b", "a", "b", "a", "b", "c", "d", "c", "d", "c", "d"];

/// Configuration rooted in a fresh temporary data directory
pub fn test_config(dir: &TempDir) -> AssociationConfig {
    AssociationConfig {
        window_size: 1,
        ..AssociationConfig::with_data_dir(dir.path())
    }
}

/// Open an SQLite-backed engine and record `paths` one second apart
pub async fn seeded_engine(config: AssociationConfig, paths: &[&str]) -> RecommendationEngine {
    let engine = RecommendationEngine::open(config)
        .await
        .expect("Failed to open engine");

    let t0 = Utc::now() - Duration::hours(1);
    for (i, path) in paths.iter().enumerate() {
        let visit = ResourceVisit::new(*path, "Finder")
            .with_window(format!("{} - Finder", path))
            .at(t0 + Duration::seconds(i as i64));
        engine.record_visit(&visit).await.expect("Failed to record visit");
    }
    engine
}
