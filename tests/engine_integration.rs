//! Engine Integration Tests
//!
//! End-to-end flows over the SQLite visit store:
//! 1. Visits recorded → refresh → co-occurrence recommendations
//! 2. Interventions reorder and filter results
//! 3. Ledger and visits survive a restart
//! 4. Audit dumps are anonymized

mod common;

use anamnesis_core::model::EmbeddingSource;
use anamnesis_core::{
    Intervention, InterventionStatus, RecommendOptions, RecommendationEngine, RecordOutcome,
};
use common::{seeded_engine, test_config, CLUSTERED_LOG};
use tempfile::TempDir;

fn paths(resources: &[anamnesis_core::AssociatedResource]) -> Vec<&str> {
    resources.iter().map(|r| r.path.as_str()).collect()
}

#[tokio::test]
async fn test_cooccurrence_recommendations_follow_usage() {
    let dir = TempDir::new().unwrap();
    let engine = seeded_engine(test_config(&dir), &CLUSTERED_LOG).await;

    let report = engine.refresh().await.unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(report.sequence_length, 12);
    assert_eq!(report.vocabulary_size, 4);
    assert_eq!(report.embedding_source, EmbeddingSource::Cooccurrence);

    let for_a = engine.recommend("a", RecommendOptions::default()).await;
    assert_eq!(paths(&for_a), vec!["b"]);
    assert!(for_a[0].similarity > 0.8);
    assert_eq!(for_a[0].meta.app_name, "Finder");
    assert_eq!(for_a[0].meta.window_title, "b - Finder");

    let for_c = engine.recommend("c", RecommendOptions::default()).await;
    assert_eq!(paths(&for_c), vec!["d"]);

    let everything = engine
        .recommend(
            "a",
            RecommendOptions {
                show_all: true,
                ..Default::default()
            },
        )
        .await;
    assert_eq!(everything.len(), 3);
    assert_eq!(everything[0].path, "b");
}

#[tokio::test]
async fn test_interventions_reorder_and_filter() {
    let dir = TempDir::new().unwrap();
    let engine = seeded_engine(test_config(&dir), &CLUSTERED_LOG).await;
    engine.refresh().await.unwrap();

    let outcome = engine
        .record_intervention("a", "c", Intervention::Similar)
        .await
        .unwrap();
    assert_eq!(outcome, RecordOutcome::Recorded);
    engine
        .record_intervention("b", "a", Intervention::Dissimilar)
        .await
        .unwrap();

    let for_a = engine.recommend("a", RecommendOptions::default()).await;
    assert_eq!(paths(&for_a), vec!["c"]);
    assert_eq!(for_a[0].status, InterventionStatus::ConfirmedSimilar);

    let with_dissimilar = engine
        .recommend(
            "a",
            RecommendOptions {
                show_all: false,
                show_dissimilar: true,
            },
        )
        .await;
    assert_eq!(paths(&with_dissimilar), vec!["c", "b"]);
    assert_eq!(with_dissimilar[1].status, InterventionStatus::ConfirmedDissimilar);

    let flipped = engine
        .record_intervention("c", "a", Intervention::Dissimilar)
        .await
        .unwrap();
    assert_eq!(
        flipped,
        RecordOutcome::Switched {
            from: Intervention::Similar,
            to: Intervention::Dissimilar,
        }
    );
    assert!(engine.recommend("a", RecommendOptions::default()).await.is_empty());
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let engine = seeded_engine(test_config(&dir), &CLUSTERED_LOG).await;
        engine.refresh().await.unwrap();
        engine
            .record_intervention("a", "d", Intervention::Similar)
            .await
            .unwrap();
    }

    let engine = RecommendationEngine::open(test_config(&dir)).await.unwrap();
    let report = engine.refresh().await.unwrap();
    assert_eq!(report.vocabulary_size, 4);
    assert_eq!(report.interventions, 1);

    let for_a = engine.recommend("a", RecommendOptions::default()).await;
    assert_eq!(paths(&for_a), vec!["d", "b"]);

    let recent = engine.recently_used(3).await.unwrap();
    assert_eq!(recent, vec!["d", "c", "b"]);

    let ledger = std::fs::read_to_string(engine.config().intervention_path()).unwrap();
    assert_eq!(ledger, "s,0,3\n");
}

#[tokio::test]
async fn test_audit_dumps_are_anonymized() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let engine = seeded_engine(config.clone(), &["/Users/me/plan.md", "https://example.com/x"]).await;
    engine.refresh().await.unwrap();

    let sequence = std::fs::read_to_string(config.token_sequence_path()).unwrap();
    assert_eq!(sequence, "0,1");

    let anonymized = std::fs::read_to_string(config.anon_token_path()).unwrap();
    assert!(!anonymized.contains("plan.md"));
    assert!(!anonymized.contains("example"));
    assert!(anonymized.contains("https://"));
}

#[tokio::test]
async fn test_refresh_picks_up_new_visits() {
    let dir = TempDir::new().unwrap();
    let engine = seeded_engine(test_config(&dir), &CLUSTERED_LOG[..6]).await;
    engine.refresh().await.unwrap();
    assert!(engine.recommend("c", RecommendOptions::default()).await.is_empty());

    for path in &CLUSTERED_LOG[6..] {
        engine
            .record_visit(&anamnesis_core::ResourceVisit::new(*path, "Preview"))
            .await
            .unwrap();
    }

    let report = engine.refresh().await.unwrap();
    assert_eq!(report.generation, 2);
    assert!(report.vocabulary_extended);
    assert_eq!(
        paths(&engine.recommend("c", RecommendOptions::default()).await),
        vec!["d"]
    );
}
