//! Recommendation engine
//!
//! Owns the shared association state and linearizes access to it:
//!
//! - the current model generation (vocabulary + embeddings), swapped
//!   atomically by [`RecommendationEngine::refresh`]
//! - the intervention ledger, written by refresh and by user interventions
//! - the similarity cache, cleared on every generation change
//!
//! Locks are always taken in the order model, ledger, cache. A refresh builds
//! the next generation without holding any lock and only takes the model
//! write lock to install it, so recommendations keep being served from the
//! previous generation while the rebuild runs. Any refresh failure leaves the
//! installed generation and ledger untouched.

pub mod state;

pub use state::{EngineStatus, ModelState, RefreshReport};

use crate::config::{AssociationConfig, UserSettings};
use crate::error::{AnamnesisError, Result};
use crate::interaction::{Interaction, InteractionLog};
use crate::ledger::InterventionLedger;
use crate::model::select_embeddings;
use crate::sequence::SequenceBuilder;
use crate::similarity::SimilarityCache;
use crate::storage::{SqliteVisitStore, VisitStore};
use crate::tokenizer::{export_audit_files, Anonymizer, Vocabulary};
use crate::types::{
    is_blank_path, AssociatedResource, Intervention, InterventionStatus, RecordOutcome, ResourceVisit, Token,
    TokenPair,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Result list filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendOptions {
    /// Ignore the similarity threshold
    #[serde(default)]
    pub show_all: bool,
    /// Keep confirmed-dissimilar resources in the list
    #[serde(default)]
    pub show_dissimilar: bool,
}

impl RecommendOptions {
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            show_all: false,
            show_dissimilar: settings.show_dissimilar,
        }
    }
}

pub struct RecommendationEngine {
    config: AssociationConfig,
    store: Arc<dyn VisitStore>,
    builder: SequenceBuilder,
    model: RwLock<Arc<ModelState>>,
    ledger: Mutex<InterventionLedger>,
    cache: Mutex<SimilarityCache>,
    anonymizer: Mutex<Anonymizer>,
    interactions: InteractionLog,
    refreshing: AtomicBool,
}

impl RecommendationEngine {
    pub fn new(config: AssociationConfig, store: Arc<dyn VisitStore>) -> Self {
        let ledger = InterventionLedger::new(config.intervention_path());
        let cache = SimilarityCache::new(config.cache_ttl, config.cache_capacity);
        let interactions = InteractionLog::new(config.interaction_log_path());

        Self {
            builder: SequenceBuilder::new(store.clone()),
            store,
            model: RwLock::new(Arc::new(ModelState::empty())),
            ledger: Mutex::new(ledger),
            cache: Mutex::new(cache),
            anonymizer: Mutex::new(Anonymizer::new()),
            interactions,
            refreshing: AtomicBool::new(false),
            config,
        }
    }

    /// Engine backed by the SQLite visit store in the configured data directory
    pub async fn open(config: AssociationConfig) -> Result<Self> {
        let store = SqliteVisitStore::open(config.visit_db_path()).await?;
        Ok(Self::new(config, Arc::new(store)))
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    pub async fn generation(&self) -> u64 {
        self.model.read().await.generation
    }

    /// Current model generation
    pub async fn model(&self) -> Arc<ModelState> {
        self.model.read().await.clone()
    }

    /// Rebuild the model from the full visit log and install it
    pub async fn refresh(&self) -> Result<RefreshReport> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            return Err(AnamnesisError::RefreshInProgress);
        }
        let _guard = RefreshGuard(&self.refreshing);
        let result = self.rebuild().await;

        match &result {
            Ok(report) => info!(
                "Model generation {} installed: {} resources, {:?} embeddings in {:?}",
                report.generation, report.vocabulary_size, report.embedding_source, report.duration
            ),
            Err(e) => warn!("Model refresh failed, keeping previous generation: {}", e),
        }
        result
    }

    async fn rebuild(&self) -> Result<RefreshReport> {
        let started = Instant::now();

        let log = self.builder.build().await?;

        let external_path = self.config.embeddings_path();
        let window_size = self.config.window_size;
        let (log, embeddings) = tokio::task::spawn_blocking(move || {
            let embeddings = select_embeddings(&external_path, &log, window_size);
            (log, embeddings)
        })
        .await
        .map_err(|e| AnamnesisError::Other(format!("model build task failed: {}", e)))?;

        if embeddings.len() > log.vocabulary.len() {
            warn!(
                "Embedding file has {} rows for {} resources; extra rows are ignored",
                embeddings.len(),
                log.vocabulary.len()
            );
        }

        let mut anonymizer = self.anonymizer.lock().await;
        if let Err(e) = export_audit_files(
            &log,
            &mut anonymizer,
            &self.config.token_sequence_path(),
            &self.config.anon_token_path(),
        ) {
            warn!("Failed to export token audit files: {}", e);
        }
        drop(anonymizer);

        // Interventions are recorded under the model read lock, so the ledger
        // file cannot change between this load and the install below. Nothing
        // awaits after this point: a cancelled refresh installs all or nothing.
        let mut model = self.model.write().await;
        let mut installed_ledger = self.ledger.lock().await;
        let mut cache = self.cache.lock().await;
        let mut ledger = InterventionLedger::load(self.config.intervention_path())?;

        let vocabulary_extended = log.vocabulary.is_extension_of(&model.vocabulary);
        let dropped_interventions = if vocabulary_extended {
            0
        } else {
            warn!(
                "Vocabulary of generation {} was reordered, remapping interventions",
                model.generation
            );
            let previous = &model.vocabulary;
            let next = &log.vocabulary;
            ledger.remap(|token| remap_token(previous, next, token))?
        };

        let unknown = ledger
            .iter()
            .filter(|(pair, _)| pair.high().index() >= log.vocabulary.len())
            .count();
        if unknown > 0 {
            warn!("{} interventions reference resources not in the visit log", unknown);
        }

        let generation = model.generation + 1;
        let report = RefreshReport {
            generation,
            sequence_length: log.sequence.len(),
            vocabulary_size: log.vocabulary.len(),
            embedding_source: embeddings.source(),
            embedding_dimension: embeddings.dimension(),
            vocabulary_extended,
            interventions: ledger.len(),
            dropped_interventions,
            duration: started.elapsed(),
        };

        *model = Arc::new(ModelState {
            generation,
            vocabulary: log.vocabulary,
            embeddings,
            built_at: Some(Utc::now()),
        });
        *installed_ledger = ledger;
        cache.clear();

        Ok(report)
    }

    /// Ranked, status-annotated resources associated with `path`
    ///
    /// Empty when the path is blank, unknown to the current generation, or
    /// has no embedding yet (visited after the last refresh).
    pub async fn recommend(&self, path: &str, options: RecommendOptions) -> Vec<AssociatedResource> {
        if is_blank_path(path) {
            return Vec::new();
        }

        let model = self.model.read().await;
        let Some(active) = model.vocabulary.token(path) else {
            debug!("No token for {} in generation {}", path, model.generation);
            return Vec::new();
        };
        let Some(active_embedding) = model.embeddings.get(active.index()) else {
            debug!("No embedding yet for {}", path);
            return Vec::new();
        };

        let ledger = self.ledger.lock().await;
        let mut cache = self.cache.lock().await;
        let threshold = self.config.similarity_threshold;
        let candidates = model.vocabulary.len().min(model.embeddings.len());

        let mut resources = Vec::new();
        for index in 0..candidates {
            let candidate = Token(index);
            let Some(pair) = TokenPair::new(active, candidate) else {
                continue;
            };
            let Some(embedding) = model.embeddings.get(index) else {
                continue;
            };

            let status = ledger.status(&pair);
            let similarity = cache.get(pair, active_embedding, embedding);
            let above = options.show_all || similarity > threshold;
            let include = match status {
                InterventionStatus::ConfirmedSimilar => true,
                InterventionStatus::Open => above,
                InterventionStatus::ConfirmedDissimilar => options.show_dissimilar && above,
            };
            if !include {
                continue;
            }

            let Some(candidate_path) = model.vocabulary.path(candidate) else {
                let err = AnamnesisError::LookupInconsistency(format!(
                    "token {} has no path in generation {}",
                    candidate, model.generation
                ));
                error!("Skipping candidate: {}", err);
                continue;
            };

            resources.push(AssociatedResource {
                path: candidate_path.to_string(),
                meta: model.vocabulary.meta(candidate).cloned().unwrap_or_default(),
                similarity,
                status,
            });
        }

        resources.sort_by(|a, b| a.display_cmp(b));
        resources
    }

    /// Re-annotate a delivered list after an intervention without recomputing similarity
    pub async fn refresh_statuses(
        &self,
        active_path: &str,
        resources: Vec<AssociatedResource>,
        options: RecommendOptions,
    ) -> Vec<AssociatedResource> {
        let model = self.model.read().await;
        let Some(active) = model.vocabulary.token(active_path) else {
            return resources;
        };
        let ledger = self.ledger.lock().await;

        let mut resources: Vec<_> = resources
            .into_iter()
            .map(|mut resource| {
                resource.status = model
                    .vocabulary
                    .token(&resource.path)
                    .and_then(|token| TokenPair::new(active, token))
                    .map(|pair| ledger.status(&pair))
                    .unwrap_or_default();
                resource
            })
            .filter(|resource| {
                options.show_dissimilar
                    || resource.status != InterventionStatus::ConfirmedDissimilar
            })
            .collect();

        resources.sort_by(|a, b| a.display_cmp(b));
        resources
    }

    /// Record a user judgment for the pair of resources
    pub async fn record_intervention(
        &self,
        active_path: &str,
        associated_path: &str,
        intervention: Intervention,
    ) -> Result<RecordOutcome> {
        let model = self.model.read().await;
        let active = model
            .vocabulary
            .token(active_path)
            .ok_or_else(|| AnamnesisError::UnknownResource(active_path.to_string()))?;
        let associated = model
            .vocabulary
            .token(associated_path)
            .ok_or_else(|| AnamnesisError::UnknownResource(associated_path.to_string()))?;
        let pair = TokenPair::new(active, associated)
            .ok_or_else(|| AnamnesisError::SelfPair(active_path.to_string()))?;

        let outcome = self.ledger.lock().await.record(pair, intervention)?;

        let interaction = match outcome {
            RecordOutcome::Recorded => Some(Interaction::InterventionSet {
                active: active_path.to_string(),
                associated: associated_path.to_string(),
                intervention,
            }),
            RecordOutcome::Switched { from, to } => Some(Interaction::InterventionSwitched {
                active: active_path.to_string(),
                associated: associated_path.to_string(),
                from,
                to,
            }),
            RecordOutcome::AlreadyRecorded => None,
        };
        if let Some(interaction) = interaction {
            self.interactions.record(&interaction);
        }

        Ok(outcome)
    }

    /// Append a visit to the log; it is tokenized on the next refresh
    pub async fn record_visit(&self, visit: &ResourceVisit) -> Result<()> {
        self.store.save_visit(visit).await
    }

    pub fn log_interaction(&self, interaction: &Interaction) {
        self.interactions.record(interaction);
    }

    /// Distinct resources, most recently visited first
    pub async fn recently_used(&self, limit: usize) -> Result<Vec<String>> {
        self.store.recently_used(limit).await
    }

    pub async fn status(&self) -> EngineStatus {
        let model = self.model.read().await;
        let interventions = self.ledger.lock().await.len();
        let cache = self.cache.lock().await.stats();
        EngineStatus::new(&model, interventions, cache)
    }
}

/// Clears the in-progress flag even when the refresh future is dropped
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Token of the same resource in the next generation
fn remap_token(previous: &Vocabulary, next: &Vocabulary, token: Token) -> Option<Token> {
    previous.path(token).and_then(|path| next.token(path))
}
