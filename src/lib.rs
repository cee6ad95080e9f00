//! Anamnesis - Resource Association Engine
//!
//! Learns which files, documents and web pages a person tends to use
//! together, and recommends associated resources for whatever is active
//! on screen.
//!
//! # Architecture
//!
//! - **Storage**: Visit log backends (SQLite, in-memory)
//! - **Tokenizer**: Path vocabulary, anonymized audit exports
//! - **Model**: Windowed co-occurrence counts or externally trained embeddings
//! - **Ledger**: Durable user interventions (similar / dissimilar)
//! - **Engine**: Model refresh, ranking, similarity cache
//! - **Session**: Active-resource state machine with stale-result discard
//! - **API**: HTTP + SSE surface for the desktop collaborator
//!
//! # Example
//!
//! ```ignore
//! use anamnesis_core::{AssociationConfig, RecommendOptions, RecommendationEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AssociationConfig::from_file("anamnesis.toml".as_ref())?;
//!     let engine = RecommendationEngine::open(config).await?;
//!
//!     engine.refresh().await?;
//!     let resources = engine
//!         .recommend("/Users/me/notes/plan.md", RecommendOptions::default())
//!         .await;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod interaction;
pub mod ledger;
pub mod model;
pub mod scheduler;
pub mod sequence;
pub mod session;
pub mod similarity;
pub mod storage;
pub mod tokenizer;
pub mod types;

// Re-export commonly used types
pub use config::{AssociationConfig, UserSettings};
pub use engine::{RecommendOptions, RecommendationEngine, RefreshReport};
pub use error::{AnamnesisError, Result};
pub use events::{Event, EventBroadcaster, EventType};
pub use ledger::InterventionLedger;
pub use scheduler::{ModelRefreshJob, RefreshScheduler};
pub use session::{Session, SessionState};
pub use storage::{InMemoryVisitLog, SqliteVisitStore, VisitStore};
pub use types::{
    ActiveResource, AssociatedResource, Intervention, InterventionStatus, RecordOutcome,
    ResourceVisit, Token, TokenPair,
};
