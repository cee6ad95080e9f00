//! Association model
//!
//! - cooccurrence: windowed symmetric co-occurrence counts over the token sequence
//! - embeddings: external embedding loading and per-generation source selection

pub mod cooccurrence;
pub mod embeddings;

pub use cooccurrence::CooccurrenceMatrix;
pub use embeddings::{load_external, select_embeddings, EmbeddingSet, EmbeddingSource};
