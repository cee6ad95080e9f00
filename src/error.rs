//! Error types for the Anamnesis association engine
//!
//! This module provides the error taxonomy shared by every component, using
//! thiserror for structured error definitions and anyhow at the binary boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Anamnesis operations
#[derive(Error, Debug)]
pub enum AnamnesisError {
    /// A persisted artifact (intervention log, embedding file) is malformed
    #[error("Parse error in {artifact} at line {line}: {message}")]
    Parse {
        artifact: String,
        line: usize,
        message: String,
    },

    /// An optional artifact does not exist on disk
    #[error("Missing artifact: {0}")]
    MissingArtifact(PathBuf),

    /// A token has no resolvable resource path
    #[error("Lookup inconsistency: {0}")]
    LookupInconsistency(String),

    /// An intervention was requested between a resource and itself
    #[error("Cannot relate a resource to itself: {0}")]
    SelfPair(String),

    /// Resource is unknown to the current vocabulary
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// A model refresh is already running
    #[error("Model refresh already in progress")]
    RefreshInProgress,

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl AnamnesisError {
    /// Build a parse error for a named artifact
    pub fn parse(artifact: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            artifact: artifact.into(),
            line,
            message: message.into(),
        }
    }

    /// Expected reasons to skip an optional artifact, as opposed to I/O faults
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::MissingArtifact(_))
    }
}

/// Result type alias for Anamnesis operations
pub type Result<T> = std::result::Result<T, AnamnesisError>;

/// Convert anyhow::Error to AnamnesisError
impl From<anyhow::Error> for AnamnesisError {
    fn from(err: anyhow::Error) -> Self {
        AnamnesisError::Other(err.to_string())
    }
}

impl From<rusqlite::Error> for AnamnesisError {
    fn from(err: rusqlite::Error) -> Self {
        AnamnesisError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for AnamnesisError {
    fn from(err: toml::de::Error) -> Self {
        AnamnesisError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AnamnesisError {
    fn from(err: toml::ser::Error) -> Self {
        AnamnesisError::Config(err.to_string())
    }
}
