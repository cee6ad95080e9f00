// Embedding selection
//
// One generation uses exactly one embedding source: an external embedding
// file when it exists and is well-formed, otherwise the co-occurrence rows.
// The decision is taken once per refresh and applies to every token.

use super::cooccurrence::CooccurrenceMatrix;
use crate::error::{AnamnesisError, Result};
use crate::tokenizer::TokenizedLog;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSource {
    External,
    Cooccurrence,
}

/// Per-token vectors of one generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSet {
    rows: Vec<Vec<f32>>,
    dimension: usize,
    source: EmbeddingSource,
}

impl EmbeddingSet {
    pub fn new(rows: Vec<Vec<f32>>, source: EmbeddingSource) -> Self {
        let dimension = rows.first().map_or(0, Vec::len);
        Self {
            rows,
            dimension,
            source,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), EmbeddingSource::Cooccurrence)
    }

    /// Number of tokens that have an embedding
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn source(&self) -> EmbeddingSource {
        self.source
    }

    pub fn get(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index).map(Vec::as_slice)
    }
}

/// Parse an external embedding file
///
/// One resource per line, comma-separated floats. Blank lines are skipped.
/// Every row must have the same number of columns.
pub fn load_external(path: &Path) -> Result<Vec<Vec<f32>>> {
    if !path.exists() {
        return Err(AnamnesisError::MissingArtifact(path.to_path_buf()));
    }

    let artifact = path.display().to_string();
    let data = std::fs::read_to_string(path)?;
    let mut rows: Vec<Vec<f32>> = Vec::new();

    for (i, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split(',')
            .map(|cell| {
                cell.trim().parse::<f32>().map_err(|_| {
                    AnamnesisError::parse(
                        artifact.as_str(),
                        i + 1,
                        format!("cannot cast '{}' to float", cell.trim()),
                    )
                })
            })
            .collect::<Result<Vec<f32>>>()?;

        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(AnamnesisError::parse(
                    artifact.as_str(),
                    i + 1,
                    format!("expected {} columns, found {}", first.len(), row.len()),
                ));
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(AnamnesisError::parse(artifact, 0, "no embedding rows"));
    }
    Ok(rows)
}

/// Choose the embedding source for a generation
///
/// External embeddings win when they load cleanly; any load or parse error
/// falls back to the co-occurrence rows for this generation.
pub fn select_embeddings(
    external_path: &Path,
    log: &TokenizedLog,
    window_size: usize,
) -> EmbeddingSet {
    match load_external(external_path) {
        Ok(rows) => {
            info!(
                "Using external embeddings: {} rows x {} dims",
                rows.len(),
                rows[0].len()
            );
            EmbeddingSet::new(rows, EmbeddingSource::External)
        }
        Err(e) => {
            if matches!(e, AnamnesisError::MissingArtifact(_)) {
                info!("No external embeddings, using co-occurrence");
            } else if e.is_fallback_trigger() {
                warn!("External embeddings rejected ({}), using co-occurrence", e);
            } else {
                error!("Failed to read external embeddings ({}), using co-occurrence", e);
            }
            let matrix =
                CooccurrenceMatrix::build(&log.sequence, log.vocabulary.len(), window_size);
            EmbeddingSet::new(matrix.to_embeddings(), EmbeddingSource::Cooccurrence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;
    use tempfile::TempDir;

    #[test]
    fn test_load_rectangular_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.txt");
        std::fs::write(&path, "0.1, 0.2, 0.3\n\n1,2,3\n").unwrap();

        let rows = load_external(&path).unwrap();
        assert_eq!(rows, vec![vec![0.1, 0.2, 0.3], vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_ragged_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.txt");
        std::fs::write(&path, "1,2,3\n4,5\n").unwrap();

        let err = load_external(&path).unwrap_err();
        assert!(matches!(err, AnamnesisError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_non_float_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.txt");
        std::fs::write(&path, "1,abc\n").unwrap();

        assert!(load_external(&path).unwrap_err().is_fallback_trigger());
    }

    #[test]
    fn test_ragged_file_falls_back_to_cooccurrence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.txt");
        std::fs::write(&path, "1,2,3\n4,5\n").unwrap();

        let log = tokenize(["a", "b", "a", "c", "b", "a"]);
        let set = select_embeddings(&path, &log, 1);

        assert_eq!(set.source(), EmbeddingSource::Cooccurrence);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0), Some(&[6.0, 6.0, 2.0][..]));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let log = tokenize(["a", "b"]);
        let set = select_embeddings(&dir.path().join("nope.txt"), &log, 3);

        assert_eq!(set.source(), EmbeddingSource::Cooccurrence);
        assert_eq!(set.dimension(), 2);
    }

    #[test]
    fn test_unreadable_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.txt");
        std::fs::create_dir(&path).unwrap();

        let err = load_external(&path).unwrap_err();
        assert!(!err.is_fallback_trigger());

        let log = tokenize(["a", "b"]);
        let set = select_embeddings(&path, &log, 3);
        assert_eq!(set.source(), EmbeddingSource::Cooccurrence);
    }

    #[test]
    fn test_external_preferred() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.txt");
        std::fs::write(&path, "1,0\n0,1\n").unwrap();

        let log = tokenize(["a", "b"]);
        let set = select_embeddings(&path, &log, 3);

        assert_eq!(set.source(), EmbeddingSource::External);
        assert_eq!(set.get(1), Some(&[0.0, 1.0][..]));
    }
}
