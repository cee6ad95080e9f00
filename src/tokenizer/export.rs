//! Audit dumps for external analysis tooling
//!
//! Writes the raw token sequence and the token -> anonymized path mapping.
//! Both files are regenerated wholesale on every refresh and never read
//! back. Writes go through a temporary file and a rename so a crash never
//! leaves a half-written dump behind.

use super::{Anonymizer, TokenizedLog};
use crate::error::Result;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Write `token-sequence` and `token-anonymous` dumps for a tokenized log
pub fn export_audit_files(
    log: &TokenizedLog,
    anonymizer: &mut Anonymizer,
    sequence_path: &Path,
    anon_tokens_path: &Path,
) -> Result<()> {
    let sequence = log
        .sequence
        .iter()
        .map(|token| token.to_string())
        .collect::<Vec<_>>()
        .join(",");
    write_atomically(sequence_path, sequence.as_bytes())?;

    let mut anon_tokens = String::new();
    for (token, path) in log.vocabulary.iter() {
        anon_tokens.push_str(&format!("{},{}\n", token, anonymizer.anonymize(path)));
    }
    write_atomically(anon_tokens_path, anon_tokens.as_bytes())?;

    debug!(
        "Exported {} sequence tokens and {} anonymized paths",
        log.sequence.len(),
        log.vocabulary.len()
    );
    Ok(())
}

/// Replace `path` with `contents` via a synced temporary file
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}
