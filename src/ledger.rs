//! Intervention ledger
//!
//! Durable record of user-confirmed similar/dissimilar token pairs. The file
//! holds one `<type-code>,<token1>,<token2>` record per line, with type codes
//! `s` (similar) and `d` (dissimilar). The in-memory map is the latest-wins
//! projection of the file and overrides computed similarity for display.
//!
//! A first intervention for a pair is appended. Flipping an existing pair
//! rewrites the whole file from the in-memory map, so the file never holds
//! two contradictory lines for one pair. Every write is synced before the
//! in-memory map changes.

use crate::error::{AnamnesisError, Result};
use crate::tokenizer::export::write_atomically;
use crate::types::{Intervention, InterventionStatus, RecordOutcome, Token, TokenPair};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct InterventionLedger {
    path: PathBuf,
    entries: HashMap<TokenPair, Intervention>,
}

impl InterventionLedger {
    /// Empty ledger bound to `path`; nothing is read
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
        }
    }

    /// Load the ledger from disk
    ///
    /// A missing file is an empty ledger. Any malformed line aborts the whole
    /// load; no partial ledger is ever returned.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!("No intervention log at {:?}, starting empty", path);
            return Ok(Self::new(path));
        }

        let contents = std::fs::read_to_string(&path)?;
        let entries = parse_ledger(&contents, &path.display().to_string())?;
        info!("Loaded {} interventions from {:?}", entries.len(), path);
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, pair: &TokenPair) -> Option<Intervention> {
        self.entries.get(pair).copied()
    }

    pub fn status(&self, pair: &TokenPair) -> InterventionStatus {
        self.get(pair).into()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TokenPair, &Intervention)> {
        self.entries.iter()
    }

    /// Record a user intervention for a pair
    ///
    /// - unset pair: append a line
    /// - same type: no change, `AlreadyRecorded`
    /// - opposite type: flip and rewrite the file
    pub fn record(&mut self, pair: TokenPair, intervention: Intervention) -> Result<RecordOutcome> {
        match self.entries.get(&pair).copied() {
            None => {
                self.append(pair, intervention)?;
                self.entries.insert(pair, intervention);
                debug!("Recorded {} for {}", intervention, pair);
                Ok(RecordOutcome::Recorded)
            }
            Some(existing) if existing == intervention => {
                info!("Intervention {} for {} already exists", intervention, pair);
                Ok(RecordOutcome::AlreadyRecorded)
            }
            Some(existing) => {
                let flipped = existing.opposite();
                let mut next = self.entries.clone();
                next.insert(pair, flipped);
                self.rewrite(&next)?;
                self.entries = next;
                debug!("Switched {} from {} to {}", pair, existing, flipped);
                Ok(RecordOutcome::Switched {
                    from: existing,
                    to: flipped,
                })
            }
        }
    }

    /// Re-key entries after a vocabulary change
    ///
    /// `remap` maps an old token to its token in the new vocabulary, or
    /// `None` when the resource no longer exists. Entries that cannot be
    /// mapped are dropped. The file is rewritten when anything changed.
    /// Returns the number of dropped entries.
    pub fn remap<F>(&mut self, remap: F) -> Result<usize>
    where
        F: Fn(Token) -> Option<Token>,
    {
        let mut next = HashMap::with_capacity(self.entries.len());
        let mut dropped = 0;

        for (pair, intervention) in &self.entries {
            let mapped = remap(pair.low())
                .zip(remap(pair.high()))
                .and_then(|(a, b)| TokenPair::new(a, b));
            match mapped {
                Some(new_pair) => {
                    next.insert(new_pair, *intervention);
                }
                None => {
                    warn!("Dropping intervention for {}: resource no longer known", pair);
                    dropped += 1;
                }
            }
        }

        if next != self.entries {
            self.rewrite(&next)?;
            self.entries = next;
        }
        Ok(dropped)
    }

    fn append(&self, pair: TokenPair, intervention: Intervention) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        let mut line = format_line(&pair, intervention);
        if ends_without_newline(&mut file)? {
            warn!(
                "Intervention ledger {} ends mid-line, terminating it before appending",
                self.path.display()
            );
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())?;
        file.sync_data()
    }

    fn rewrite(&self, entries: &HashMap<TokenPair, Intervention>) -> std::io::Result<()> {
        let mut pairs: Vec<_> = entries.iter().collect();
        pairs.sort_by_key(|(pair, _)| **pair);

        let contents: String = pairs
            .into_iter()
            .map(|(pair, intervention)| format_line(pair, *intervention))
            .collect();
        write_atomically(&self.path, contents.as_bytes())
    }
}

/// True when the file is non-empty and its last byte is not a newline
fn ends_without_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn format_line(pair: &TokenPair, intervention: Intervention) -> String {
    format!("{},{},{}\n", intervention.code(), pair.low(), pair.high())
}

/// Parse ledger contents into the latest-wins map
pub fn parse_ledger(contents: &str, artifact: &str) -> Result<HashMap<TokenPair, Intervention>> {
    let mut entries = HashMap::new();

    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (pair, intervention) = parse_line(line)
            .map_err(|message| AnamnesisError::parse(artifact, i + 1, message))?;
        entries.insert(pair, intervention);
    }
    Ok(entries)
}

fn parse_line(line: &str) -> std::result::Result<(TokenPair, Intervention), String> {
    let columns: Vec<&str> = line.split(',').map(str::trim).collect();
    if columns.len() != 3 {
        return Err(format!("expected 3 columns, found {}", columns.len()));
    }

    let intervention = Intervention::from_code(columns[0])
        .ok_or_else(|| format!("unknown intervention '{}'", columns[0]))?;
    let a = parse_token(columns[1])?;
    let b = parse_token(columns[2])?;
    let pair = TokenPair::new(a, b).ok_or_else(|| format!("self-pair {{{},{}}}", a, b))?;

    Ok((pair, intervention))
}

fn parse_token(raw: &str) -> std::result::Result<Token, String> {
    raw.parse::<usize>()
        .map(Token)
        .map_err(|_| format!("invalid token '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pair(a: usize, b: usize) -> TokenPair {
        TokenPair::new(Token(a), Token(b)).unwrap()
    }

    #[test]
    fn test_parse_similar_line() {
        let entries = parse_ledger("s,3,7\n", "ledger").unwrap();
        assert_eq!(entries.get(&pair(3, 7)), Some(&Intervention::Similar));
        assert_eq!(entries.get(&pair(7, 3)), Some(&Intervention::Similar));
    }

    #[test]
    fn test_unknown_type_aborts_load() {
        let err = parse_ledger("s,1,2\nx,3,7\n", "ledger").unwrap_err();
        assert!(matches!(err, AnamnesisError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert!(parse_ledger("s,1\n", "ledger").is_err());
        assert!(parse_ledger("s,1,2,3\n", "ledger").is_err());
        assert!(parse_ledger("d,one,2\n", "ledger").is_err());
        assert!(parse_ledger("d,-1,2\n", "ledger").is_err());
        assert!(parse_ledger("s,4,4\n", "ledger").is_err());
    }

    #[test]
    fn test_latest_line_wins() {
        let entries = parse_ledger("s,1,2\n\nd,2,1\n", "ledger").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get(&pair(1, 2)), Some(&Intervention::Dissimilar));
    }

    #[test]
    fn test_load_failure_leaves_no_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manual-interventions.txt");
        std::fs::write(&path, "s,1,2\nbroken\n").unwrap();

        assert!(InterventionLedger::load(&path).is_err());
    }

    #[test]
    fn test_record_persists_across_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manual-interventions.txt");

        let mut ledger = InterventionLedger::load(&path).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(
            ledger.record(pair(3, 7), Intervention::Similar).unwrap(),
            RecordOutcome::Recorded
        );
        assert_eq!(
            ledger.record(pair(1, 2), Intervention::Dissimilar).unwrap(),
            RecordOutcome::Recorded
        );

        let reloaded = InterventionLedger::load(&path).unwrap();
        assert_eq!(reloaded.get(&pair(3, 7)), Some(Intervention::Similar));
        assert_eq!(reloaded.get(&pair(1, 2)), Some(Intervention::Dissimilar));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s,3,7\nd,1,2\n");
    }

    #[test]
    fn test_duplicate_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manual-interventions.txt");
        let mut ledger = InterventionLedger::new(&path);

        ledger.record(pair(0, 1), Intervention::Similar).unwrap();
        let outcome = ledger.record(pair(1, 0), Intervention::Similar).unwrap();

        assert_eq!(outcome, RecordOutcome::AlreadyRecorded);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s,0,1\n");
    }

    #[test]
    fn test_append_after_unterminated_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manual-interventions.txt");
        std::fs::write(&path, "s,0,1").unwrap();

        let mut ledger = InterventionLedger::load(&path).unwrap();
        ledger.record(pair(2, 3), Intervention::Dissimilar).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s,0,1\nd,2,3\n");
        let reloaded = InterventionLedger::load(&path).unwrap();
        assert_eq!(reloaded.get(&pair(0, 1)), Some(Intervention::Similar));
        assert_eq!(reloaded.get(&pair(2, 3)), Some(Intervention::Dissimilar));
    }

    #[test]
    fn test_flip_rewrites_single_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manual-interventions.txt");
        let mut ledger = InterventionLedger::new(&path);

        ledger.record(pair(2, 5), Intervention::Similar).unwrap();
        ledger.record(pair(0, 9), Intervention::Dissimilar).unwrap();
        let outcome = ledger.record(pair(5, 2), Intervention::Dissimilar).unwrap();

        assert_eq!(
            outcome,
            RecordOutcome::Switched {
                from: Intervention::Similar,
                to: Intervention::Dissimilar
            }
        );

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines_for_pair: Vec<_> = contents
            .lines()
            .filter(|line| line.ends_with(",2,5"))
            .collect();
        assert_eq!(lines_for_pair, vec!["d,2,5"]);
        assert_eq!(contents.lines().count(), 2);

        let reloaded = InterventionLedger::load(&path).unwrap();
        assert_eq!(reloaded.get(&pair(2, 5)), Some(Intervention::Dissimilar));
    }

    #[test]
    fn test_remap_drops_unknown_resources() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manual-interventions.txt");
        let mut ledger = InterventionLedger::new(&path);
        ledger.record(pair(0, 1), Intervention::Similar).unwrap();
        ledger.record(pair(1, 2), Intervention::Dissimilar).unwrap();

        // token 0 vanished, 1 -> 0, 2 -> 1
        let dropped = ledger
            .remap(|t| match t.index() {
                1 => Some(Token(0)),
                2 => Some(Token(1)),
                _ => None,
            })
            .unwrap();

        assert_eq!(dropped, 1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&pair(0, 1)), Some(Intervention::Dissimilar));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "d,0,1\n");
    }
}
