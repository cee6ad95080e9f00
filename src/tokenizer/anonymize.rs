//! Privacy-safe path anonymization
//!
//! Splits a path or URL on a fixed delimiter set and replaces every chunk
//! with a random 4-character alias. Aliases are stable for the lifetime of
//! the `Anonymizer`, so repeated chunks (a shared directory, a domain) stay
//! linkable in the exported dumps without revealing their content.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

const DELIMITERS: &[char] = &['/', ':', '.', '-', '_', '&', '?'];
const ALIAS_LENGTH: usize = 4;

/// Chunks kept verbatim so the origin class (web vs. local file) survives
const PRESERVED_CHUNKS: &[&str] = &["http", "https", "file"];

pub struct Anonymizer {
    aliases: HashMap<String, String>,
    used: HashSet<String>,
    rng: StdRng,
}

impl Default for Anonymizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Anonymizer {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic aliases, for tests
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            aliases: HashMap::new(),
            used: HashSet::new(),
            rng,
        }
    }

    /// Anonymize a path, keeping delimiters and scheme chunks in place
    pub fn anonymize(&mut self, path: &str) -> String {
        let mut out = String::with_capacity(path.len());
        let mut chunk_start = 0;

        for (i, c) in path.char_indices() {
            if DELIMITERS.contains(&c) {
                self.push_chunk(&path[chunk_start..i], &mut out);
                out.push(c);
                chunk_start = i + c.len_utf8();
            }
        }
        self.push_chunk(&path[chunk_start..], &mut out);
        out
    }

    /// Number of distinct chunks aliased so far
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    fn push_chunk(&mut self, chunk: &str, out: &mut String) {
        if chunk.is_empty() {
            return;
        }
        if PRESERVED_CHUNKS
            .iter()
            .any(|preserved| preserved.eq_ignore_ascii_case(chunk))
        {
            out.push_str(chunk);
            return;
        }
        if let Some(alias) = self.aliases.get(chunk) {
            out.push_str(alias);
            return;
        }

        let alias = self.fresh_alias();
        out.push_str(&alias);
        self.aliases.insert(chunk.to_string(), alias);
    }

    fn fresh_alias(&mut self) -> String {
        loop {
            let alias: String = (0..ALIAS_LENGTH)
                .map(|_| self.rng.sample(Alphanumeric) as char)
                .collect();
            if self.used.insert(alias.clone()) {
                return alias;
            }
        }
    }
}
