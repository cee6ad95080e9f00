//! Resource tokenization
//!
//! Maps resource paths and URLs to dense integer tokens in first-seen order
//! and produces the token sequence and per-token frequency table that the
//! co-occurrence model is built from.
//!
//! Token assignment is a pure function of the ordered input: replaying the
//! same log always yields the same vocabulary.

pub mod anonymize;
pub mod export;

pub use anonymize::Anonymizer;
pub use export::export_audit_files;

use crate::types::{is_blank_path, ResourceMeta, ResourceVisit, Token};
use std::collections::HashMap;

/// Bidirectional path <-> token mapping for one generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    token_map: HashMap<String, Token>,
    paths: Vec<String>,
    meta: Vec<ResourceMeta>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn token(&self, path: &str) -> Option<Token> {
        self.token_map.get(path).copied()
    }

    pub fn path(&self, token: Token) -> Option<&str> {
        self.paths.get(token.index()).map(String::as_str)
    }

    pub fn meta(&self, token: Token) -> Option<&ResourceMeta> {
        self.meta.get(token.index())
    }

    /// Iterate tokens in assignment order
    pub fn iter(&self) -> impl Iterator<Item = (Token, &str)> {
        self.paths
            .iter()
            .enumerate()
            .map(|(i, path)| (Token(i), path.as_str()))
    }

    /// True when every token of `previous` still names the same resource
    ///
    /// Holds whenever the visit log only grew at the end since `previous`
    /// was built; index-keyed state from that generation stays valid.
    pub fn is_extension_of(&self, previous: &Vocabulary) -> bool {
        previous.len() <= self.len() && self.paths[..previous.len()] == previous.paths[..]
    }

    fn intern(&mut self, path: &str) -> Token {
        if let Some(token) = self.token_map.get(path) {
            return *token;
        }
        let token = Token(self.paths.len());
        self.token_map.insert(path.to_string(), token);
        self.paths.push(path.to_string());
        self.meta.push(ResourceMeta::default());
        token
    }
}

/// Output of replaying a visit log through the tokenizer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenizedLog {
    pub vocabulary: Vocabulary,
    pub sequence: Vec<Token>,
    /// Occurrences per token, indexed by token
    pub frequency: Vec<usize>,
}

impl TokenizedLog {
    fn push(&mut self, path: &str) -> Option<Token> {
        if is_blank_path(path) {
            return None;
        }
        let token = self.vocabulary.intern(path);
        if token.index() == self.frequency.len() {
            self.frequency.push(0);
        }
        self.frequency[token.index()] += 1;
        self.sequence.push(token);
        Some(token)
    }

    /// Tokenize visits, remembering the latest app/window seen for each resource
    pub fn from_visits<'a, I>(visits: I) -> Self
    where
        I: IntoIterator<Item = &'a ResourceVisit>,
    {
        let mut log = Self::default();
        for visit in visits {
            if let Some(token) = log.push(&visit.path) {
                log.vocabulary.meta[token.index()] = ResourceMeta {
                    app_name: visit.process.clone(),
                    window_title: visit.window_title.clone(),
                };
            }
        }
        log
    }
}

/// Tokenize an ordered list of resource paths
///
/// Tokens are assigned greedily in first-seen order. Empty paths are skipped:
/// they are neither tokenized nor counted.
pub fn tokenize<I, S>(ordered_paths: I) -> TokenizedLog
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut log = TokenizedLog::default();
    for path in ordered_paths {
        log.push(path.as_ref());
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_seen_order() {
        let log = tokenize(["a", "b", "a", "c", "b", "a"]);

        assert_eq!(log.vocabulary.token("a"), Some(Token(0)));
        assert_eq!(log.vocabulary.token("b"), Some(Token(1)));
        assert_eq!(log.vocabulary.token("c"), Some(Token(2)));
        assert_eq!(
            log.sequence,
            vec![Token(0), Token(1), Token(0), Token(2), Token(1), Token(0)]
        );
        assert_eq!(log.frequency, vec![3, 2, 1]);
        assert_eq!(log.vocabulary.path(Token(2)), Some("c"));
    }

    #[test]
    fn test_empty_paths_skipped() {
        let log = tokenize(["", "file:///a.txt", "  ", "\t", "file:///a.txt"]);

        assert_eq!(log.vocabulary.len(), 1);
        assert_eq!(log.vocabulary.token(""), None);
        assert_eq!(log.vocabulary.token("  "), None);
        assert_eq!(log.sequence, vec![Token(0), Token(0)]);
        assert_eq!(log.frequency, vec![2]);
    }

    #[test]
    fn test_visit_meta_tracks_latest() {
        let visits = vec![
            ResourceVisit::new("https://docs.rs", "Safari").with_window("docs.rs"),
            ResourceVisit::new("", "Finder"),
            ResourceVisit::new("https://docs.rs", "Google Chrome").with_window("Docs.rs"),
        ];
        let log = TokenizedLog::from_visits(&visits);

        let meta = log.vocabulary.meta(Token(0)).unwrap();
        assert_eq!(meta.app_name, "Google Chrome");
        assert_eq!(meta.window_title, "Docs.rs");
        assert_eq!(log.frequency, vec![2]);
    }

    #[test]
    fn test_extension_check() {
        let old = tokenize(["a", "b"]).vocabulary;
        let grown = tokenize(["a", "b", "a", "c"]).vocabulary;
        let reordered = tokenize(["b", "a", "c"]).vocabulary;

        assert!(grown.is_extension_of(&old));
        assert!(!reordered.is_extension_of(&old));
        assert!(!old.is_extension_of(&grown));
    }

    proptest! {
        #[test]
        fn prop_tokenization_is_deterministic(paths in prop::collection::vec("[a-c]{0,2}", 0..64)) {
            let first = tokenize(&paths);
            let second = tokenize(&paths);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_empty_paths_never_counted(paths in prop::collection::vec("[a-c ]{0,2}", 0..64)) {
            let log = tokenize(&paths);
            let non_empty = paths.iter().filter(|p| !is_blank_path(p)).count();
            prop_assert!(log.vocabulary.token("").is_none());
            prop_assert_eq!(log.sequence.len(), non_empty);
            prop_assert_eq!(log.frequency.iter().sum::<usize>(), non_empty);
            prop_assert_eq!(log.frequency.len(), log.vocabulary.len());
        }
    }
}
