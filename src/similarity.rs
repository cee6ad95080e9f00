//! Pairwise similarity with time-based memoization
//!
//! Cosine similarity between token embeddings, cached per unordered token
//! pair. An entry older than the TTL is recomputed on its next lookup. The
//! cache is bounded by an LRU capacity so a large vocabulary cannot grow it
//! without limit; it is cleared whenever a new embedding generation is
//! installed.

use crate::types::TokenPair;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Cosine similarity; 0 for zero-magnitude or mismatched vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    score: f32,
    computed_at: Instant,
}

/// Hit/miss counters since the last clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct SimilarityCache {
    entries: LruCache<TokenPair, CacheEntry>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl SimilarityCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached similarity for `pair`, recomputed from `a`/`b` when absent or stale
    pub fn get(&mut self, pair: TokenPair, a: &[f32], b: &[f32]) -> f32 {
        self.get_at(pair, a, b, Instant::now())
    }

    pub fn get_at(&mut self, pair: TokenPair, a: &[f32], b: &[f32], now: Instant) -> f32 {
        if let Some(entry) = self.entries.get(&pair) {
            if now.saturating_duration_since(entry.computed_at) < self.ttl {
                self.hits += 1;
                return entry.score;
            }
        }

        self.misses += 1;
        let score = cosine_similarity(a, b);
        self.entries.put(
            pair,
            CacheEntry {
                score,
                computed_at: now,
            },
        );
        score
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
