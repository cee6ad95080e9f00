// Windowed co-occurrence counts
//
// For every position i with token t, every position j within distance W
// (including i itself) adds one to both (t, s[j]) and (s[j], t). The self
// position therefore contributes two to the diagonal; that count is kept
// as-is so rows match previously exported matrices exactly.

use crate::types::Token;

/// Symmetric |V| x |V| count matrix, stored row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooccurrenceMatrix {
    size: usize,
    counts: Vec<u32>,
}

impl CooccurrenceMatrix {
    /// Build from a token sequence over a vocabulary of `vocab_size` tokens
    pub fn build(sequence: &[Token], vocab_size: usize, window_size: usize) -> Self {
        let mut matrix = Self {
            size: vocab_size,
            counts: vec![0; vocab_size * vocab_size],
        };
        if sequence.is_empty() {
            return matrix;
        }

        let last = sequence.len() - 1;
        for (i, &t) in sequence.iter().enumerate() {
            let start = i.saturating_sub(window_size);
            let end = (i + window_size).min(last);
            for &other in &sequence[start..=end] {
                matrix.increment(t, other);
                matrix.increment(other, t);
            }
        }
        matrix
    }

    fn increment(&mut self, row: Token, col: Token) {
        let idx = row.index() * self.size + col.index();
        self.counts[idx] += 1;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: Token, col: Token) -> u32 {
        self.counts[row.index() * self.size + col.index()]
    }

    pub fn row(&self, token: Token) -> &[u32] {
        let start = token.index() * self.size;
        &self.counts[start..start + self.size]
    }

    /// Rows cast to floating point, one embedding per token
    pub fn to_embeddings(&self) -> Vec<Vec<f32>> {
        self.counts
            .chunks(self.size.max(1))
            .take(self.size)
            .map(|row| row.iter().map(|&c| c as f32).collect())
            .collect()
    }
}
