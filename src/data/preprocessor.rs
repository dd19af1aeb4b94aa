// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Turns annotated text into the fixed-width embedding the model
// consumes, for corpora that ship raw text instead of vectors.
//
// The strategy is chosen once, when the TrainConfig is built:
//
//   Precomputed        records already carry an `embedding`
//   HashedBagOfWords   feature hashing of tokens into `dim`
//                      buckets, L2-normalised. A token's bucket
//                      comes from the first 8 bytes of its
//                      SHA-256 digest and is the same on
//                      every build and toolchain
//
// Before hashing, the configured filters run in order:
//
//   Lowercase   fold to lower case
//   StopWords   drop common English function words
//
// Whitespace and control characters are always normalised
// first, the same way for every strategy.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How text is turned into an embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingStrategy {
    /// Use the `embedding` field of each record as is
    Precomputed,
    /// Hash whitespace tokens into a fixed number of buckets
    HashedBagOfWords,
}

/// A text filter applied before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TextFilter {
    Lowercase,
    StopWords,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextProcessor {
    pub strategy: EmbeddingStrategy,
    pub filters: Vec<TextFilter>,
    /// Output width of `HashedBagOfWords`
    pub dim: usize,
}

impl TextProcessor {
    pub fn new(strategy: EmbeddingStrategy, filters: Vec<TextFilter>, dim: usize) -> Self {
        Self { strategy, filters, dim }
    }

    /// Whitespace / control-character normalisation plus the configured filters.
    pub fn clean(&self, text: &str) -> String {
        let normalised: String = text
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect();

        let mut tokens: Vec<String> = normalised.split_whitespace().map(str::to_string).collect();
        for filter in &self.filters {
            match filter {
                TextFilter::Lowercase => {
                    tokens.iter_mut().for_each(|t| *t = t.to_lowercase());
                }
                TextFilter::StopWords => {
                    tokens.retain(|t| !STOP_WORDS.contains(&t.to_lowercase().as_str()));
                }
            }
        }
        tokens.join(" ")
    }

    /// Embed `text` with the hashing strategy.
    ///
    /// Returns `None` for `Precomputed`, which has no text path.
    /// Text that filters down to nothing embeds as all zeros.
    pub fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.strategy {
            EmbeddingStrategy::Precomputed => None,
            EmbeddingStrategy::HashedBagOfWords => Some(self.hash_tokens(&self.clean(text))),
        }
    }

    fn hash_tokens(&self, cleaned: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        if self.dim == 0 {
            return v;
        }
        for token in cleaned.split_whitespace() {
            let digest = Sha256::digest(token.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let h = u64::from_le_bytes(head);
            let bucket = (h % self.dim as u64) as usize;
            // Top bit picks the sign so collisions cancel instead of pile up
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new(EmbeddingStrategy::Precomputed, Vec::new(), 0)
    }
}
