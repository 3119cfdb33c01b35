//! Text embedding for the semantic index.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Maps text to a fixed-length vector. Implementations must be deterministic.
pub trait Embedder {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashing bag-of-words embedder.
///
/// Each content word is hashed into one of `dimensions` buckets and weighted
/// by `1 + ln(count)`. Needs no model and gives stable vectors across runs,
/// which keeps persisted embeddings valid.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.dimensions as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for token in tokenize(text) {
            *counts.entry(token).or_default() += 1;
        }

        let mut vector = vec![0.0; self.dimensions];
        for (token, count) in counts {
            vector[self.bucket(&token)] += 1.0 + (count as f32).ln();
        }
        vector
    }
}

/// Common English words that carry no topical signal.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "was", "has", "are", "not", "this", "that", "with", "from", "have",
    "you", "can", "its", "will", "but", "they", "all", "been", "also", "into", "more", "than",
    "when", "who", "what", "how", "out", "our", "her", "his", "she", "him", "their", "them",
    "were", "had", "then", "there",
];

/// Lowercased content words of at least three characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
}

/// Cosine similarity clamped into `[0, 1]`. Mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}
