//! In-process text similarity index over historical priced items.
//!
//! A feature-hashing vectorizer (fixed dimensionality, binary token
//! features, l2-normalised) plus a corpus of `{description, price}` entries
//! loaded once from a versioned JSON artifact. The frontier estimator uses
//! it for retrieval context; the local regressor reuses the same vectorizer
//! for its feature space. Everything here is deterministic: the same text
//! always maps to the same vector.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Words carrying no pricing signal, skipped during tokenisation.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "its", "are", "has",
    "have", "you", "your", "can", "will", "all", "also", "more", "than",
];

/// FNV-1a 64-bit hash. Stable across platforms and runs, unlike the
/// std `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Lowercased alphanumeric tokens, short words and stop words dropped.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Hash a description into a binary, l2-normalised feature vector.
pub fn hash_vectorize(text: &str, dims: usize) -> Vec<f64> {
    let mut v = vec![0.0f64; dims];
    for token in tokenize(text) {
        let bucket = (fnv1a(token.as_bytes()) % dims as u64) as usize;
        v[bucket] = 1.0;
    }
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// Cosine similarity of two l2-normalised vectors (plain dot product).
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// One historical item with a known price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedItem {
    pub description: String,
    pub price: f64,
}

/// On-disk artifact shape.
#[derive(Debug, Deserialize)]
struct CorpusArtifact {
    version: String,
    dims: usize,
    items: Vec<PricedItem>,
}

/// Read-only similarity index, safe to share across concurrent evaluations.
pub struct SimilarityIndex {
    dims: usize,
    items: Vec<PricedItem>,
    vectors: Vec<Vec<f64>>,
}

impl SimilarityIndex {
    /// Load the corpus artifact and pre-vectorize every entry.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read similarity corpus: {}", path.display()))?;
        let artifact: CorpusArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse similarity corpus: {}", path.display()))?;

        if artifact.dims == 0 {
            anyhow::bail!("Similarity corpus declares zero dimensions");
        }

        let vectors = artifact
            .items
            .iter()
            .map(|item| hash_vectorize(&item.description, artifact.dims))
            .collect();

        info!(
            version = %artifact.version,
            items = artifact.items.len(),
            dims = artifact.dims,
            "Similarity corpus loaded"
        );

        Ok(Self {
            dims: artifact.dims,
            items: artifact.items,
            vectors,
        })
    }

    /// Build an index directly from items (tests, or embedded corpora).
    pub fn from_items(items: Vec<PricedItem>, dims: usize) -> Self {
        let vectors = items
            .iter()
            .map(|item| hash_vectorize(&item.description, dims))
            .collect();
        Self { dims, items, vectors }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Vectorize arbitrary text in this index's feature space.
    pub fn vectorize(&self, text: &str) -> Vec<f64> {
        hash_vectorize(text, self.dims)
    }

    /// The `k` most similar corpus items to the query, best first.
    /// Ties broken by corpus order so results are reproducible.
    pub fn top_k(&self, query: &str, k: usize) -> Vec<(&PricedItem, f64)> {
        let qv = self.vectorize(query);
        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&qv, v)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| (&self.items[i], score))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
