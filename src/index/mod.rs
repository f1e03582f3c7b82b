
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A single indexed chunk: its embedding, its text, and its source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

/// A retrieval hit, ordered by descending similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

/// Flat vector store over chunk embeddings.
///
/// Entries are append-only during indexing and read-only during querying.
/// Similarity is cosine, which tolerates the unnormalized magnitudes the
/// embedding model produces. The store must only be searched with vectors
/// from the same embedding model it was built with; dimension is the only
/// property that is checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension of the stored entries, fixed by the first insert.
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Append an entry. The first entry fixes the index dimension; later
    /// entries must match it.
    #[inline]
    pub fn add(&mut self, entry: IndexEntry) -> Result<()> {
        if entry.vector.is_empty() {
            bail!("Cannot index an entry with an empty vector");
        }

        match self.dimension {
            None => self.dimension = Some(entry.vector.len()),
            Some(dimension) if dimension != entry.vector.len() => {
                bail!(
                    "Vector dimension mismatch: index holds {}-dimensional vectors, got {}",
                    dimension,
                    entry.vector.len()
                );
            }
            Some(_) => {}
        }

        self.entries.push(entry);
        Ok(())
    }

    /// Return up to `k` entries with cosine similarity at or above
    /// `score_threshold`, ordered by descending similarity.
    ///
    /// An empty result is a valid response, not an error.
    #[inline]
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        if let Some(dimension) = self.dimension {
            if query.len() != dimension {
                bail!(
                    "Query dimension mismatch: index holds {}-dimensional vectors, got {}",
                    dimension,
                    query.len()
                );
            }
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|entry| SearchResult {
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .filter(|result| result.score >= score_threshold)
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);

        debug!(
            "Search over {} entries returned {} results (k={}, threshold={})",
            self.entries.len(),
            results.len(),
            k,
            score_threshold
        );

        Ok(results)
    }

    /// Serialize the index to `path`, overwriting any prior version.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create index directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string(self).context("Failed to serialize index")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write index file: {}", path.display()))?;

        info!("Saved index with {} entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Deserialize an index from `path`.
    ///
    /// # Security
    ///
    /// The file is trusted as-is: there is no signature or provenance check,
    /// and a crafted index controls every passage the model will be asked to
    /// answer from. Only load indexes you built yourself.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read index file: {}", path.display()))?;
        let index: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse index file: {}", path.display()))?;

        info!(
            "Loaded index with {} entries from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
