
use std::collections::BTreeMap;

use anyhow::{Result, bail};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A crawled document with whitespace-normalized content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Normalized text content
    pub content: String,
    /// Source metadata (url, title) inherited by every chunk
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// Create a document, collapsing all whitespace runs in `content` to
    /// single spaces and trimming the ends.
    #[inline]
    pub fn new(content: &str, metadata: BTreeMap<String, String>) -> Self {
        Self {
            content: normalize_whitespace(content),
            metadata,
        }
    }
}

/// A bounded-length slice of a document, the unit of embedding and retrieval.
///
/// Chunks are immutable once created and carry their parent document's
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

/// Configuration for the sliding-window chunker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chunk_size: usize,
    /// Overlap in characters between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap: 150,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            bail!("max_chunk_size must be greater than zero");
        }
        if self.overlap >= self.max_chunk_size {
            bail!(
                "overlap ({}) must be smaller than max_chunk_size ({})",
                self.overlap,
                self.max_chunk_size
            );
        }
        Ok(())
    }
}

/// Collapse all runs of whitespace to single spaces and trim the ends.
#[inline]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// Split a document into overlapping fixed-size chunks.
///
/// The window advances by `max_chunk_size - overlap` characters, so
/// consecutive chunks share exactly `overlap` characters. A document shorter
/// than the window yields a single chunk equal to its content; an empty
/// document yields no chunks. The window stops as soon as it reaches the end
/// of the content, so the final chunk may be shorter but is never a pure
/// suffix of its predecessor.
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    if document.content.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = document.content.chars().collect();
    let stride = config.max_chunk_size - config.overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + config.max_chunk_size).min(chars.len());
        chunks.push(Chunk {
            content: chars[start..end].iter().collect(),
            metadata: document.metadata.clone(),
        });
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    debug!(
        "Chunked {} chars into {} chunks (window {}, overlap {})",
        chars.len(),
        chunks.len(),
        config.max_chunk_size,
        config.overlap
    );

    Ok(chunks)
}
