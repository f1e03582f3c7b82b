#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::SitechatError;
use crate::chunking::{Chunk, ChunkingConfig, Document, chunk_document};
use crate::crawler::{CrawlStats, CrawledPage, SiteCrawler};
use crate::index::{IndexEntry, VectorIndex};
use crate::model::Embedder;

/// One-shot pipeline that turns a website into a persisted vector index:
/// crawl, normalize, chunk, embed, insert.
pub struct IndexingPipeline<E> {
    crawler: SiteCrawler,
    embedder: E,
    chunking: ChunkingConfig,
}

/// Outcome of an indexing run.
#[derive(Debug, Clone, Copy)]
pub struct IndexingReport {
    pub crawl: CrawlStats,
    pub documents: usize,
    pub chunks: usize,
}

impl<E: Embedder> IndexingPipeline<E> {
    #[inline]
    pub fn new(crawler: SiteCrawler, embedder: E, chunking: ChunkingConfig) -> Self {
        Self {
            crawler,
            embedder,
            chunking,
        }
    }

    /// Crawl from `seed_url` and build a fresh index over everything found.
    ///
    /// An empty crawl result produces an empty index; querying it later
    /// simply never returns matches.
    #[inline]
    pub fn build_index(
        &mut self,
        seed_url: &str,
        max_depth: usize,
    ) -> Result<(VectorIndex, IndexingReport), SitechatError> {
        let (pages, crawl_stats) = self
            .crawler
            .crawl(seed_url, max_depth)
            .map_err(|e| SitechatError::Crawler(format!("{:#}", e)))?;

        let documents: Vec<Document> = pages.into_iter().map(page_to_document).collect();
        let document_count = documents.len();

        let index = index_documents(&documents, &self.embedder, &self.chunking)
            .map_err(|e| SitechatError::Embedding(format!("{:#}", e)))?;

        let report = IndexingReport {
            crawl: crawl_stats,
            documents: document_count,
            chunks: index.len(),
        };

        info!(
            "Indexed {} chunks from {} documents",
            report.chunks, report.documents
        );

        Ok((index, report))
    }

    /// Build an index and persist it at `path`, overwriting any prior index.
    #[inline]
    pub fn build_and_save(
        &mut self,
        seed_url: &str,
        max_depth: usize,
        path: &Path,
    ) -> Result<IndexingReport, SitechatError> {
        let (index, report) = self.build_index(seed_url, max_depth)?;
        index.save(path).map_err(|e| {
            SitechatError::Index(format!("Failed to persist index to {}: {:#}", path.display(), e))
        })?;
        Ok(report)
    }
}

/// Chunk and embed a set of documents into a fresh index.
///
/// This is the crawl-free core of the pipeline; `build_index` feeds it the
/// crawled pages.
#[inline]
pub fn index_documents<E: Embedder>(
    documents: &[Document],
    embedder: &E,
    chunking: &ChunkingConfig,
) -> Result<VectorIndex> {
    let mut chunks: Vec<Chunk> = Vec::new();
    for document in documents {
        let document_chunks = chunk_document(document, chunking)?;
        if document_chunks.is_empty() {
            warn!(
                "Document {} has no content, skipping",
                document.metadata.get("url").map_or("<unknown>", String::as_str)
            );
            continue;
        }
        chunks.extend(document_chunks);
    }

    debug!("Embedding {} chunks", chunks.len());

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
    let vectors = embedder
        .embed_many(&texts)
        .context("Failed to embed chunks")?;

    let mut index = VectorIndex::new();
    for (chunk, vector) in chunks.into_iter().zip(vectors) {
        index.add(IndexEntry {
            vector,
            content: chunk.content,
            metadata: chunk.metadata,
        })?;
    }

    Ok(index)
}

fn page_to_document(page: CrawledPage) -> Document {
    let mut metadata = BTreeMap::new();
    metadata.insert("url".to_string(), page.url.to_string());
    metadata.insert("title".to_string(), page.title);
    Document::new(&page.text, metadata)
}
