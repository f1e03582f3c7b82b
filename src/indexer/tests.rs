use super::*;
use crate::crawler::CrawlerConfig;
use anyhow::anyhow;

/// Deterministic embedder: a fixed-dimension vector derived from byte sums.
struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let sum: u32 = text.bytes().map(u32::from).sum();
        Ok(vec![
            (sum % 97) as f32 + 1.0,
            (sum % 31) as f32,
            text.len() as f32,
        ])
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Embedder that always fails, for error propagation tests.
struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("embedding service unavailable"))
    }

    fn embed_many(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("embedding service unavailable"))
    }
}

fn document(content: &str, url: &str) -> Document {
    let mut metadata = BTreeMap::new();
    metadata.insert("url".to_string(), url.to_string());
    Document::new(content, metadata)
}

#[test]
fn indexes_one_chunk_per_short_document() {
    let documents = vec![
        document("first page text", "https://example.com/a"),
        document("second page text", "https://example.com/b"),
    ];

    let index = index_documents(&documents, &HashEmbedder, &ChunkingConfig::default())
        .expect("indexing should succeed");

    assert_eq!(index.len(), 2);
    assert_eq!(index.dimension(), Some(3));
}

#[test]
fn long_documents_produce_overlapping_chunks() {
    let chunking = ChunkingConfig {
        max_chunk_size: 10,
        overlap: 3,
    };
    let documents = vec![document(
        "a long enough document that needs several chunks",
        "https://example.com/long",
    )];

    let index = index_documents(&documents, &HashEmbedder, &chunking)
        .expect("indexing should succeed");

    // 48 chars with a 10-char window and 7-char stride
    assert!(index.len() > 4);
}

#[test]
fn empty_document_set_yields_empty_index() {
    let index = index_documents(&[], &HashEmbedder, &ChunkingConfig::default())
        .expect("indexing should succeed");

    assert!(index.is_empty());

    // Querying an empty index always returns no matches
    let results = index
        .search(&[1.0, 2.0, 3.0], 4, 0.2)
        .expect("search should succeed");
    assert!(results.is_empty());
}

#[test]
fn blank_documents_are_skipped() {
    let documents = vec![
        document("   \n\t  ", "https://example.com/blank"),
        document("real content", "https://example.com/real"),
    ];

    let index = index_documents(&documents, &HashEmbedder, &ChunkingConfig::default())
        .expect("indexing should succeed");

    assert_eq!(index.len(), 1);
}

#[test]
fn chunk_metadata_carries_source_url() {
    let documents = vec![document("some text", "https://example.com/source")];

    let index = index_documents(&documents, &HashEmbedder, &ChunkingConfig::default())
        .expect("indexing should succeed");

    let query = HashEmbedder.embed("some text").expect("embed should succeed");
    let results = index.search(&query, 1, 0.0).expect("search should succeed");

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].metadata.get("url").map(String::as_str),
        Some("https://example.com/source")
    );
}

#[test]
fn embedding_failure_aborts_indexing() {
    let documents = vec![document("some text", "https://example.com/a")];

    let result = index_documents(&documents, &FailingEmbedder, &ChunkingConfig::default());
    assert!(result.is_err());
}

#[test]
fn pipeline_maps_crawl_failure_to_crawler_error() {
    let crawler = SiteCrawler::new(CrawlerConfig::default());
    let mut pipeline = IndexingPipeline::new(crawler, HashEmbedder, ChunkingConfig::default());

    let err = pipeline
        .build_index("not a url", 2)
        .expect_err("an unparsable seed should fail");

    assert!(matches!(err, SitechatError::Crawler(_)));
}
