use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use tracing::{debug, info};

use crate::chat::{ChatEngine, ChatSession};
use crate::config::Config;
use crate::{Result, SitechatError};
use crate::crawler::{CrawlerConfig, SiteCrawler, validate_url};
use crate::index::VectorIndex;
use crate::indexer::IndexingPipeline;
use crate::model::ChatTurn;
use crate::ollama::OllamaClient;

/// Crawl a site and build the persisted index.
#[inline]
pub fn build_index(
    url: &str,
    depth: usize,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    validate_url(url).map_err(|e| SitechatError::Crawler(format!("{:#}", e)))?;
    let output = resolve_index_path(output)?;

    info!("Building index for {} (depth {})", url, depth);

    let embedder = OllamaClient::new(&config.ollama)
        .map_err(|e| SitechatError::Config(format!("{:#}", e)))?;
    embedder.health_check().map_err(|e| {
        SitechatError::Network(format!("Ollama is not reachable; is the server running? {:#}", e))
    })?;

    let crawler = SiteCrawler::new(CrawlerConfig::default());
    let mut pipeline = IndexingPipeline::new(crawler, embedder, config.chunking);

    let report = pipeline.build_and_save(url, depth, &output)?;

    println!("Index built successfully!");
    println!("  URLs discovered: {}", report.crawl.total_urls);
    println!("  Pages crawled: {}", report.crawl.successful_crawls);
    println!("  Pages failed: {}", report.crawl.failed_crawls);
    println!("  Blocked by robots.txt: {}", report.crawl.robots_blocked);
    println!("  Documents indexed: {}", report.documents);
    println!("  Chunks embedded: {}", report.chunks);
    println!("  Crawl duration: {:?}", report.crawl.duration);
    println!("  Index written to: {}", output.display());

    Ok(())
}

/// Answer a single question against the persisted index.
///
/// When a history file is given, prior turns are loaded before the question
/// and the updated history is written back afterwards, so consecutive
/// invocations behave like one conversation.
#[inline]
pub fn run_query(
    question: &str,
    index_path: Option<PathBuf>,
    history_path: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let index_path = resolve_index_path(index_path)?;
    let index = VectorIndex::load(&index_path)
        .map_err(|e| SitechatError::Index(format!("{:#}", e)))?;

    let client = OllamaClient::new(&config.ollama)
        .map_err(|e| SitechatError::Config(format!("{:#}", e)))?;
    let session = match &history_path {
        Some(path) => load_history(path)?,
        None => ChatSession::new(),
    };

    let mut engine =
        ChatEngine::new(client.clone(), client, index, config.retrieval).with_session(session);

    let answer = engine
        .ask(question)
        .map_err(|e| SitechatError::Generation(format!("{:#}", e)))?;
    println!("{}", answer);

    if let Some(path) = history_path {
        save_history(&path, engine.session())?;
        debug!("Wrote {} turns to {}", engine.session().len(), path.display());
    }

    Ok(())
}

/// Interactive chat over the persisted index. History lives in memory for
/// the lifetime of the session.
#[inline]
pub fn run_chat(index_path: Option<PathBuf>, config: &Config) -> Result<()> {
    let index_path = resolve_index_path(index_path)?;
    let index = VectorIndex::load(&index_path)
        .map_err(|e| SitechatError::Index(format!("{:#}", e)))?;

    if index.is_empty() {
        println!(
            "Warning: the index at {} is empty; every answer will be the fallback.",
            index_path.display()
        );
    }

    let client = OllamaClient::new(&config.ollama)
        .map_err(|e| SitechatError::Config(format!("{:#}", e)))?;
    client.health_check().map_err(|e| {
        SitechatError::Network(format!("Ollama is not reachable; is the server running? {:#}", e))
    })?;

    let mut engine = ChatEngine::new(client.clone(), client, index, config.retrieval);

    println!(
        "Chatting over {} ({} chunks). Type your question, or 'exit' to quit.",
        index_path.display(),
        engine.index().len()
    );

    let stdin = io::stdin();
    loop {
        print!("{} ", style(">").cyan().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match engine.ask(question) {
            Ok(answer) => println!("\n{}\n", answer),
            Err(e) => eprintln!("{} {:#}", style("error:").red().bold(), e),
        }
    }

    println!("Ended session with {} turns.", engine.session().len());
    Ok(())
}

/// Print the active configuration and where it came from.
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    let config_path =
        Config::config_file_path().map_err(|e| SitechatError::Config(e.to_string()))?;

    if config_path.exists() {
        println!("Configuration file: {}", config_path.display());
    } else {
        println!(
            "No configuration file at {} (using defaults)",
            config_path.display()
        );
    }
    println!();

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{}", rendered);

    let index_path =
        Config::default_index_path().map_err(|e| SitechatError::Config(e.to_string()))?;
    println!();
    println!("Default index path: {}", index_path.display());

    Ok(())
}

fn resolve_index_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => {
            Config::default_index_path().map_err(|e| SitechatError::Config(e.to_string()))
        }
    }
}

fn load_history(path: &Path) -> Result<ChatSession> {
    if !path.exists() {
        return Ok(ChatSession::new());
    }

    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    let turns: Vec<ChatTurn> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse history file: {}", path.display()))?;

    Ok(ChatSession::from_turns(turns))
}

fn save_history(path: &Path, session: &ChatSession) -> Result<()> {
    let json = serde_json::to_string_pretty(session.history())
        .context("Failed to serialize history")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write history file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn history_round_trip() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let path = temp_dir.path().join("history.json");

        let mut session = ChatSession::new();
        session.append("first question", "first answer");
        session.append("second question", "second answer");

        save_history(&path, &session).expect("save should succeed");
        let loaded = load_history(&path).expect("load should succeed");

        assert_eq!(loaded, session);
    }

    #[test]
    fn missing_history_file_is_empty_session() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let session =
            load_history(&temp_dir.path().join("missing.json")).expect("load should succeed");
        assert!(session.is_empty());
    }

    #[test]
    fn corrupt_history_file_is_an_error() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let path = temp_dir.path().join("history.json");
        fs::write(&path, "not json").expect("write should succeed");

        assert!(load_history(&path).is_err());
    }

    #[test]
    fn missing_index_surfaces_as_index_error() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let missing = temp_dir.path().join("missing.json");

        let err = run_query("anything", Some(missing), None, &Config::default())
            .expect_err("query against a missing index should fail");

        assert!(matches!(err, SitechatError::Index(_)));
    }

    #[test]
    fn unparsable_ollama_host_surfaces_as_config_error() {
        let mut config = Config::default();
        config.ollama.host = "no spaces allowed".to_string();

        let err = build_index("https://example.com/", 1, None, &config)
            .expect_err("client construction should fail");

        assert!(matches!(err, SitechatError::Config(_)));
    }

    #[test]
    fn invalid_seed_url_surfaces_as_crawler_error() {
        let err = build_index("not a url", 1, None, &Config::default())
            .expect_err("seed validation should fail");

        assert!(matches!(err, SitechatError::Crawler(_)));
    }
}
