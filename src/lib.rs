use thiserror::Error;

pub type Result<T> = std::result::Result<T, SitechatError>;

#[derive(Error, Debug)]
pub enum SitechatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Crawler error: {0}")]
    Crawler(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod crawler;
pub mod index;
pub mod indexer;
pub mod model;
pub mod ollama;
