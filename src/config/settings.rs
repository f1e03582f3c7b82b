use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

use crate::chat::RetrievalConfig;
use crate::chunking::ChunkingConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub chat_model: String,
    pub batch_size: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate or create the configuration directory")]
    DirectoryError,
    #[error("malformed URL: {0}")]
    InvalidUrl(String),
    #[error("port {0} is out of range (1-65535)")]
    InvalidPort(u16),
    #[error("batch size {0} is out of range (1-1000)")]
    InvalidBatchSize(u32),
    #[error("model name cannot be empty: {0:?}")]
    InvalidModel(String),
    #[error("chunking settings rejected: {0}")]
    InvalidChunking(String),
    #[error("retrieval settings rejected: {0}")]
    InvalidRetrieval(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            chat_model: "llama3:latest".to_string(),
            batch_size: 64,
        }
    }
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".sitechat"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("sitechat"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Where the index lives when no `--index`/`--output` flag is given.
    #[inline]
    pub fn default_index_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("index.json"))
    }

    /// Load the configuration from disk, falling back to defaults when no
    /// file exists yet.
    #[inline]
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path().context("No usable config file path")?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Could not parse {}", config_path.display()))?;

        config.validate().context("Invalid configuration")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate().context("Refusing to save an invalid configuration")?;

        let config_dir = Self::config_dir().context("No usable config directory")?;

        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Could not create {}", config_dir.display()))?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Could not render configuration")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Could not write {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.chunking
            .validate()
            .map_err(|e| ConfigError::InvalidChunking(e.to_string()))?;
        self.retrieval
            .validate()
            .map_err(|e| ConfigError::InvalidRetrieval(e.to_string()))?;
        Ok(())
    }
}

impl OllamaConfig {
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("http://{}:{}", self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        let url_str = format!("http://{}:{}", self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        Ok(())
    }
}
