
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::answer::AnswerConfig;
use crate::chunker::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::ingest::IngestConfig;
use crate::retrieval::RetrievalConfig;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "ADMISSIONS_RAG_HOME";
const APP_DIR_NAME: &str = "admissions-rag";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimension: u32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "bge-m3:latest".to_string(),
            chat_model: "qwen2.5:7b".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_seconds: 120,
        }
    }
}

/// Hybrid scoring settings for the vector store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Weight of keyword overlap in the hybrid score, the rest goes to cosine similarity
    pub keyword_weight: f32,
    /// Vector neighbours and keyword hits fetched before scoring
    pub candidate_pool: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.3,
            candidate_pool: 50,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid max chunk size: {0} (must be between 100 and 20000 characters)")]
    InvalidMaxChunkChars(usize),
    #[error("Target chunk size ({0}) must be smaller than max chunk size ({1})")]
    TargetChunkTooLarge(usize, usize),
    #[error("Chunk overlap ({0}) must be smaller than target chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Boundary window ({0}) must not exceed target chunk size ({1})")]
    BoundaryWindowTooLarge(usize, usize),
    #[error("Invalid ingest batch size: {0} (must be between 1 and 64)")]
    InvalidBatchSize(usize),
    #[error("Invalid context cap: {0} (must be between 1 and 50)")]
    InvalidContextCap(usize),
    #[error("Invalid {0}: {1} (must be a finite number)")]
    InvalidThreshold(&'static str, f32),
    #[error("Invalid {0}: must be greater than 0")]
    InvalidLimit(&'static str),
    #[error("Invalid keyword weight: {0} (must be between 0 and 1)")]
    InvalidKeywordWeight(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            ollama: OllamaConfig::default(),
            chunking: ChunkingConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            store: StoreConfig::default(),
            answer: AnswerConfig::default(),
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Resolve the configuration directory: the explicit path if given, then
    /// `$ADMISSIONS_RAG_HOME`, then the platform config directory
    #[inline]
    pub fn config_dir(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = explicit {
            return Ok(dir.to_path_buf());
        }

        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_chunking_config()?;
        self.validate_ingest_config()?;
        self.validate_retrieval_config()?;
        self.validate_store_config()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=20_000).contains(&config.max_chunk_chars) {
            return Err(ConfigError::InvalidMaxChunkChars(config.max_chunk_chars));
        }

        if config.target_chunk_chars >= config.max_chunk_chars {
            return Err(ConfigError::TargetChunkTooLarge(
                config.target_chunk_chars,
                config.max_chunk_chars,
            ));
        }

        if config.overlap_chars >= config.target_chunk_chars {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap_chars,
                config.target_chunk_chars,
            ));
        }

        if config.boundary_window_chars > config.target_chunk_chars {
            return Err(ConfigError::BoundaryWindowTooLarge(
                config.boundary_window_chars,
                config.target_chunk_chars,
            ));
        }

        Ok(())
    }

    fn validate_ingest_config(&self) -> Result<(), ConfigError> {
        if !(1..=64).contains(&self.ingest.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.ingest.batch_size));
        }
        Ok(())
    }

    fn validate_retrieval_config(&self) -> Result<(), ConfigError> {
        let config = &self.retrieval;

        for (name, value) in [
            ("semantic threshold", config.semantic_threshold),
            ("code threshold", config.code_threshold),
            ("keyword score", config.keyword_score),
            ("sample score", config.sample_score),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidThreshold(name, value));
            }
        }

        for (name, value) in [
            ("max phrasings", config.max_phrasings),
            ("semantic limit", config.semantic_limit),
            ("code limit", config.code_limit),
            ("keyword limit", config.keyword_limit),
            ("sample limit", config.sample_limit),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidLimit(name));
            }
        }

        if !(1..=50).contains(&config.context_cap) {
            return Err(ConfigError::InvalidContextCap(config.context_cap));
        }

        Ok(())
    }

    fn validate_store_config(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.store.keyword_weight) {
            return Err(ConfigError::InvalidKeywordWeight(self.store.keyword_weight));
        }
        if self.store.candidate_pool == 0 {
            return Err(ConfigError::InvalidLimit("candidate pool"));
        }
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        for model in [&self.embedding_model, &self.chat_model] {
            if model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(model.clone()));
            }
        }

        if !(1..=8192).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=3600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.ollama_url()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(1..=8192).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}
