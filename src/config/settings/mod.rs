
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::synthesis::SynthesisMode;

/// Default greeting phrases for the deployment locale (Spanish, with the
/// usual English openers sprinkled in).
pub const DEFAULT_GREETINGS: &[&str] = &[
    "hola",
    "buen dia",
    "buen día",
    "buenas",
    "buenas tardes",
    "buenas noches",
    "hey",
    "hi",
    "hello",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Phrases recognized by the greeting short-circuit. Matched after
    /// punctuation stripping and lowercasing.
    #[serde(default = "default_greetings")]
    pub greetings: Vec<String>,
    /// Path to the sales spreadsheet. When unset, the indexer scans the
    /// working directory for the first .xlsx/.xls file it can find.
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,
    /// Directory holding the persisted vector index. Defaults to
    /// `<config dir>/vectors`.
    #[serde(default)]
    pub index_dir: Option<PathBuf>,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_greetings() -> Vec<String> {
    DEFAULT_GREETINGS.iter().map(|g| (*g).to_string()).collect()
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            greetings: default_greetings(),
            dataset_path: None,
            index_dir: None,
            base_dir: PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Embedding model identity. Must be identical between index build time
    /// and query time; a mismatch shows up as a vector dimension error.
    pub embedding_model: String,
    /// Chat model used when the generation provider is `ollama`.
    pub generation_model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            generation_model: "llama3.2".to_string(),
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub model: String,
    /// Credential for the hosted API. Falls back to the OPENAI_API_KEY
    /// environment variable when unset.
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    #[inline]
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
        }
    }
}

/// Which backend answers composed prompts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    Ollama,
    OpenAi,
}

impl std::fmt::Display for GenerationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationProvider::Ollama => write!(f, "ollama"),
            GenerationProvider::OpenAi => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
}

impl Default for GenerationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Ollama,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Document synthesis mode. Summary produces one dense report document;
    /// row produces one document per spreadsheet row.
    pub mode: SynthesisMode,
    /// Number of documents retrieved per query. When unset, defaults to 1 in
    /// summary mode and 6 in row mode.
    pub k: Option<usize>,
    /// Maximum row-mode document size in characters before chunking.
    pub chunk_size: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            mode: SynthesisMode::Summary,
            k: None,
            chunk_size: 500,
        }
    }
}

impl RetrievalConfig {
    /// Retrieval depth for the configured mode. A single summary document
    /// already carries the full grounding context, so summary mode retrieves
    /// just that one; row mode spreads grounding across many small documents.
    #[inline]
    pub fn effective_k(&self) -> usize {
        self.k.unwrap_or(match self.mode {
            SynthesisMode::Summary => 1,
            SynthesisMode::Row => 6,
        })
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
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid retrieval k: 0 (must be at least 1)")]
    InvalidRetrievalK,
    #[error("Invalid chunk size: {0} (must be between 100 and 4000)")]
    InvalidChunkSize(usize),
    #[error("Greeting list cannot be empty")]
    EmptyGreetings,
    #[error("Invalid API base URL: {0}")]
    InvalidApiBase(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
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

    /// Load configuration from the default per-user config directory.
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = crate::config::get_config_dir()?;
        Self::load(config_dir)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;

        Url::parse(&self.openai.api_base)
            .map_err(|_| ConfigError::InvalidApiBase(self.openai.api_base.clone()))?;
        if self.openai.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.openai.model.clone()));
        }

        if self.retrieval.k == Some(0) {
            return Err(ConfigError::InvalidRetrievalK);
        }
        if !(100..=4000).contains(&self.retrieval.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.retrieval.chunk_size));
        }

        if self.greetings.iter().all(|g| g.trim().is_empty()) {
            return Err(ConfigError::EmptyGreetings);
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Directory holding the persisted vector index.
    #[inline]
    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("vectors"))
    }

    /// Resolve the OpenAI credential from config or environment.
    #[inline]
    pub fn openai_api_key(&self) -> Option<String> {
        self.openai
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.generation_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.generation_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}
