//! # Configuration
//!
//! TOML configuration for the engine and its collaborators.
//!
//! Every section has defaults, so a missing file is a valid configuration.
//! Secrets (passwords, API keys) are never read from the file; they come
//! from the environment only.

use crate::retry::RetryPolicy;
use crate::taxonomy::Taxonomy;
use crate::KgError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File read when no explicit path is given, if present.
pub const DEFAULT_CONFIG_FILE: &str = "kgraph.toml";

/// Environment variable holding the Neo4j password.
pub const NEO4J_PASSWORD_ENV: &str = "NEO4J_PASSWORD";

/// Environment variable holding the embedding API key.
pub const EMBEDDING_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the comparator API key.
pub const COMPARATOR_KEY_ENV: &str = "GROQ_API_KEY";

// =============================================================================
// SECTIONS
// =============================================================================

/// Graph store connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub uri: String,
    pub username: String,
    /// Target database; the server default when absent.
    pub database: Option<String>,
    pub max_connections: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            uri: "neo4j://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            database: None,
            max_connections: 16,
        }
    }
}

/// Embedding API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    /// Vector length; also used when creating vector indexes.
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
            timeout_secs: 60,
        }
    }
}

/// Comparator (chat completion) API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Sent as `reasoning_effort` when set.
    pub reasoning_effort: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ComparatorSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "openai/gpt-oss-120b".to_string(),
            temperature: 0.2,
            reasoning_effort: Some("low".to_string()),
            timeout_secs: 60,
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub comparator: ComparatorSettings,
    pub retry: RetryPolicy,
    pub taxonomy: Taxonomy,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, KgError> {
        let config: Self = toml::from_str(raw).map_err(|e| KgError::Config(e.to_string()))?;
        config.taxonomy.validate()?;
        if config.retry.max_attempts == 0 {
            return Err(KgError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, `kgraph.toml` in the
    /// working directory is used if present, defaults otherwise.
    /// Connection overrides from the environment are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, KgError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, KgError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            KgError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Apply `NEO4J_URI`, `NEO4J_USERNAME` and `NEO4J_DATABASE` overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("NEO4J_URI") {
            self.store.uri = uri;
        }
        if let Some(username) = lookup("NEO4J_USERNAME") {
            self.store.username = username;
        }
        if let Some(database) = lookup("NEO4J_DATABASE") {
            self.store.database = Some(database);
        }
    }
}

/// Read a required secret from the environment.
pub fn secret(var: &str) -> Result<String, KgError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| KgError::Config(format!("environment variable {var} is not set")))
}

// =============================================================================
// TESTS
// =============================================================================
