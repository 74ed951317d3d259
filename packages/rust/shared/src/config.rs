//! Application configuration for RagForge.
//!
//! User config lives at `~/.ragforge/ragforge.toml`.
//! Runtime settings resolve in three fixed layers:
//! per-request overrides → config file values → hardcoded defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ragforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ragforge";

// ---------------------------------------------------------------------------
// Config structs (matching ragforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Crawl resource limits.
    #[serde(default)]
    pub crawl_limits: CrawlLimitsConfig,

    /// Vector store connection settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Default vector store collection name.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            collection: default_collection(),
        }
    }
}

fn default_chunk_size() -> usize {
    5000
}
fn default_collection() -> String {
    "ragforge".into()
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Provider vector dimensionality.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum texts per provider call.
    #[serde(default = "default_max_items_per_call")]
    pub max_items_per_call: usize,

    /// Maximum estimated tokens per provider call.
    #[serde(default = "default_max_tokens_per_call")]
    pub max_tokens_per_call: usize,

    /// Retry attempts per batch before fallback.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_api_base_url(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            max_items_per_call: default_max_items_per_call(),
            max_tokens_per_call: default_max_tokens_per_call(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_api_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimension() -> usize {
    1536
}
fn default_max_items_per_call() -> usize {
    2048
}
fn default_max_tokens_per_call() -> usize {
    7000
}
fn default_max_retries() -> usize {
    3
}

/// `[crawl_limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlLimitsConfig {
    /// Crawl levels for the recursive strategy, counting the start page's
    /// level as the first.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum concurrent page fetches.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum total pages per crawl.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Wall-clock crawl budget in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CrawlLimitsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_concurrent: default_max_concurrent(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_depth() -> usize {
    2
}
fn default_max_concurrent() -> usize {
    3
}
fn default_max_pages() -> usize {
    300
}
fn default_timeout_secs() -> u64 {
    90
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the vector store HTTP API.
    #[serde(default = "default_store_url")]
    pub base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
        }
    }
}

fn default_store_url() -> String {
    "http://localhost:8001".into()
}

// ---------------------------------------------------------------------------
// Runtime ingest config (three-layer resolution)
// ---------------------------------------------------------------------------

/// Per-request overrides for a single ingestion run.
///
/// Every field is optional; `None` falls through to the config file and
/// then to the hardcoded default.
#[derive(Debug, Clone, Default)]
pub struct IngestOverrides {
    pub chunk_size: Option<usize>,
    pub collection: Option<String>,
    pub max_depth: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub max_pages: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved runtime settings for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub collection: String,
    pub max_depth: usize,
    pub max_concurrent: usize,
    pub max_pages: usize,
    pub crawl_timeout: Duration,
}

/// Resolve runtime ingest settings from the three fixed layers:
/// request overrides → stored config → defaults baked into [`AppConfig`].
///
/// The order never changes; each field resolves independently.
pub fn resolve_ingest_config(overrides: &IngestOverrides, config: &AppConfig) -> IngestConfig {
    IngestConfig {
        chunk_size: overrides.chunk_size.unwrap_or(config.defaults.chunk_size),
        collection: overrides
            .collection
            .clone()
            .unwrap_or_else(|| config.defaults.collection.clone()),
        max_depth: overrides.max_depth.unwrap_or(config.crawl_limits.max_depth),
        max_concurrent: overrides
            .max_concurrent
            .unwrap_or(config.crawl_limits.max_concurrent),
        max_pages: overrides.max_pages.unwrap_or(config.crawl_limits.max_pages),
        crawl_timeout: Duration::from_secs(
            overrides
                .timeout_secs
                .unwrap_or(config.crawl_limits.timeout_secs),
        ),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ragforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RagForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ragforge/ragforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RagForgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RagForgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RagForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RagForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RagForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the embedding API key env var is set and non-empty.
///
/// Called at startup so a missing credential fails fast instead of
/// surfacing mid-pipeline as zero-vector fallbacks.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.embedding.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(()),
        _ => Err(RagForgeError::config(format!(
            "embedding API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("chunk_size"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.chunk_size, 5000);
        assert_eq!(parsed.embedding.dimension, 1536);
        assert_eq!(parsed.crawl_limits.max_pages, 300);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
[crawl_limits]
max_depth = 5

[store]
base_url = "http://vectors.internal:9000"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.crawl_limits.max_depth, 5);
        assert_eq!(config.crawl_limits.max_pages, 300);
        assert_eq!(config.store.base_url, "http://vectors.internal:9000");
        assert_eq!(config.defaults.chunk_size, 5000);
    }

    #[test]
    fn resolution_order_is_override_then_file_then_default() {
        let mut config = AppConfig::default();
        config.crawl_limits.max_pages = 50;

        // No overrides: file value wins over the baked-in default.
        let resolved = resolve_ingest_config(&IngestOverrides::default(), &config);
        assert_eq!(resolved.max_pages, 50);
        assert_eq!(resolved.chunk_size, 5000);

        // Override wins over both.
        let overrides = IngestOverrides {
            max_pages: Some(10),
            chunk_size: Some(2000),
            ..Default::default()
        };
        let resolved = resolve_ingest_config(&overrides, &config);
        assert_eq!(resolved.max_pages, 10);
        assert_eq!(resolved.chunk_size, 2000);
        assert_eq!(resolved.max_depth, 2);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.embedding.api_key_env = "RF_TEST_NONEXISTENT_KEY_98765".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
