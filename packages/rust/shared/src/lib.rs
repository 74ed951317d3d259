//! Shared types, error model, and configuration for RagForge.
//!
//! This crate is the foundation depended on by all other RagForge crates.
//! It provides:
//! - [`RagForgeError`] — the unified error type
//! - Domain types ([`RawDocument`], [`Chunk`], [`EmbeddingRecord`], [`IngestReport`])
//! - Configuration ([`AppConfig`], [`IngestConfig`], three-layer resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlLimitsConfig, DefaultsConfig, EmbeddingConfig, IngestConfig, IngestOverrides,
    StoreConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_ingest_config, validate_api_key,
};
pub use error::{RagForgeError, Result};
pub use types::{
    Chunk, DocumentOrigin, EmbeddingRecord, IngestIssue, IngestReport, RawDocument, RunId,
};
