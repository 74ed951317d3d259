//! Error types for RagForge.
//!
//! Library crates use [`RagForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all RagForge operations.
#[derive(Debug, thiserror::Error)]
pub enum RagForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during crawl or provider calls.
    #[error("network error: {0}")]
    Network(String),

    /// Sitemap/HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Embedding provider error (API rejection, malformed response).
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Vector store error (upsert, query, collection management).
    #[error("store error: {0}")]
    Store(String),

    /// Completion/LLM provider error.
    #[error("completion error: {0}")]
    Completion(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, empty input, invalid format).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RagForgeError>;

impl RagForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error looks like a provider token/context-length limit.
    ///
    /// Detection is by message-pattern match; providers signal this class
    /// of failure in prose, not in structured fields. Token-limit errors
    /// are never retried as-is — callers re-split the offending batch.
    pub fn is_token_limit(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        const TOKEN_LIMIT_INDICATORS: &[&str] = &[
            "maximum context length",
            "token limit",
            "context length exceeded",
            "too many tokens",
            "maximum tokens",
            "input is too long",
            "context_length_exceeded",
        ];
        TOKEN_LIMIT_INDICATORS.iter().any(|ind| msg.contains(ind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RagForgeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = RagForgeError::validation("empty document set");
        assert!(err.to_string().contains("empty document set"));
    }

    #[test]
    fn token_limit_detection() {
        let err = RagForgeError::Embedding(
            "This model's maximum context length is 8192 tokens".into(),
        );
        assert!(err.is_token_limit());

        let err = RagForgeError::Embedding("error code: context_length_exceeded".into());
        assert!(err.is_token_limit());

        let err = RagForgeError::Network("connection reset by peer".into());
        assert!(!err.is_token_limit());
    }
}
