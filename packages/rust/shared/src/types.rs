//! Core domain types for the RagForge ingestion pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for ingestion run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RawDocument
// ---------------------------------------------------------------------------

/// Where a raw document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOrigin {
    /// Fetched from the web (crawl result, rendered to Markdown).
    Web,
    /// A source file from a cloned or local repository.
    CodeFile,
    /// A documentation file from a repository (Markdown, text, reST).
    DocFile,
    /// Caller-supplied document content.
    Upload,
}

/// A unit of raw text handed from a collector to the chunker.
///
/// Immutable once produced; consumed exactly once by the chunker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    /// Stable source identifier (URL, repo-relative path, or file name).
    pub source_id: String,
    /// Full text content.
    pub text: String,
    /// Collector that produced this document.
    pub origin: DocumentOrigin,
    /// Language hint for code files (extension without the dot).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A contiguous, size-bounded slice of a source document's text — the unit
/// of embedding and storage.
///
/// `index` is contiguous within a `source_id`, assigned in emission order.
/// Chunk boundaries trim whitespace, so re-joining chunks reconstructs the
/// source only up to boundary whitespace. That is a stated, acceptable
/// lossy property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier of the source document.
    pub source_id: String,
    /// Position of this chunk within the source, starting at 0.
    pub index: usize,
    /// Chunk text; non-empty after trimming.
    pub content: String,
    /// Scalar metadata carried through to the vector store.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// EmbeddingRecord
// ---------------------------------------------------------------------------

/// A chunk paired with its embedding vector.
///
/// `vector` is all-zero (length = provider dimension) when every fallback
/// tier failed for this chunk. The zero vector is a sentinel, not a missing
/// value; downstream consumers distinguish it by its zero magnitude.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// The embedded chunk.
    pub chunk: Chunk,
    /// Embedding vector, or the zero-vector sentinel.
    pub vector: Vec<f32>,
    /// Provider vector dimensionality.
    pub vector_dim: usize,
}

impl EmbeddingRecord {
    /// Whether this record carries the zero-vector sentinel.
    pub fn is_zero_sentinel(&self) -> bool {
        self.vector.iter().all(|v| *v == 0.0)
    }
}

// ---------------------------------------------------------------------------
// IngestReport
// ---------------------------------------------------------------------------

/// A non-fatal problem recorded during an ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestIssue {
    /// Source the issue relates to (URL, path, chunk ID).
    pub source: String,
    /// Human-readable description.
    pub message: String,
}

/// Aggregate outcome of an ingestion run.
///
/// An ingestion run reports partial success with counts
/// (`chunks_stored < chunks_created`) rather than an opaque
/// all-or-nothing error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Identifier of this ingestion run.
    pub run_id: RunId,
    /// Documents collected (pages crawled, files read, uploads received).
    pub items_collected: usize,
    /// Chunks produced by the chunker.
    pub chunks_created: usize,
    /// Chunks successfully upserted to the vector store.
    pub chunks_stored: usize,
    /// Embedding provider calls made across all tiers.
    pub embedding_calls: usize,
    /// Chunks that fell back to the zero-vector sentinel.
    pub zero_vector_chunks: usize,
    /// Non-fatal per-item problems encountered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<IngestIssue>,
}

impl IngestReport {
    /// Record a non-fatal issue.
    pub fn push_issue(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.issues.push(IngestIssue {
            source: source.into(),
            message: message.into(),
        });
    }
}
