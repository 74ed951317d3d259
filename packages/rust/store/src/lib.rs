//! Vector store capability and the Chroma-backed implementation.
//!
//! [`VectorStore`] is the persistence seam; [`ChromaStore`] talks to a
//! Chroma server over HTTP and [`MemoryStore`] backs tests. Collections
//! are always created with cosine distance, which is what makes
//! [`distance_to_similarity`] valid.

use std::collections::BTreeMap;

use ragforge_shared::Result;

mod chroma;
mod memory;

pub use chroma::ChromaStore;
pub use memory::MemoryStore;

/// Records per upsert request. Chroma rejects very large payloads, so
/// callers' batches are pre-split to this size.
pub const MAX_UPSERT_BATCH: usize = 1000;

/// One embedded chunk as stored.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

/// A query hit with its distance converted to similarity.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
    /// Raw cosine distance as reported by the store, in `[0, 2]`.
    pub distance: f32,
    /// See [`distance_to_similarity`].
    pub similarity: f32,
}

/// Exact-match metadata filter, ANDed across keys.
pub type MetadataFilter = BTreeMap<String, String>;

/// The persistence seam for embedded chunks.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist. Idempotent.
    async fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Insert or overwrite chunks by id. Returns the number of requests
    /// actually issued after batch pre-splitting.
    async fn upsert(&self, collection: &str, chunks: &[StoredChunk]) -> Result<usize>;

    /// Return the `top_k` nearest chunks to `embedding`, most similar
    /// first, optionally restricted by an exact-match metadata filter.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>>;

    /// Drop a collection and everything in it.
    async fn delete_collection(&self, name: &str) -> Result<()>;
}

/// Map a cosine distance to a similarity score in `[0, 1]`.
///
/// Cosine distance ranges over `[0, 2]` (0 = identical, 2 = opposite), so
/// the score is `1 - d/2`, clamped against floating-point drift. Only
/// meaningful for cosine collections, which is the only kind this crate
/// creates.
pub fn distance_to_similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// Split `chunks` into store-sized upsert batches.
pub(crate) fn upsert_batches(chunks: &[StoredChunk]) -> impl Iterator<Item = &[StoredChunk]> {
    chunks.chunks(MAX_UPSERT_BATCH)
}
