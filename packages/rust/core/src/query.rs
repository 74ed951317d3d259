//! Retrieval queries: embed the query text and search the vector store.

use tracing::{debug, instrument};

use ragforge_embedding::EmbeddingProvider;
use ragforge_shared::{RagForgeError, Result};
use ragforge_store::{MetadataFilter, QueryMatch, VectorStore};

/// Knobs for a retrieval query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Maximum matches returned.
    pub top_k: usize,
    /// Drop matches below this similarity (in `[0, 1]`).
    pub min_similarity: Option<f32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: None,
        }
    }
}

/// Embed `text` and return the most similar stored chunks.
#[instrument(skip_all, fields(collection = %collection, top_k = opts.top_k))]
pub async fn query_collection(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    collection: &str,
    text: &str,
    opts: &QueryOptions,
    filter: Option<&MetadataFilter>,
) -> Result<Vec<QueryMatch>> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    let embedding = if vectors.is_empty() {
        return Err(RagForgeError::Embedding(
            "provider returned no vector for query text".into(),
        ));
    } else {
        vectors.swap_remove(0)
    };

    let mut matches = store.query(collection, &embedding, opts.top_k, filter).await?;

    if let Some(threshold) = opts.min_similarity {
        matches.retain(|m| m.similarity >= threshold);
    }

    debug!(matches = matches.len(), "query complete");
    Ok(matches)
}
