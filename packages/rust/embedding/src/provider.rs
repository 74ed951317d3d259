//! The embedding capability seam.

use ragforge_shared::Result;

/// A capability that turns texts into embedding vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order, or an error. Errors whose [`RagForgeError::is_token_limit`]
/// returns true are treated specially by the batch engine (immediate
/// re-split, no retry).
///
/// [`RagForgeError::is_token_limit`]: ragforge_shared::RagForgeError::is_token_limit
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector dimensionality this provider produces (used for the
    /// zero-vector sentinel).
    fn dimension(&self) -> usize;
}
