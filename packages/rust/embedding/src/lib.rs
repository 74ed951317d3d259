//! Embedding provider capability and the token-aware batch engine.
//!
//! [`EmbeddingProvider`] is the seam to the embedding API;
//! [`OpenAiEmbedder`] is the production implementation.
//! [`embed_all`] turns an arbitrary list of texts into vectors under hard
//! provider limits, with three escalating fallback tiers — it never fails,
//! substituting the zero-vector sentinel for chunks nothing could embed.

mod batch;
mod openai;
mod provider;

pub use batch::{BatchOptions, BatchOutcome, EmbedRun, embed_all};
pub use openai::OpenAiEmbedder;
pub use provider::EmbeddingProvider;
