//! Ingestion orchestration: collectors, the chunk→embed→store pipeline,
//! retrieval queries, and hierarchical summarization.

mod collect;
mod pipeline;
mod query;
mod summarize;

pub use collect::{RepoOptions, clone_repository, collect_repository, collect_uploads, is_remote_source};
pub use pipeline::{Pipeline, chunk_id};
pub use query::{QueryOptions, query_collection};
pub use summarize::{CompletionProvider, OpenAiCompletions, Summary, summarize_chunks};
