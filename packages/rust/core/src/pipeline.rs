//! The ingestion pipeline: collect → chunk → embed → store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use url::Url;

use ragforge_chunking::{chunk_code, chunk_text};
use ragforge_crawler::{CrawlBudget, Crawler, HttpFetcher};
use ragforge_embedding::{BatchOptions, EmbeddingProvider, embed_all};
use ragforge_shared::{
    Chunk, DocumentOrigin, EmbeddingRecord, IngestConfig, IngestReport, RawDocument, Result,
};
use ragforge_store::{StoredChunk, VectorStore};

use crate::collect::{
    RepoOptions, clone_repository, collect_repository, collect_uploads, is_remote_source,
};

/// Orchestrates one or more ingestion runs against a collection.
///
/// Holds constructed provider and store handles; nothing here is a global.
pub struct Pipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: IngestConfig,
    batch: BatchOptions,
}

impl Pipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: IngestConfig,
        batch: BatchOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
            batch,
        }
    }

    /// Crawl a URL and ingest every page it yields.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn ingest_url(&self, url: &Url) -> Result<IngestReport> {
        let fetcher = Arc::new(HttpFetcher::new()?);
        let crawler = Crawler::new(fetcher, self.crawl_budget());
        self.ingest_crawl(&crawler, url).await
    }

    /// Ingest via a caller-provided crawler (tests inject mock fetchers
    /// this way).
    pub async fn ingest_crawl(&self, crawler: &Crawler, url: &Url) -> Result<IngestReport> {
        let outcome = crawler.crawl(url).await?;

        let documents = outcome
            .pages
            .into_iter()
            .map(|page| RawDocument {
                source_id: page.url.to_string(),
                text: page.markdown,
                origin: DocumentOrigin::Web,
                language_hint: None,
            })
            .collect();

        let mut report = self.ingest_documents(documents).await?;
        for (url, message) in outcome.errors {
            report.push_issue(url, message);
        }
        Ok(report)
    }

    /// Ingest a repository: a local path, or a remote URL that gets a
    /// shallow clone into a temp directory first.
    #[instrument(skip_all, fields(source = %source))]
    pub async fn ingest_repository(
        &self,
        source: &str,
        opts: &RepoOptions,
    ) -> Result<IngestReport> {
        let documents = if is_remote_source(source) {
            let checkout = clone_repository(source).await?;
            let result = collect_repository(&checkout, opts);
            if let Err(e) = std::fs::remove_dir_all(&checkout) {
                warn!(dir = %checkout.display(), error = %e, "failed to remove clone dir");
            }
            result?
        } else {
            collect_repository(Path::new(source), opts)?
        };

        self.ingest_documents(documents).await
    }

    /// Ingest caller-supplied `(name, content)` documents.
    pub async fn ingest_uploads(&self, uploads: Vec<(String, String)>) -> Result<IngestReport> {
        self.ingest_documents(collect_uploads(uploads)).await
    }

    /// Chunk, embed, and store a set of collected documents.
    ///
    /// Per-document problems become report issues; the run reports partial
    /// success with counts rather than failing whole.
    #[instrument(skip_all, fields(collection = %self.config.collection, documents = documents.len()))]
    pub async fn ingest_documents(&self, documents: Vec<RawDocument>) -> Result<IngestReport> {
        let mut report = IngestReport {
            items_collected: documents.len(),
            ..Default::default()
        };

        self.store.ensure_collection(&self.config.collection).await?;

        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            let pieces = match document.origin {
                DocumentOrigin::CodeFile => chunk_code(&document.text, self.config.chunk_size),
                _ => chunk_text(&document.text, self.config.chunk_size),
            };

            if pieces.is_empty() {
                report.push_issue(&document.source_id, "document produced no chunks");
                continue;
            }

            let total = pieces.len();
            for (index, content) in pieces.into_iter().enumerate() {
                let mut metadata = BTreeMap::from([
                    ("source".to_string(), document.source_id.clone()),
                    ("origin".to_string(), origin_label(document.origin).to_string()),
                    ("chunk_index".to_string(), index.to_string()),
                    ("total_chunks".to_string(), total.to_string()),
                ]);
                if let Some(language) = &document.language_hint {
                    metadata.insert("language".to_string(), language.clone());
                }

                chunks.push(Chunk {
                    source_id: document.source_id.clone(),
                    index,
                    content,
                    metadata,
                });
            }
        }

        report.chunks_created = chunks.len();
        if chunks.is_empty() {
            info!("nothing to ingest");
            return Ok(report);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let run = embed_all(self.embedder.as_ref(), &texts, &self.batch).await;
        report.embedding_calls = run.calls_made;
        report.zero_vector_chunks = run.zero_vectors;

        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(run.vectors)
            .map(|(chunk, vector)| EmbeddingRecord {
                vector_dim: vector.len(),
                chunk,
                vector,
            })
            .collect();

        let stored: Vec<StoredChunk> = records
            .into_iter()
            .map(|record| {
                let id = chunk_id(
                    &record.chunk.source_id,
                    record.chunk.index,
                    &record.chunk.content,
                );
                StoredChunk {
                    id,
                    document: record.chunk.content,
                    embedding: record.vector,
                    metadata: record.chunk.metadata,
                }
            })
            .collect();

        match self.store.upsert(&self.config.collection, &stored).await {
            Ok(_) => report.chunks_stored = stored.len(),
            Err(e) => {
                warn!(error = %e, "upsert failed");
                report.push_issue(&self.config.collection, e.to_string());
            }
        }

        info!(
            run = %report.run_id,
            items = report.items_collected,
            chunks = report.chunks_created,
            stored = report.chunks_stored,
            embedding_calls = report.embedding_calls,
            zero_vectors = report.zero_vector_chunks,
            issues = report.issues.len(),
            "ingestion complete"
        );

        Ok(report)
    }

    fn crawl_budget(&self) -> CrawlBudget {
        CrawlBudget {
            max_pages: self.config.max_pages,
            max_depth: self.config.max_depth,
            max_concurrent: self.config.max_concurrent,
            timeout: self.config.crawl_timeout,
            ..CrawlBudget::default()
        }
    }
}

/// Stable chunk identifier: `{source-slug}_{index}_{content-hash-prefix}`.
///
/// Re-ingesting unchanged content produces the same ids, so upserts
/// overwrite instead of duplicating.
pub fn chunk_id(source_id: &str, index: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let prefix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    format!("{}_{}_{}", slug(source_id), index, prefix)
}

/// Reduce a source id to a short filesystem/store-safe slug.
fn slug(source_id: &str) -> String {
    let mut out = String::new();
    let mut last_dash = false;
    for ch in source_id.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(60);
    if out.is_empty() {
        out.push_str("source");
    }
    out
}

fn origin_label(origin: DocumentOrigin) -> &'static str {
    match origin {
        DocumentOrigin::Web => "web",
        DocumentOrigin::CodeFile => "code_file",
        DocumentOrigin::DocFile => "doc_file",
        DocumentOrigin::Upload => "upload",
    }
}
