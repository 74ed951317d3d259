//! Hierarchical document summarization.
//!
//! Chunks are summarized in batches of 25, then the batch summaries are
//! merged into one final summary. When a document yields more than 10
//! batch summaries, the merge runs in two stages (halves first) to keep
//! each prompt within model limits. A 500-chunk document costs roughly
//! 22-23 completion calls.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use ragforge_shared::{RagForgeError, Result};

/// Chunks summarized per completion call.
pub const CHUNKS_PER_BATCH: usize = 25;

/// Batch-summary count above which the final merge runs in two stages.
const MERGE_THRESHOLD: usize = 10;

/// Separator between chunks and between summaries inside a prompt.
const SEPARATOR: &str = "\n\n---\n\n";

const BATCH_SUMMARY_MAX_TOKENS: u32 = 500;
const FINAL_SUMMARY_MAX_TOKENS: u32 = 1000;

/// The text-completion capability seam.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a prompt, returning the generated text.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Result of a hierarchical summarization run.
#[derive(Debug)]
pub struct Summary {
    pub text: String,
    pub chunks_processed: usize,
    /// Completion calls made, including merge stages.
    pub llm_calls: usize,
}

/// Summarize a document's chunks hierarchically.
///
/// Individual batch failures are logged and skipped; the run only fails
/// if no batch produced a summary at all.
#[instrument(skip_all, fields(document = %document_name, chunks = chunks.len()))]
pub async fn summarize_chunks(
    provider: &dyn CompletionProvider,
    document_name: &str,
    chunks: &[String],
) -> Result<Summary> {
    if chunks.is_empty() {
        return Err(RagForgeError::validation("no chunks to summarize"));
    }

    let total_batches = chunks.len().div_ceil(CHUNKS_PER_BATCH);
    let mut batch_summaries: Vec<String> = Vec::new();
    let mut llm_calls = 0;

    for (batch_num, batch) in chunks.chunks(CHUNKS_PER_BATCH).enumerate() {
        let prompt = batch_prompt(&batch.join(SEPARATOR), batch_num + 1, total_batches);
        llm_calls += 1;
        match provider.complete(&prompt, BATCH_SUMMARY_MAX_TOKENS).await {
            Ok(summary) if !summary.trim().is_empty() => batch_summaries.push(summary),
            Ok(_) => warn!(batch = batch_num + 1, "empty batch summary, skipping"),
            Err(e) => warn!(batch = batch_num + 1, error = %e, "batch summary failed, skipping"),
        }
    }

    if batch_summaries.is_empty() {
        return Err(RagForgeError::Completion(
            "every batch summary failed".into(),
        ));
    }

    let combined = if batch_summaries.len() > MERGE_THRESHOLD {
        // Two-stage merge: halve the summaries, condense each half, then
        // feed both condensed halves to the final pass.
        let mid = batch_summaries.len() / 2;
        let first = provider
            .complete(
                &batch_prompt(&batch_summaries[..mid].join(SEPARATOR), 1, 2),
                BATCH_SUMMARY_MAX_TOKENS,
            )
            .await?;
        let second = provider
            .complete(
                &batch_prompt(&batch_summaries[mid..].join(SEPARATOR), 2, 2),
                BATCH_SUMMARY_MAX_TOKENS,
            )
            .await?;
        llm_calls += 2;
        format!("{first}{SEPARATOR}{second}")
    } else {
        batch_summaries.join(SEPARATOR)
    };

    let text = provider
        .complete(
            &final_prompt(&combined, document_name),
            FINAL_SUMMARY_MAX_TOKENS,
        )
        .await?;
    llm_calls += 1;

    info!(
        batches = batch_summaries.len(),
        llm_calls, "summarization complete"
    );

    Ok(Summary {
        text,
        chunks_processed: chunks.len(),
        llm_calls,
    })
}

fn batch_prompt(content: &str, batch_num: usize, total_batches: usize) -> String {
    format!(
        "Summarize the following content from a document. This is part {batch_num} of \
         {total_batches}.\n\nFocus on key concepts, important details, and technical \
         information.\n\nContent:\n{content}\n\nSummary:"
    )
}

fn final_prompt(combined: &str, document_name: &str) -> String {
    format!(
        "Write a comprehensive summary of the document \"{document_name}\" from the \
         following section summaries. Cover the main ideas, structure, and any \
         technical details worth keeping.\n\nSection summaries:\n{combined}\n\n\
         Final summary:"
    )
}

// ---------------------------------------------------------------------------
// OpenAI-compatible completions client
// ---------------------------------------------------------------------------

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompletions {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiCompletions {
    pub fn new(api_key: &str, base_url: &str, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(RagForgeError::config("completion API key is empty"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| RagForgeError::config("completion API key contains invalid bytes"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| RagForgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagForgeError::Network(format!("completion request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagForgeError::Completion(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagForgeError::Completion(format!("malformed response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagForgeError::Completion("response contained no choices".into()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
