//! Token-aware embedding batch engine with tiered fallback.
//!
//! Batches are formed by item count AND estimated token budget, then each
//! batch runs through three escalating tiers:
//!
//! 1. whole-batch call with retry + exponential backoff (token-limit
//!    errors skip straight to tier 2 without consuming a retry)
//! 2. re-split under a tighter token ceiling and re-run tier 1 per
//!    sub-batch (a sub-batch that still trips the token limit goes
//!    item-by-item)
//! 3. quarter the batch, one call per quarter, then item-by-item, then
//!    the zero-vector sentinel
//!
//! Positional indices are tracked through every split, so results always
//! come back in input order no matter which tier resolved them.

use std::time::Duration;

use tracing::{debug, info, warn};

use ragforge_chunking::estimate_tokens;
use ragforge_shared::{RagForgeError, Result};

use crate::provider::EmbeddingProvider;

/// Limits and retry policy for one [`embed_all`] run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum texts per provider call.
    pub max_items_per_call: usize,
    /// Maximum estimated tokens per provider call.
    pub max_tokens_per_call: usize,
    /// Tighter token ceiling used when re-splitting after a token-limit error.
    pub retry_token_ceiling: usize,
    /// Retry attempts per batch before escalating to tier 3.
    pub max_retries: usize,
    /// Initial backoff delay; doubles each retry.
    pub base_backoff: Duration,
    /// Pause between successive top-level batches (rate-limit hygiene).
    pub inter_batch_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_items_per_call: 2048,
            max_tokens_per_call: 7000,
            retry_token_ceiling: 6000,
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            inter_batch_delay: Duration::from_millis(100),
        }
    }
}

/// Outcome of one batch call attempt cycle. Explicit so each tier's
/// contract is testable in isolation.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Provider returned one vector per input.
    Success(Vec<Vec<f32>>),
    /// Provider reported a token/context-length limit; re-split, don't retry.
    TokenLimit,
    /// Retries exhausted on a non-token-limit error.
    Failed,
}

/// Result of an [`embed_all`] run.
#[derive(Debug)]
pub struct EmbedRun {
    /// One vector per input text, in input order. Entries that failed
    /// every tier are the zero-vector sentinel.
    pub vectors: Vec<Vec<f32>>,
    /// Provider calls made across all tiers.
    pub calls_made: usize,
    /// Inputs that fell back to the zero-vector sentinel.
    pub zero_vectors: usize,
}

/// Embed every text in `texts`, in order, never failing.
///
/// The returned vectors have the same length and order as the input for
/// any mix of provider successes and failures; inputs nothing could embed
/// yield a zero vector of `provider.dimension()` length.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    opts: &BatchOptions,
) -> EmbedRun {
    let mut engine = Engine {
        provider,
        opts,
        texts,
        slots: vec![None; texts.len()],
        calls_made: 0,
        zero_vectors: 0,
    };

    for (batch_num, batch) in form_batches(texts, opts).into_iter().enumerate() {
        if batch_num > 0 && !opts.inter_batch_delay.is_zero() {
            tokio::time::sleep(opts.inter_batch_delay).await;
        }
        debug!(batch = batch_num + 1, items = batch.len(), "processing embedding batch");
        engine.process_batch(&batch).await;
    }

    let dim = provider.dimension();
    let mut zero_vectors = engine.zero_vectors;
    let vectors = engine
        .slots
        .into_iter()
        .map(|slot| {
            // Every index is routed through exactly one tier, so slots are
            // always filled; this is a second line of defense only.
            slot.unwrap_or_else(|| {
                zero_vectors += 1;
                vec![0.0; dim]
            })
        })
        .collect::<Vec<_>>();

    info!(
        texts = texts.len(),
        calls = engine.calls_made,
        zero_vectors,
        "embedding run complete"
    );

    EmbedRun {
        vectors,
        calls_made: engine.calls_made,
        zero_vectors,
    }
}

// ---------------------------------------------------------------------------
// Batch formation
// ---------------------------------------------------------------------------

/// Group input indices into batches bounded by item count and token budget.
///
/// A single item whose estimated tokens alone exceed the budget is forced
/// into its own batch — the only case where a batch may exceed the ceiling.
fn form_batches(texts: &[String], opts: &BatchOptions) -> Vec<Vec<usize>> {
    split_by_budget(
        &(0..texts.len()).collect::<Vec<_>>(),
        texts,
        opts.max_items_per_call,
        opts.max_tokens_per_call,
    )
}

/// Split `indices` into runs whose item count and summed token estimate
/// stay within the given ceilings.
fn split_by_budget(
    indices: &[usize],
    texts: &[String],
    max_items: usize,
    max_tokens: usize,
) -> Vec<Vec<usize>> {
    let mut batches = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_tokens = 0;

    for &i in indices {
        let tokens = estimate_tokens(&texts[i]);
        let over_count = current.len() >= max_items;
        let over_tokens = current_tokens + tokens > max_tokens;

        if (over_count || over_tokens) && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }

        current.push(i);
        current_tokens += tokens;
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

// ---------------------------------------------------------------------------
// Tiered execution
// ---------------------------------------------------------------------------

struct Engine<'a> {
    provider: &'a dyn EmbeddingProvider,
    opts: &'a BatchOptions,
    texts: &'a [String],
    /// Written once per index by whichever tier resolves it.
    slots: Vec<Option<Vec<f32>>>,
    calls_made: usize,
    zero_vectors: usize,
}

impl Engine<'_> {
    /// Tier 1 entry: run a batch through retry, escalating on failure.
    async fn process_batch(&mut self, indices: &[usize]) {
        match self.try_batch_with_retry(indices).await {
            BatchOutcome::Success(vectors) => self.write(indices, vectors),
            BatchOutcome::TokenLimit => {
                warn!(
                    items = indices.len(),
                    "token limit exceeded, re-splitting batch by token count"
                );
                self.resplit_by_tokens(indices).await;
            }
            BatchOutcome::Failed => {
                warn!(
                    items = indices.len(),
                    "batch failed after retries, falling back to smaller calls"
                );
                self.fallback_quarters(indices).await;
            }
        }
    }

    /// One retry cycle for a batch: up to `max_retries` attempts with
    /// exponential backoff. Token-limit errors short-circuit immediately.
    async fn try_batch_with_retry(&mut self, indices: &[usize]) -> BatchOutcome {
        let batch = self.collect_texts(indices);
        let mut delay = self.opts.base_backoff;

        for attempt in 0..self.opts.max_retries {
            match self.call(&batch).await {
                Ok(vectors) => return BatchOutcome::Success(vectors),
                Err(e) if e.is_token_limit() => return BatchOutcome::TokenLimit,
                Err(e) => {
                    if attempt + 1 < self.opts.max_retries {
                        warn!(
                            attempt = attempt + 1,
                            max = self.opts.max_retries,
                            error = %e,
                            "embedding batch failed, retrying"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        delay *= 2;
                    } else {
                        warn!(error = %e, "embedding batch failed after final attempt");
                    }
                }
            }
        }

        BatchOutcome::Failed
    }

    /// Tier 2: re-split under the tighter ceiling and re-run tier 1 per
    /// sub-batch. A sub-batch that still reports a token limit goes
    /// straight to item-by-item calls, which guarantees termination.
    async fn resplit_by_tokens(&mut self, indices: &[usize]) {
        let sub_batches = split_by_budget(
            indices,
            self.texts,
            self.opts.max_items_per_call,
            self.opts.retry_token_ceiling,
        );

        for sub in sub_batches {
            match self.try_batch_with_retry(&sub).await {
                BatchOutcome::Success(vectors) => self.write(&sub, vectors),
                BatchOutcome::TokenLimit => {
                    warn!(
                        items = sub.len(),
                        "sub-batch still over token limit, embedding item by item"
                    );
                    self.fallback_individual(&sub).await;
                }
                BatchOutcome::Failed => self.fallback_quarters(&sub).await,
            }
        }
    }

    /// Tier 3: quarter the batch, one unretried call per quarter; failed
    /// quarters go item by item.
    async fn fallback_quarters(&mut self, indices: &[usize]) {
        let quarter = (indices.len() / 4).max(1);

        for sub in indices.chunks(quarter) {
            let batch = self.collect_texts(sub);
            match self.call(&batch).await {
                Ok(vectors) => self.write(sub, vectors),
                Err(e) => {
                    warn!(items = sub.len(), error = %e, "quarter failed, trying items individually");
                    self.fallback_individual(sub).await;
                }
            }
        }
    }

    /// Last resort: one call per item; a failing item gets the sentinel.
    async fn fallback_individual(&mut self, indices: &[usize]) {
        for &i in indices {
            let single = vec![self.texts[i].clone()];
            match self.call(&single).await {
                Ok(mut vectors) if !vectors.is_empty() => {
                    self.slots[i] = Some(vectors.swap_remove(0));
                }
                Ok(_) => {
                    warn!(index = i, "provider returned no vector for single item");
                    self.write_sentinel(i);
                }
                Err(e) => {
                    warn!(index = i, error = %e, "item failed every tier, using zero vector");
                    self.write_sentinel(i);
                }
            }
        }
    }

    async fn call(&mut self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls_made += 1;
        let vectors = self.provider.embed(batch).await?;
        if vectors.len() != batch.len() {
            return Err(RagForgeError::Embedding(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }
        Ok(vectors)
    }

    fn collect_texts(&self, indices: &[usize]) -> Vec<String> {
        indices.iter().map(|&i| self.texts[i].clone()).collect()
    }

    fn write(&mut self, indices: &[usize], vectors: Vec<Vec<f32>>) {
        debug_assert_eq!(indices.len(), vectors.len());
        for (&i, v) in indices.iter().zip(vectors) {
            debug_assert!(self.slots[i].is_none(), "slot {i} written twice");
            self.slots[i] = Some(v);
        }
    }

    fn write_sentinel(&mut self, index: usize) {
        self.slots[index] = Some(vec![0.0; self.provider.dimension()]);
        self.zero_vectors += 1;
    }
}
