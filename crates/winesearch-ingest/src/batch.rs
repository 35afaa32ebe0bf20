use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use winesearch_core::error::{EmbeddingError, Retryable};
use winesearch_core::retry::{retry_with_backoff, RetryPolicy};
use winesearch_core::text::{EmbedFields, EmbeddableText};
use winesearch_core::traits::{ensure_dim, BackendAdapter, EmbeddingProvider};
use winesearch_core::types::{WineId, WineRecord};

use crate::report::FailureKind;

/// Records owned by one write attempt, unique by id.
pub(crate) struct Batch {
    pub seq: u64,
    pub records: Vec<WineRecord>,
    /// Ids of earlier copies replaced by a later record with the same id.
    pub superseded: Vec<WineId>,
}

impl Batch {
    pub fn new(seq: u64, records: Vec<WineRecord>) -> Self {
        let last: HashMap<WineId, usize> = records.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
        let mut kept = Vec::with_capacity(last.len());
        let mut superseded = Vec::new();
        for (i, record) in records.into_iter().enumerate() {
            if last.get(&record.id) == Some(&i) {
                kept.push(record);
            } else {
                superseded.push(record.id);
            }
        }
        Self { seq, records: kept, superseded }
    }

    pub fn len(&self) -> usize {
        self.records.len() + self.superseded.len()
    }
}

/// Terminal states of every record of a batch, superseded copies included.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub seq: u64,
    pub succeeded: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<(FailureKind, WineId, String)>,
    pub retries: u32,
    pub backoff: Duration,
}

/// Everything a batch task needs, shared by all tasks of a run.
pub(crate) struct BatchContext {
    pub adapter: Arc<dyn BackendAdapter>,
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub fields: EmbedFields,
    pub policy: RetryPolicy,
    pub write_timeout: Duration,
    pub embed_timeout: Duration,
}

struct EmbedState {
    vectors: Vec<Option<Vec<f32>>>,
    errors: Vec<Option<EmbeddingError>>,
    settled: Vec<bool>,
}

impl BatchContext {
    pub async fn run(&self, batch: Batch) -> BatchResult {
        let mut result = BatchResult { seq: batch.seq, ..BatchResult::default() };
        let Batch { records, superseded, .. } = batch;

        let (records, vectors) = if self.adapter.needs_embeddings() {
            let (records, vectors) = self.embed(records, &mut result).await;
            (records, Some(vectors))
        } else {
            (records, None)
        };
        if !records.is_empty() {
            self.write(&records, vectors.as_deref(), &mut result).await;
        }

        // a superseded copy ends where the written copy ended
        for id in superseded {
            match result.failures.iter().find(|(_, fid, _)| *fid == id).cloned() {
                Some((kind, _, reason)) => result.failures.push((kind, id, reason)),
                None => result.succeeded += 1,
            }
        }
        debug!(
            batch = result.seq,
            succeeded = result.succeeded,
            failed = result.failures.len(),
            retries = result.retries,
            "batch settled"
        );
        result
    }

    /// Embeds every record's text. Texts that fail transiently are retried
    /// with the rest of the batch's pending texts; records left without a
    /// vector are reported as embedding failures.
    async fn embed(&self, records: Vec<WineRecord>, result: &mut BatchResult) -> (Vec<WineRecord>, Vec<Vec<f32>>) {
        let Some(embedder) = self.embedder.clone() else {
            for r in &records {
                result.failures.push((FailureKind::Embedding, r.id, "no embedding provider configured".into()));
            }
            return (Vec::new(), Vec::new());
        };

        let texts: Vec<String> =
            records.iter().map(|r| EmbeddableText::from_record(r, &self.fields).into_string()).collect();
        let n = texts.len();
        let mut state = EmbedState { vectors: vec![None; n], errors: vec![None; n], settled: vec![false; n] };
        for (i, text) in texts.iter().enumerate() {
            if text.is_empty() {
                state.errors[i] = Some(EmbeddingError::EmptyInput);
                state.settled[i] = true;
            }
        }
        let state = Arc::new(Mutex::new(state));
        let dim = embedder.dim();

        let attempted = retry_with_backoff(&self.policy, self.embed_timeout, |attempt| {
            let state = Arc::clone(&state);
            let embedder = Arc::clone(&embedder);
            let texts = &texts;
            async move {
                let pending: Vec<usize> = {
                    let st = state.lock().await;
                    (0..texts.len()).filter(|i| !st.settled[*i]).collect()
                };
                if pending.is_empty() {
                    return Ok(());
                }
                let inputs: Vec<String> = pending.iter().map(|&i| texts[i].clone()).collect();
                let outputs = embedder.embed_many(&inputs).await?;

                let mut st = state.lock().await;
                let mut transient = pending.len().saturating_sub(outputs.len());
                for (&i, output) in pending.iter().zip(outputs) {
                    match output.and_then(|v| ensure_dim(dim, v)) {
                        Ok(v) => {
                            st.vectors[i] = Some(v);
                            st.settled[i] = true;
                        }
                        Err(e) => {
                            if e.is_transient() {
                                transient += 1;
                            } else {
                                st.settled[i] = true;
                            }
                            st.errors[i] = Some(e);
                        }
                    }
                }
                if transient > 0 {
                    debug!(attempt, transient, "texts left to embed");
                    return Err(EmbeddingError::Failed(format!("{transient} texts failed to embed")));
                }
                Ok(())
            }
        })
        .await;
        result.retries += attempted.attempts.saturating_sub(1);
        result.backoff += attempted.backoff;
        let call_error = attempted.result.err();

        let mut st = state.lock().await;
        let vectors = std::mem::take(&mut st.vectors);
        let errors = std::mem::take(&mut st.errors);
        let mut kept_records = Vec::with_capacity(n);
        let mut kept_vectors = Vec::with_capacity(n);
        for ((record, vector), error) in records.into_iter().zip(vectors).zip(errors) {
            match vector {
                Some(v) => {
                    kept_records.push(record);
                    kept_vectors.push(v);
                }
                None => {
                    let reason = error
                        .or_else(|| call_error.clone())
                        .map_or_else(|| "not embedded".to_string(), |e| e.to_string());
                    result.failures.push((FailureKind::Embedding, record.id, reason));
                }
            }
        }
        (kept_records, kept_vectors)
    }

    async fn write(&self, records: &[WineRecord], vectors: Option<&[Vec<f32>]>, result: &mut BatchResult) {
        let adapter = &self.adapter;
        let attempted = retry_with_backoff(&self.policy, self.write_timeout, |attempt| {
            debug!(attempt, records = records.len(), "writing batch");
            adapter.write_batch(records, vectors)
        })
        .await;
        result.retries += attempted.attempts.saturating_sub(1);
        result.backoff += attempted.backoff;

        match attempted.result {
            Ok(outcome) => {
                let failed: HashSet<WineId> = outcome.failed.iter().map(|f| f.id).collect();
                result.inserted += outcome.inserted;
                result.updated += outcome.updated;
                result.succeeded += records.iter().filter(|r| !failed.contains(&r.id)).count();
                for f in outcome.failed {
                    result.failures.push((FailureKind::Write, f.id, f.reason));
                }
            }
            Err(e) => {
                let kind = if attempted.exhausted { FailureKind::RetriesExhausted } else { FailureKind::Write };
                warn!(
                    backend = %adapter.kind(),
                    records = records.len(),
                    attempts = attempted.attempts,
                    error = %e,
                    "batch write failed"
                );
                for r in records {
                    result.failures.push((kind, r.id, e.to_string()));
                }
            }
        }
    }
}
