use async_trait::async_trait;

use crate::error::{BackendError, EmbeddingError};
use crate::query::{QueryPlan, RawResults};
use crate::types::{BackendKind, Capabilities, SchemaStatus, WineRecord, WriteOutcome};

/// Turns text into fixed-length vectors.
///
/// `embed_many` returns one result per input, in input order; a failure for
/// one input does not fail the others. The outer error is for failures that
/// affect the whole call (model not loaded, timeout).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_many(
        &self,
        texts: &[String],
    ) -> Result<Vec<Result<Vec<f32>, EmbeddingError>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await);
        }
        Ok(out)
    }
}

/// One storage engine behind a uniform ingestion and query surface.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn capabilities(&self) -> Capabilities;

    /// Creates collections, indexes and constraints. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<SchemaStatus, BackendError>;

    /// Upserts by id. `embeddings`, when given, is aligned with `records`.
    async fn write_batch(
        &self,
        records: &[WineRecord],
        embeddings: Option<&[Vec<f32>]>,
    ) -> Result<WriteOutcome, BackendError>;

    async fn query(&self, plan: &QueryPlan) -> Result<RawResults, BackendError>;

    /// Native rendering of a plan (Cypher, a filter string, a where-clause...).
    fn explain(&self, plan: &QueryPlan) -> Result<String, BackendError>;

    /// Whether `write_batch` needs embeddings.
    fn needs_embeddings(&self) -> bool {
        self.capabilities().supports(crate::types::Capability::VectorSimilarity)
    }
}

/// Rejects vectors whose length differs from the provider's declared `dim`.
pub fn ensure_dim(expected: usize, vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    if vector.len() == expected {
        Ok(vector)
    } else {
        Err(EmbeddingError::DimensionMismatch { expected, actual: vector.len() })
    }
}
