use async_trait::async_trait;
use lancedb::{Connection, Table};
use serde_json::json;
use tracing::{debug, info};

use winesearch_core::error::BackendError;
use winesearch_core::query::{Aggregation, PlannedMode, QueryPlan, RawResults};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::{
    AggregationResult, BackendKind, Capabilities, Capability, RecordFailure, SchemaStatus, WineRecord, WriteOutcome,
};

use crate::filter::where_clause;
use crate::index_build::{build_ivfpq_index, compute_ivfpq_params, MIN_ROWS_FOR_INDEX};
use crate::schema::{build_arrow_schema, TABLE_NAME};
use crate::search::{nearest, scan, NUM_PROBES};
use crate::table::{ensure_table, open_db};
use crate::writer::{records_to_batch, upsert};

/// Columnar-vector backend on a LanceDB table.
pub struct LanceAdapter {
    db: Connection,
    table_name: String,
    dim: usize,
}

fn transient(e: impl std::fmt::Display) -> BackendError {
    BackendError::transient(e)
}

impl LanceAdapter {
    pub async fn connect(uri: &str, dim: usize) -> anyhow::Result<Self> {
        let db = open_db(uri).await?;
        Ok(Self { db, table_name: TABLE_NAME.to_string(), dim })
    }

    async fn table(&self) -> Result<Table, BackendError> {
        self.db.open_table(&self.table_name).execute().await.map_err(|e| match e {
            lancedb::Error::TableNotFound { .. } => {
                BackendError::permanent("table missing; call ensure_schema first")
            }
            other => transient(other),
        })
    }

    /// Builds the IVF_PQ index once the table is large enough. Returns whether
    /// an index was built.
    pub async fn build_vector_index(&self) -> Result<bool, BackendError> {
        let table = self.table().await?;
        let rows = table.count_rows(None).await.map_err(transient)?;
        if rows < MIN_ROWS_FOR_INDEX {
            debug!(rows, "too few rows for an IVF_PQ index");
            return Ok(false);
        }
        let params = compute_ivfpq_params(rows, self.dim);
        build_ivfpq_index(&table, "vector_idx", &params).await.map_err(transient)?;
        Ok(true)
    }
}

#[async_trait]
impl BackendAdapter for LanceAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::ColumnarVector
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::Filter, Capability::VectorSimilarity, Capability::Count, Capability::NativePaging])
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus, BackendError> {
        let status = ensure_table(&self.db, &self.table_name, build_arrow_schema(self.dim as i32))
            .await
            .map_err(transient)?;
        info!(table = %self.table_name, ?status, "lance table ready");
        Ok(status)
    }

    async fn write_batch(
        &self,
        records: &[WineRecord],
        embeddings: Option<&[Vec<f32>]>,
    ) -> Result<WriteOutcome, BackendError> {
        let Some(embeddings) = embeddings else {
            return Err(BackendError::permanent("the columnar store needs a vector for every record"));
        };
        if embeddings.len() != records.len() {
            return Err(BackendError::permanent(format!(
                "{} records but {} vectors",
                records.len(),
                embeddings.len()
            )));
        }

        let mut outcome = WriteOutcome::default();
        let mut keep_records = Vec::with_capacity(records.len());
        let mut keep_vectors = Vec::with_capacity(records.len());
        for (record, vector) in records.iter().zip(embeddings) {
            if vector.len() == self.dim {
                keep_records.push(record.clone());
                keep_vectors.push(vector.clone());
            } else {
                outcome.failed.push(RecordFailure {
                    id: record.id,
                    reason: format!("vector has {} dimensions, expected {}", vector.len(), self.dim),
                });
            }
        }
        if keep_records.is_empty() {
            return Ok(outcome);
        }

        let batch = records_to_batch(&keep_records, &keep_vectors, self.dim as i32).map_err(BackendError::permanent)?;
        let table = self.table().await?;
        let counts = upsert(&table, batch).await.map_err(transient)?;
        outcome.inserted = counts.inserted;
        outcome.updated = counts.updated;
        Ok(outcome)
    }

    async fn query(&self, plan: &QueryPlan) -> Result<RawResults, BackendError> {
        let table = self.table().await?;
        let filter = where_clause(&plan.filters);
        match plan.aggregation {
            Some(Aggregation::Count) => {
                let count = table.count_rows(filter).await.map_err(transient)?;
                return Ok(RawResults { hits: vec![], aggregation: Some(AggregationResult::Count(count as u64)) });
            }
            Some(Aggregation::CountBy(_)) => {
                return Err(BackendError::permanent("grouped counts are not available on the columnar store"));
            }
            None => {}
        }
        let hits = match (plan.mode, plan.vector.as_ref()) {
            (PlannedMode::Semantic, Some(vector)) => {
                nearest(&table, vector.clone(), filter, plan.limit, plan.offset).await.map_err(transient)?
            }
            (PlannedMode::FilterOnly, _) => scan(&table, filter, plan.limit, plan.offset).await.map_err(transient)?,
            (PlannedMode::Semantic, None) => return Err(BackendError::permanent("semantic query without a vector")),
            (PlannedMode::FullText | PlannedMode::Hybrid { .. }, _) => {
                return Err(BackendError::permanent("only vector and filter queries run on the columnar store"));
            }
        };
        debug!(hits = hits.len(), "lance query");
        Ok(RawResults { hits, aggregation: None })
    }

    fn explain(&self, plan: &QueryPlan) -> Result<String, BackendError> {
        let filter = where_clause(&plan.filters);
        let native = match (plan.aggregation, plan.mode) {
            (Some(_), _) => json!({ "count_rows": { "table": self.table_name, "filter": filter } }),
            (None, PlannedMode::Semantic) => json!({
                "vector_search": {
                    "table": self.table_name,
                    "column": "vector",
                    "metric": "cosine",
                    "nprobes": NUM_PROBES,
                    "where": filter,
                    "limit": plan.limit,
                    "offset": plan.offset,
                }
            }),
            (None, _) => json!({
                "query": { "table": self.table_name, "where": filter, "limit": plan.limit, "offset": plan.offset }
            }),
        };
        serde_json::to_string_pretty(&native).map_err(BackendError::permanent)
    }
}
