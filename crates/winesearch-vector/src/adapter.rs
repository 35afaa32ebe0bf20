use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use winesearch_core::error::BackendError;
use winesearch_core::query::{Aggregation, PlannedMode, QueryPlan, RawHit, RawResults, SortBy};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::{
    AggregationResult, BackendKind, Capabilities, Capability, RecordFailure, SchemaStatus, WineRecord, WriteOutcome,
};

use crate::collection::{Collection, CollectionConfig};
use crate::filter::to_filter;

/// Vector backend. The collection is created by `ensure_schema` with the
/// configured dimension; writes before that are refused.
pub struct VectorAdapter {
    config: CollectionConfig,
    collection: RwLock<Option<Collection>>,
}

impl VectorAdapter {
    pub fn new(name: &str, dim: usize) -> Self {
        Self::with_config(CollectionConfig::new(name, dim))
    }

    pub fn with_config(config: CollectionConfig) -> Self {
        Self { config, collection: RwLock::new(None) }
    }

    pub async fn point_count(&self) -> usize {
        self.collection.read().await.as_ref().map_or(0, Collection::len)
    }
}

fn missing() -> BackendError {
    BackendError::permanent("collection missing; call ensure_schema first")
}

fn hit(record: &WineRecord, score: Option<f32>) -> RawHit {
    let fields = match record.to_raw() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    RawHit { fields, score }
}

fn page<T>(items: Vec<T>, plan: &QueryPlan) -> impl Iterator<Item = T> {
    items.into_iter().skip(plan.offset).take(plan.limit)
}

#[async_trait]
impl BackendAdapter for VectorAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[
            Capability::Filter,
            Capability::VectorSimilarity,
            Capability::Hybrid,
            Capability::Count,
            Capability::Sort,
            Capability::NativePaging,
        ])
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus, BackendError> {
        let mut slot = self.collection.write().await;
        if slot.is_some() {
            return Ok(SchemaStatus::AlreadyPresent);
        }
        *slot = Some(Collection::new(self.config.clone()));
        info!(
            collection = %self.config.name,
            size = self.config.size,
            payload_indexes = self.config.payload_indexes.len(),
            "vector collection created"
        );
        Ok(SchemaStatus::Created)
    }

    async fn write_batch(
        &self,
        records: &[WineRecord],
        embeddings: Option<&[Vec<f32>]>,
    ) -> Result<WriteOutcome, BackendError> {
        let Some(embeddings) = embeddings else {
            return Err(BackendError::permanent("every point needs a vector"));
        };
        if embeddings.len() != records.len() {
            return Err(BackendError::permanent(format!(
                "{} records but {} vectors",
                records.len(),
                embeddings.len()
            )));
        }
        let mut slot = self.collection.write().await;
        let collection = slot.as_mut().ok_or_else(missing)?;
        let mut outcome = WriteOutcome::default();
        for (record, vector) in records.iter().zip(embeddings) {
            match collection.upsert(record.clone(), vector.clone()) {
                Ok(true) => outcome.updated += 1,
                Ok(false) => outcome.inserted += 1,
                Err(reason) => outcome.failed.push(RecordFailure { id: record.id, reason }),
            }
        }
        debug!(collection = %self.config.name, points = collection.len(), "points upserted");
        Ok(outcome)
    }

    async fn query(&self, plan: &QueryPlan) -> Result<RawResults, BackendError> {
        let slot = self.collection.read().await;
        let collection = slot.as_ref().ok_or_else(missing)?;
        match plan.aggregation {
            Some(Aggregation::Count) => {
                let count = collection.count(&plan.filters) as u64;
                return Ok(RawResults { hits: vec![], aggregation: Some(AggregationResult::Count(count)) });
            }
            Some(Aggregation::CountBy(_)) => {
                return Err(BackendError::permanent("grouped counts are not available on the vector store"));
            }
            None => {}
        }

        let hits: Vec<RawHit> = match plan.mode {
            PlannedMode::Semantic | PlannedMode::Hybrid { .. } => {
                let vector = plan.vector.as_deref().ok_or_else(|| BackendError::permanent("query vector missing"))?;
                let hybrid = match plan.mode {
                    PlannedMode::Hybrid { alpha } => Some((plan.text.as_deref().unwrap_or(""), alpha)),
                    _ => None,
                };
                let scored = collection.search(vector, &plan.filters, hybrid).map_err(BackendError::permanent)?;
                page(scored, plan).map(|(r, s)| hit(r, Some(s))).collect()
            }
            PlannedMode::FilterOnly => {
                let mut records = collection.scroll(&plan.filters);
                if plan.sort == SortBy::PointsDesc {
                    records.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.id.cmp(&b.id)));
                }
                page(records, plan).map(|r| hit(r, None)).collect()
            }
            PlannedMode::FullText => {
                return Err(BackendError::permanent("the vector store has no full-text ranking"));
            }
        };
        debug!(collection = %self.config.name, hits = hits.len(), "vector query");
        Ok(RawResults { hits, aggregation: None })
    }

    fn explain(&self, plan: &QueryPlan) -> Result<String, BackendError> {
        let filter = to_filter(&plan.filters);
        let body = match (plan.aggregation, plan.mode) {
            (Some(_), _) => json!({ "count": { "collection_name": self.config.name, "filter": filter, "exact": true } }),
            (None, PlannedMode::FilterOnly) => {
                let mut scroll = json!({
                    "collection_name": self.config.name,
                    "filter": filter,
                    "offset": plan.offset,
                    "limit": plan.limit,
                    "with_payload": true,
                });
                if plan.sort == SortBy::PointsDesc {
                    scroll["order_by"] = json!({ "key": "points", "direction": "desc" });
                }
                json!({ "scroll": scroll })
            }
            (None, mode) => {
                let mut search = json!({
                    "collection_name": self.config.name,
                    "vector": { "size": self.config.size, "distance": self.config.distance },
                    "filter": filter,
                    "offset": plan.offset,
                    "limit": plan.limit,
                    "with_payload": true,
                });
                if let PlannedMode::Hybrid { alpha } = mode {
                    search["fusion"] = json!({ "alpha": alpha, "text": plan.text });
                }
                json!({ "search": search })
            }
        };
        serde_json::to_string_pretty(&body).map_err(BackendError::permanent)
    }
}
