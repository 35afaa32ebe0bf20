use async_trait::async_trait;
use serde_json::{json, Value};
use tantivy::TantivyError;
use tokio::sync::RwLock;
use tracing::{debug, info};

use winesearch_core::error::BackendError;
use winesearch_core::query::{FilterField, PlannedMode, QueryPlan, RawHit, RawResults, SortBy, TextMatch};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::{BackendKind, Capabilities, Capability, SchemaStatus, WineRecord, WriteOutcome};

use crate::filter::filter_expression;
use crate::index::KeywordIndex;
use crate::settings::IndexSettings;

const INDEX_UID: &str = "wines";

/// Fast keyword backend. No aggregations: counts and facet distributions are
/// outside what this engine answers.
pub struct KeywordAdapter {
    settings: IndexSettings,
    index: RwLock<Option<KeywordIndex>>,
}

impl Default for KeywordAdapter {
    fn default() -> Self {
        Self::new(IndexSettings::default())
    }
}

impl KeywordAdapter {
    pub fn new(settings: IndexSettings) -> Self {
        Self { settings, index: RwLock::new(None) }
    }

    pub async fn document_count(&self) -> usize {
        self.index.read().await.as_ref().map_or(0, KeywordIndex::len)
    }

    fn check(&self, plan: &QueryPlan) -> Result<(), BackendError> {
        if plan.aggregation.is_some() {
            return Err(BackendError::permanent("the keyword index does not aggregate"));
        }
        if matches!(plan.mode, PlannedMode::Semantic | PlannedMode::Hybrid { .. }) {
            return Err(BackendError::permanent("the keyword index has no vectors"));
        }
        if let Some(clause) = plan.filters.iter().find(|c| !self.settings.is_filterable(c.field)) {
            return Err(BackendError::permanent(format!("attribute `{}` is not filterable", clause.field)));
        }
        if plan.sort == SortBy::PointsDesc && !self.settings.is_sortable(FilterField::Points) {
            return Err(BackendError::permanent("attribute `points` is not sortable"));
        }
        Ok(())
    }
}

fn not_configured() -> BackendError {
    BackendError::permanent("index settings missing; call ensure_schema first")
}

fn classify(e: TantivyError) -> BackendError {
    match e {
        TantivyError::IoError(_) | TantivyError::LockFailure(..) => BackendError::transient(e),
        other => BackendError::permanent(other),
    }
}

fn hit(record: &WineRecord, score: Option<f32>) -> RawHit {
    let fields = match record.to_raw() {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    RawHit { fields, score }
}

#[async_trait]
impl BackendAdapter for KeywordAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::FastKeyword
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::FullText, Capability::Filter, Capability::Sort, Capability::NativePaging])
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus, BackendError> {
        let mut slot = self.index.write().await;
        if slot.is_some() {
            return Ok(SchemaStatus::AlreadyPresent);
        }
        let settings = serde_json::to_string(&self.settings).map_err(BackendError::permanent)?;
        *slot = Some(KeywordIndex::new(self.settings.clone()).map_err(classify)?);
        info!(index = INDEX_UID, %settings, "keyword index settings applied");
        Ok(SchemaStatus::Created)
    }

    async fn write_batch(
        &self,
        records: &[WineRecord],
        _embeddings: Option<&[Vec<f32>]>,
    ) -> Result<WriteOutcome, BackendError> {
        let mut slot = self.index.write().await;
        let index = slot.as_mut().ok_or_else(not_configured)?;
        let (inserted, updated) = index.upsert_all(records).map_err(classify)?;
        let outcome = WriteOutcome { inserted, updated, ..WriteOutcome::default() };
        debug!(index = INDEX_UID, documents = index.len(), "documents updated");
        Ok(outcome)
    }

    async fn query(&self, plan: &QueryPlan) -> Result<RawResults, BackendError> {
        self.check(plan)?;
        let slot = self.index.read().await;
        let index = slot.as_ref().ok_or_else(not_configured)?;
        let text = plan.text.as_deref().filter(|_| plan.mode == PlannedMode::FullText).unwrap_or("");
        let mut matched: Vec<(&WineRecord, Option<f32>)> = index
            .search(text)
            .map_err(classify)?
            .into_iter()
            .filter(|(r, _)| plan.filters.iter().all(|c| c.matches_with(r, TextMatch::IgnoreCase)))
            .collect();

        let score_of = |s: Option<f32>| s.unwrap_or(0.0);
        // Equal sort keys fall back to ascending id so pages never overlap.
        matched.sort_by(|(a, sa), (b, sb)| {
            let primary = match plan.sort {
                SortBy::PointsDesc => b.points.cmp(&a.points),
                SortBy::Relevance => score_of(*sb).total_cmp(&score_of(*sa)),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let hits: Vec<RawHit> =
            matched.into_iter().skip(plan.offset).take(plan.limit).map(|(r, s)| hit(r, s)).collect();
        debug!(index = INDEX_UID, hits = hits.len(), "keyword search");
        Ok(RawResults { hits, aggregation: None })
    }

    fn explain(&self, plan: &QueryPlan) -> Result<String, BackendError> {
        self.check(plan)?;
        let mut body = json!({
            "indexUid": INDEX_UID,
            "q": plan.text.as_deref().unwrap_or(""),
            "offset": plan.offset,
            "limit": plan.limit,
        });
        if let Some(filter) = filter_expression(&plan.filters) {
            body["filter"] = Value::from(filter);
        }
        if plan.sort == SortBy::PointsDesc {
            body["sort"] = json!(["points:desc"]);
        }
        serde_json::to_string_pretty(&body).map_err(BackendError::permanent)
    }
}
