use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use winesearch_core::error::BackendError;
use winesearch_core::query::{Aggregation, GroupField, PlannedMode, QueryPlan, RawHit, RawResults, SortBy, TextMatch};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::{
    AggregationResult, BackendKind, Capabilities, Capability, GroupCount, SchemaStatus, WineRecord, WriteOutcome,
};

use crate::cypher::{render, MERGE_WINES, SCHEMA_STATEMENTS};
use crate::store::{GraphStats, GraphStore};

/// Graph backend held in process. Country, province and taster comparisons
/// ignore case, as the Cypher rendering does with `tolower`.
#[derive(Default)]
pub struct GraphAdapter {
    store: RwLock<GraphStore>,
    schema_ready: AtomicBool,
}

impl GraphAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> GraphStats {
        self.store.read().await.stats()
    }
}

fn hit(record: &WineRecord, score: Option<f32>) -> RawHit {
    let mut fields = Map::new();
    fields.insert("wineID".into(), Value::from(record.id));
    fields.insert("countryName".into(), Value::from(record.country.as_str()));
    fields.insert("provinceName".into(), record.province.as_deref().map_or(Value::Null, Value::from));
    fields.insert("title".into(), Value::from(record.title.as_str()));
    fields.insert("description".into(), record.description.as_deref().map_or(Value::Null, Value::from));
    fields.insert("variety".into(), Value::from(record.variety.as_str()));
    fields.insert("winery".into(), Value::from(record.winery.as_str()));
    fields.insert("points".into(), Value::from(record.points));
    fields.insert("price".into(), record.price.map_or_else(|| Value::from("Not available"), Value::from));
    RawHit { fields, score }
}

fn group_counts(matched: &[(WineRecord, Option<f32>)], plan: &QueryPlan, group: GroupField) -> Vec<GroupCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for (record, _) in matched {
        if let Some(key) = group.key_of(record) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    let mut groups: Vec<GroupCount> =
        counts.into_iter().map(|(key, count)| GroupCount { key: key.to_string(), count }).collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    groups.truncate(plan.limit);
    groups
}

#[async_trait]
impl BackendAdapter for GraphAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[
            Capability::FullText,
            Capability::Filter,
            Capability::Count,
            Capability::GroupCount,
            Capability::Sort,
            Capability::NativePaging,
        ])
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus, BackendError> {
        if self.schema_ready.swap(true, Ordering::SeqCst) {
            return Ok(SchemaStatus::AlreadyPresent);
        }
        for statement in SCHEMA_STATEMENTS {
            debug!(statement, "graph schema");
        }
        info!(constraints = SCHEMA_STATEMENTS.len(), "graph schema ready");
        Ok(SchemaStatus::Created)
    }

    async fn write_batch(
        &self,
        records: &[WineRecord],
        _embeddings: Option<&[Vec<f32>]>,
    ) -> Result<WriteOutcome, BackendError> {
        if !self.schema_ready.load(Ordering::SeqCst) {
            return Err(BackendError::permanent("graph schema missing; call ensure_schema first"));
        }
        debug!(records = records.len(), statement = MERGE_WINES, "merging wines");
        let mut store = self.store.write().await;
        let mut outcome = WriteOutcome::default();
        for record in records {
            if store.merge_wine(record) {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }

    async fn query(&self, plan: &QueryPlan) -> Result<RawResults, BackendError> {
        let store = self.store.read().await;
        let scored: Vec<(WineRecord, Option<f32>)> = match (plan.mode, plan.text.as_deref()) {
            (PlannedMode::FullText, Some(text)) => store
                .full_text(text)
                .into_iter()
                .filter_map(|(id, score)| store.record(id).map(|r| (r, Some(score))))
                .collect(),
            (PlannedMode::FullText | PlannedMode::FilterOnly, _) => store.records().map(|r| (r, None)).collect(),
            (PlannedMode::Semantic | PlannedMode::Hybrid { .. }, _) => {
                return Err(BackendError::permanent("the graph store has no vector index"));
            }
        };
        drop(store);

        let mut matched: Vec<(WineRecord, Option<f32>)> = scored
            .into_iter()
            .filter(|(r, _)| plan.filters.iter().all(|c| c.matches_with(r, TextMatch::IgnoreCase)))
            .collect();

        match plan.aggregation {
            Some(Aggregation::Count) => {
                let count = matched.len() as u64;
                return Ok(RawResults { hits: vec![], aggregation: Some(AggregationResult::Count(count)) });
            }
            Some(Aggregation::CountBy(group)) => {
                let groups = group_counts(&matched, plan, group);
                return Ok(RawResults { hits: vec![], aggregation: Some(AggregationResult::Groups(groups)) });
            }
            None => {}
        }

        let score_of = |s: &Option<f32>| s.unwrap_or(0.0);
        // Same ordering as the rendered Cypher.
        matched.sort_by(|(a, sa), (b, sb)| {
            let primary = match plan.sort {
                SortBy::PointsDesc => b.points.cmp(&a.points),
                SortBy::Relevance => score_of(sb).total_cmp(&score_of(sa)),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let hits: Vec<RawHit> = matched
            .iter()
            .skip(plan.offset)
            .take(plan.limit)
            .map(|(r, score)| hit(r, *score))
            .collect();
        debug!(hits = hits.len(), "graph query");
        Ok(RawResults { hits, aggregation: None })
    }

    fn explain(&self, plan: &QueryPlan) -> Result<String, BackendError> {
        serde_json::to_string_pretty(&render(plan).to_json()).map_err(BackendError::permanent)
    }
}
