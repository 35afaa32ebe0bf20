use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tantivy::collector::{Count, FacetCollector, TopDocs};
use tantivy::query::{Query, TermQuery};
use tantivy::schema::{Facet, IndexRecordOption, Value};
use tantivy::columnar::Column;
use tantivy::{
    DocAddress, DocId, Index, IndexReader, IndexWriter, ReloadPolicy, Score, Searcher, SegmentReader, TantivyDocument,
    TantivyError, Term,
};
use tracing::{debug, info};

use winesearch_core::error::BackendError;
use winesearch_core::query::{Aggregation, QueryPlan, RawHit, RawResults, SortBy};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::{
    AggregationResult, BackendKind, Capabilities, Capability, GroupCount, SchemaStatus, WineRecord, WriteOutcome,
};

use crate::lower::{to_dsl, to_query};
use crate::schema::{build_schema, register_tokenizer, Fields};

const WRITER_MEMORY: usize = 50_000_000;

struct State {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

impl State {
    fn open_or_create(dir: Option<&Path>) -> Result<(Self, SchemaStatus), TantivyError> {
        let (index, status) = match dir {
            Some(dir) if dir.join("meta.json").exists() => (Index::open_in_dir(dir)?, SchemaStatus::AlreadyPresent),
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (Index::create_in_dir(dir, build_schema())?, SchemaStatus::Created)
            }
            None => (Index::create_in_ram(build_schema()), SchemaStatus::Created),
        };
        register_tokenizer(&index);
        let fields = Fields::resolve(&index.schema())?;
        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        let writer: IndexWriter = index.writer(WRITER_MEMORY)?;
        Ok((Self { index, reader, writer: Mutex::new(writer), fields }, status))
    }

    fn exists(&self, searcher: &Searcher, id: i64) -> Result<bool, TantivyError> {
        let query = TermQuery::new(Term::from_field_i64(self.fields.id, id), IndexRecordOption::Basic);
        Ok(searcher.search(&query, &Count)? > 0)
    }

    fn write(&self, records: &[WineRecord]) -> Result<WriteOutcome, BackendError> {
        let mut writer = self.writer.lock().map_err(|_| BackendError::permanent("index writer poisoned"))?;
        let searcher = self.reader.searcher();
        let mut outcome = WriteOutcome::default();
        let mut seen = HashSet::new();
        for record in records {
            let doc = match self.document(record) {
                Ok(doc) => doc,
                Err(reason) => {
                    outcome.failed.push(winesearch_core::types::RecordFailure { id: record.id, reason });
                    continue;
                }
            };
            let existed = !seen.insert(record.id) || self.exists(&searcher, record.id).map_err(classify)?;
            writer.delete_term(Term::from_field_i64(self.fields.id, record.id));
            writer.add_document(doc).map_err(classify)?;
            if existed {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        writer.commit().map_err(classify)?;
        self.reader.reload().map_err(classify)?;
        Ok(outcome)
    }

    fn document(&self, r: &WineRecord) -> Result<TantivyDocument, String> {
        let f = &self.fields;
        let mut doc = TantivyDocument::default();
        doc.add_i64(f.id, r.id);
        doc.add_i64(f.points, i64::from(r.points));
        if let Some(price) = r.price {
            doc.add_f64(f.price, price);
        }
        doc.add_text(f.title, &r.title);
        if let Some(description) = &r.description {
            doc.add_text(f.description, description);
        }
        doc.add_text(f.variety_text, &r.variety);
        doc.add_text(f.country, r.country.to_lowercase());
        doc.add_text(f.variety, r.variety.to_lowercase());
        doc.add_text(f.winery, r.winery.to_lowercase());
        if let Some(province) = &r.province {
            doc.add_text(f.province, province.to_lowercase());
            doc.add_facet(f.province_facet, Facet::from_path([province.as_str()]));
        }
        if let Some(taster) = &r.taster_name {
            doc.add_text(f.taster_name, taster.to_lowercase());
        }
        doc.add_facet(f.country_facet, Facet::from_path([r.country.as_str()]));
        doc.add_facet(f.variety_facet, Facet::from_path([r.variety.as_str()]));
        let source = serde_json::to_string(r).map_err(|e| e.to_string())?;
        doc.add_text(f.source, source);
        Ok(doc)
    }

    fn search(&self, plan: &QueryPlan) -> Result<RawResults, BackendError> {
        let query = to_query(&self.index, &self.fields, plan)?;
        let searcher = self.reader.searcher();
        match plan.aggregation {
            Some(Aggregation::Count) => {
                let count = searcher.search(query.as_ref(), &Count).map_err(classify)?;
                return Ok(RawResults { hits: vec![], aggregation: Some(AggregationResult::Count(count as u64)) });
            }
            Some(Aggregation::CountBy(group)) => {
                let mut groups = self.facet_counts(&searcher, query.as_ref(), Fields::facet_name(group))?;
                groups.truncate(plan.limit);
                return Ok(RawResults { hits: vec![], aggregation: Some(AggregationResult::Groups(groups)) });
            }
            None => {}
        }

        // Equal scores or points fall back to ascending wine id so pages are
        // stable across segment layouts.
        let limit = plan.limit.max(1);
        let top = TopDocs::with_limit(limit).and_offset(plan.offset);
        let addresses: Vec<(Option<f32>, DocAddress)> = match plan.sort {
            SortBy::Relevance => searcher
                .search(
                    query.as_ref(),
                    &top.tweak_score(|segment: &SegmentReader| {
                        let ids = i64_column(segment, "id");
                        move |doc: DocId, score: Score| (score, Reverse(first_or(&ids, doc, i64::MAX)))
                    }),
                )
                .map_err(classify)?
                .into_iter()
                .map(|((score, _), addr)| (Some(score), addr))
                .collect(),
            SortBy::PointsDesc => searcher
                .search(
                    query.as_ref(),
                    &top.custom_score(|segment: &SegmentReader| {
                        let points = i64_column(segment, "points");
                        let ids = i64_column(segment, "id");
                        move |doc: DocId| (first_or(&points, doc, i64::MIN), Reverse(first_or(&ids, doc, i64::MAX)))
                    }),
                )
                .map_err(classify)?
                .into_iter()
                .map(|(_, addr)| (None, addr))
                .collect(),
        };

        let mut hits = Vec::with_capacity(addresses.len());
        for (score, addr) in addresses {
            let doc: TantivyDocument = searcher.doc(addr).map_err(classify)?;
            let source = doc.get_first(self.fields.source).and_then(|v| v.as_str()).unwrap_or("{}");
            let fields = match serde_json::from_str::<serde_json::Value>(source) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => return Err(BackendError::permanent("stored document is not a JSON object")),
            };
            hits.push(RawHit { fields, score });
        }
        debug!(hits = hits.len(), "tantivy query");
        Ok(RawResults { hits, aggregation: None })
    }

    fn facet_counts(&self, searcher: &Searcher, query: &dyn Query, facet_field: &str) -> Result<Vec<GroupCount>, BackendError> {
        let mut collector = FacetCollector::for_field(facet_field);
        collector.add_facet(Facet::root());
        let counts = searcher.search(query, &collector).map_err(classify)?;
        let mut groups: Vec<GroupCount> = counts
            .get(&Facet::root().to_string())
            .filter_map(|(facet, count)| {
                facet.to_path().last().map(|key| GroupCount { key: (*key).to_string(), count })
            })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        Ok(groups)
    }
}

fn i64_column(segment: &SegmentReader, name: &str) -> Option<Column<i64>> {
    segment.fast_fields().i64(name).ok()
}

fn first_or(column: &Option<Column<i64>>, doc: DocId, missing: i64) -> i64 {
    column.as_ref().and_then(|c| c.first(doc)).unwrap_or(missing)
}

fn classify(e: TantivyError) -> BackendError {
    match e {
        TantivyError::IoError(_) | TantivyError::LockFailure(..) => BackendError::transient(e),
        other => BackendError::permanent(other),
    }
}

/// Inverted-index backend on a Tantivy index, on disk or in RAM.
pub struct TantivyAdapter {
    dir: Option<PathBuf>,
    state: Mutex<Option<Arc<State>>>,
}

impl TantivyAdapter {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()), state: Mutex::new(None) }
    }

    pub fn in_memory() -> Self {
        Self { dir: None, state: Mutex::new(None) }
    }

    fn state(&self) -> Result<Arc<State>, BackendError> {
        let guard = self.state.lock().map_err(|_| BackendError::permanent("adapter state poisoned"))?;
        guard.clone().ok_or_else(|| BackendError::permanent("schema not initialised; call ensure_schema first"))
    }
}

#[async_trait]
impl BackendAdapter for TantivyAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::InvertedIndex
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
        let mut guard = self.state.lock().map_err(|_| BackendError::permanent("adapter state poisoned"))?;
        if guard.is_some() {
            return Ok(SchemaStatus::AlreadyPresent);
        }
        let (state, status) = State::open_or_create(self.dir.as_deref()).map_err(classify)?;
        *guard = Some(Arc::new(state));
        info!(dir = ?self.dir, ?status, "tantivy index ready");
        Ok(status)
    }

    async fn write_batch(
        &self,
        records: &[WineRecord],
        _embeddings: Option<&[Vec<f32>]>,
    ) -> Result<WriteOutcome, BackendError> {
        let state = self.state()?;
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || state.write(&records))
            .await
            .map_err(|e| BackendError::transient(format!("index worker stopped: {}", e)))?
    }

    async fn query(&self, plan: &QueryPlan) -> Result<RawResults, BackendError> {
        let state = self.state()?;
        let plan = plan.clone();
        tokio::task::spawn_blocking(move || state.search(&plan))
            .await
            .map_err(|e| BackendError::transient(format!("search worker stopped: {}", e)))?
    }

    fn explain(&self, plan: &QueryPlan) -> Result<String, BackendError> {
        serde_json::to_string_pretty(&to_dsl(plan)).map_err(BackendError::permanent)
    }
}
