use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use winesearch_core::config::QuerySettings;
use winesearch_core::error::{EmbeddingError, QueryError};
use winesearch_core::query::{Aggregation, Cursor, MatchMode, Page, PlannedMode, QueryPlan, SearchRequest, SortBy};
use winesearch_core::retry::{retry_with_backoff, RetryPolicy};
use winesearch_core::text::EmbeddableText;
use winesearch_core::traits::{ensure_dim, BackendAdapter, EmbeddingProvider};
use winesearch_core::types::{Capabilities, Capability, ResultMetadata, ScoredWine, SearchResult};

use crate::clauses;
use crate::normalize::scored_wine;

/// Turns canonical requests into backend plans and backend answers into
/// canonical results. Holds no per-request state; one instance serves every
/// adapter.
pub struct QueryTranslator {
    settings: QuerySettings,
    policy: RetryPolicy,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

/// A plan plus what the translator must still do after the backend answers.
#[derive(Debug)]
struct Prepared {
    plan: QueryPlan,
    offset: usize,
    limit: usize,
    client_side_paging: bool,
    limit_clamped: bool,
}

fn require(caps: &Capabilities, adapter: &dyn BackendAdapter, capability: Capability) -> Result<(), QueryError> {
    if caps.supports(capability) {
        Ok(())
    } else {
        Err(QueryError::UnsupportedOperation { backend: adapter.kind(), capability })
    }
}

fn invalid(msg: &str) -> QueryError {
    QueryError::InvalidRequest(msg.to_string())
}

impl QueryTranslator {
    pub fn new(settings: QuerySettings, policy: RetryPolicy) -> Self {
        Self { settings, policy, embedder: None }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// The plan `translate_and_execute` would send, vector included.
    pub async fn translate(&self, request: &SearchRequest, adapter: &dyn BackendAdapter) -> Result<QueryPlan, QueryError> {
        Ok(self.prepare(request, adapter).await?.plan)
    }

    /// The adapter's native rendering of the request.
    pub async fn explain(&self, request: &SearchRequest, adapter: &dyn BackendAdapter) -> Result<String, QueryError> {
        let prepared = self.prepare(request, adapter).await?;
        adapter.explain(&prepared.plan).map_err(|e| {
            warn!(backend = %adapter.kind(), error = %e, "explain failed");
            QueryError::from_backend(adapter.kind(), &e)
        })
    }

    pub async fn translate_and_execute(
        &self,
        request: &SearchRequest,
        adapter: &dyn BackendAdapter,
    ) -> Result<SearchResult, QueryError> {
        let backend = adapter.kind();
        let prepared = self.prepare(request, adapter).await?;
        let plan = &prepared.plan;

        let attempted =
            retry_with_backoff(&self.policy, self.settings.query_timeout(), |_| adapter.query(plan)).await;
        let raw = attempted.result.map_err(|e| {
            warn!(%backend, attempts = attempted.attempts, error = %e, "backend query failed");
            QueryError::from_backend(backend, &e)
        })?;

        let metadata = ResultMetadata {
            backend,
            mode: plan.mode,
            client_side_paging: prepared.client_side_paging,
            limit_clamped: prepared.limit_clamped,
        };
        if plan.aggregation.is_some() {
            return Ok(SearchResult { hits: Vec::new(), aggregation: raw.aggregation, next_cursor: None, metadata });
        }

        let total = raw.hits.len();
        let mut hits: Vec<ScoredWine> = raw.hits.iter().filter_map(scored_wine).collect();
        if hits.len() < total {
            warn!(%backend, dropped = total - hits.len(), "hits without a usable id");
        }
        sort_hits(&mut hits, plan.sort);
        if prepared.client_side_paging {
            hits = hits.into_iter().skip(prepared.offset).take(prepared.limit).collect();
        }
        hits.truncate(prepared.limit);

        let next_cursor = (hits.len() == prepared.limit).then(|| Cursor::encode(prepared.offset + prepared.limit));
        debug!(%backend, mode = ?plan.mode, hits = hits.len(), offset = prepared.offset, "query answered");
        Ok(SearchResult { hits, aggregation: None, next_cursor, metadata })
    }

    async fn prepare(&self, request: &SearchRequest, adapter: &dyn BackendAdapter) -> Result<Prepared, QueryError> {
        let caps = adapter.capabilities();
        let terms = request.terms.as_deref().map(str::trim).filter(|t| !t.is_empty());

        match request.aggregate {
            Some(Aggregation::Count) => require(&caps, adapter, Capability::Count)?,
            Some(Aggregation::CountBy(_)) => require(&caps, adapter, Capability::GroupCount)?,
            None => {}
        }
        if !request.filters.is_empty() {
            require(&caps, adapter, Capability::Filter)?;
        }

        let mode = match (terms, request.mode) {
            (None, MatchMode::Auto) => PlannedMode::FilterOnly,
            (None, _) => return Err(invalid("a text or semantic match needs search terms")),
            (Some(_), MatchMode::Auto) if request.aggregate.is_none() && caps.supports(Capability::VectorSimilarity) => {
                PlannedMode::Semantic
            }
            (Some(_), MatchMode::Auto | MatchMode::FullText) => {
                require(&caps, adapter, Capability::FullText)?;
                PlannedMode::FullText
            }
            (Some(_), MatchMode::Semantic) => {
                require(&caps, adapter, Capability::VectorSimilarity)?;
                PlannedMode::Semantic
            }
            (Some(_), MatchMode::Hybrid { alpha }) => {
                require(&caps, adapter, Capability::Hybrid)?;
                if !(0.0..=1.0).contains(&alpha) {
                    return Err(invalid("hybrid alpha must be within 0..=1"));
                }
                PlannedMode::Hybrid { alpha }
            }
        };
        let ranked_by_vector = matches!(mode, PlannedMode::Semantic | PlannedMode::Hybrid { .. });
        if ranked_by_vector && request.aggregate.is_some() {
            return Err(invalid("aggregations cannot be combined with semantic ranking"));
        }
        if request.sort == SortBy::PointsDesc {
            if ranked_by_vector {
                return Err(invalid("semantic results are ordered by similarity and cannot be re-sorted"));
            }
            require(&caps, adapter, Capability::Sort)?;
        }

        let filters = clauses::build(&request.filters)?;

        let requested = request.limit.unwrap_or(self.settings.default_limit);
        if requested == 0 {
            return Err(invalid("limit must be at least 1"));
        }
        let limit_clamped = requested > self.settings.max_limit;
        let limit = requested.min(self.settings.max_limit);
        let offset = match &request.page {
            Page::Offset(n) => *n,
            Page::Cursor(token) => Cursor::decode(token).ok_or_else(|| invalid("malformed cursor"))?,
        };
        let client_side_paging = !caps.supports(Capability::NativePaging);
        let (plan_offset, plan_limit) =
            if client_side_paging { (0, offset.saturating_add(limit)) } else { (offset, limit) };

        let vector = if ranked_by_vector {
            let text = EmbeddableText::from_query(terms.unwrap_or_default());
            Some(self.embed_query(text).await?)
        } else {
            None
        };

        if limit_clamped {
            debug!(requested, limit, "limit lowered to the configured maximum");
        }
        Ok(Prepared {
            plan: QueryPlan {
                mode,
                text: terms.map(str::to_string),
                vector,
                filters,
                sort: request.sort,
                limit: plan_limit,
                offset: plan_offset,
                aggregation: request.aggregate,
            },
            offset,
            limit,
            client_side_paging,
            limit_clamped,
        })
    }

    async fn embed_query(&self, text: EmbeddableText) -> Result<Vec<f32>, QueryError> {
        let Some(embedder) = &self.embedder else {
            return Err(EmbeddingError::Unavailable("no embedding provider configured".into()).into());
        };
        let text = text.as_str();
        let attempted =
            retry_with_backoff(&self.policy, self.settings.query_timeout(), |_| embedder.embed(text)).await;
        let vector = attempted.result.map_err(|e| {
            warn!(model = embedder.model_id(), attempts = attempted.attempts, error = %e, "query embedding failed");
            QueryError::Embedding(e)
        })?;
        ensure_dim(embedder.dim(), vector).map_err(|e| {
            warn!(model = embedder.model_id(), error = %e, "query vector has the wrong width");
            QueryError::InvalidRequest(e.to_string())
        })
    }
}

/// Score descending (or points descending), ties by ascending id.
fn sort_hits(hits: &mut [ScoredWine], sort: SortBy) {
    hits.sort_by(|a, b| {
        let primary = match sort {
            SortBy::PointsDesc => b.points.cmp(&a.points),
            SortBy::Relevance => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}
