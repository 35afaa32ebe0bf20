use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use winesearch_core::config::QuerySettings;
use winesearch_core::error::{BackendError, EmbeddingError, QueryError};
use winesearch_core::query::{
    Aggregation, Constraint, Cursor, FilterField, MatchMode, PlannedMode, QueryPlan, RawHit, RawResults,
    SearchRequest, SortBy,
};
use winesearch_core::retry::RetryPolicy;
use winesearch_core::traits::{BackendAdapter, EmbeddingProvider};
use winesearch_core::types::{
    AggregationResult, BackendKind, Capabilities, Capability, GroupCount, SchemaStatus, WineRecord, WriteOutcome,
};
use winesearch_embed::HashEmbedder;
use winesearch_graph::GraphAdapter;
use winesearch_keyword::KeywordAdapter;
use winesearch_query::QueryTranslator;
use winesearch_vector::VectorAdapter;

fn wine(id: i64, title: &str, country: &str, points: u8, price: Option<f64>) -> WineRecord {
    WineRecord {
        id,
        title: title.into(),
        description: Some(format!("{title} from {country}")),
        variety: "Sangiovese".into(),
        country: country.into(),
        province: Some("Tuscany".into()),
        winery: format!("Winery {id}"),
        points,
        price,
        taster_name: None,
        taster_twitter_handle: None,
        vineyard: None,
        region_1: None,
        region_2: None,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy { max_attempts: 2, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2) }
}

fn translator() -> QueryTranslator {
    QueryTranslator::new(QuerySettings::default(), fast_retry())
}

/// Filter-only store that cannot page: it always answers from the start.
struct Unpaged {
    records: Vec<WineRecord>,
    last_limit: Mutex<Option<usize>>,
}

#[async_trait]
impl BackendAdapter for Unpaged {
    fn kind(&self) -> BackendKind {
        BackendKind::FastKeyword
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::Filter, Capability::FullText])
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus, BackendError> {
        Ok(SchemaStatus::AlreadyPresent)
    }

    async fn write_batch(&self, _: &[WineRecord], _: Option<&[Vec<f32>]>) -> Result<WriteOutcome, BackendError> {
        Ok(WriteOutcome::default())
    }

    async fn query(&self, plan: &QueryPlan) -> Result<RawResults, BackendError> {
        if let Ok(mut last) = self.last_limit.lock() {
            *last = Some(plan.limit);
        }
        let hits = self
            .records
            .iter()
            .filter(|r| plan.matches_filters(r))
            .take(plan.limit)
            .filter_map(|r| match r.to_raw() {
                serde_json::Value::Object(fields) => Some(RawHit { fields, score: None }),
                _ => None,
            })
            .collect();
        Ok(RawResults { hits, aggregation: None })
    }

    fn explain(&self, _: &QueryPlan) -> Result<String, BackendError> {
        Ok("scan".into())
    }
}

/// Store whose every query fails with an internal message.
struct Broken {
    transient: bool,
}

#[async_trait]
impl BackendAdapter for Broken {
    fn kind(&self) -> BackendKind {
        BackendKind::InvertedIndex
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::Filter, Capability::FullText, Capability::NativePaging])
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus, BackendError> {
        Ok(SchemaStatus::AlreadyPresent)
    }

    async fn write_batch(&self, _: &[WineRecord], _: Option<&[Vec<f32>]>) -> Result<WriteOutcome, BackendError> {
        Ok(WriteOutcome::default())
    }

    async fn query(&self, _: &QueryPlan) -> Result<RawResults, BackendError> {
        if self.transient {
            Err(BackendError::transient("shard wines_v3 at 10.0.0.7 timed out"))
        } else {
            Err(BackendError::permanent("field wines_v3.secret_col is not indexed"))
        }
    }

    fn explain(&self, _: &QueryPlan) -> Result<String, BackendError> {
        Err(BackendError::permanent("no renderer"))
    }
}

async fn vectors_with(records: &[WineRecord], embedder: &HashEmbedder) -> anyhow::Result<VectorAdapter> {
    let adapter = VectorAdapter::new("wines", 64);
    adapter.ensure_schema().await?;
    let vectors = records
        .iter()
        .map(|r| embedder.embed_sync(&format!("{} {}", r.title, r.description.as_deref().unwrap_or_default())))
        .collect::<Result<Vec<_>, _>>()?;
    adapter.write_batch(records, Some(vectors.as_slice())).await?;
    Ok(adapter)
}

#[tokio::test]
async fn tuscany_red_on_a_vector_store() -> anyhow::Result<()> {
    let embedder = Arc::new(HashEmbedder::new(64));
    let records = vec![
        wine(1, "Tuscany red", "Italy", 90, Some(30.0)),
        wine(2, "Tuscany red", "Italy", 91, Some(45.0)),
        wine(3, "Tuscany red", "France", 92, Some(20.0)),
        wine(4, "Tuscany red reserve", "Italy", 95, Some(120.0)),
        wine(5, "Etna white", "Italy", 88, Some(25.0)),
        wine(6, "Chianti red", "Italy", 89, None),
    ];
    let adapter = vectors_with(&records, &embedder).await?;
    let translator = translator().with_embedder(embedder);

    let request = SearchRequest::search("tuscany red")
        .filter(FilterField::Country, Constraint::Eq("Italy".into()))
        .filter(FilterField::Price, Constraint::at_most(50.0));
    let result = translator.translate_and_execute(&request, &adapter).await?;

    assert_eq!(result.metadata.mode, PlannedMode::Semantic);
    assert!(!result.hits.is_empty());
    assert!(result.hits.iter().all(|h| h.country == "Italy" && h.price.is_some_and(|p| p <= 50.0)));
    for pair in result.hits.windows(2) {
        assert!(pair[0].score > pair[1].score || (pair[0].score == pair[1].score && pair[0].id < pair[1].id));
    }
    // identical texts tie, the lower id comes first
    assert_eq!(result.hits[0].id, 1);
    assert_eq!(result.hits[1].id, 2);
    Ok(())
}

#[tokio::test]
async fn semantic_requests_need_an_embedder_and_no_sort() -> anyhow::Result<()> {
    let embedder = HashEmbedder::new(64);
    let adapter = vectors_with(&[wine(1, "Tuscany red", "Italy", 90, None)], &embedder).await?;

    let err = translator().translate_and_execute(&SearchRequest::search("red"), &adapter).await.unwrap_err();
    assert!(matches!(err, QueryError::Embedding(_)));

    let sorted = SearchRequest::search("red").sort(SortBy::PointsDesc);
    let err = translator().with_embedder(Arc::new(embedder)).translate(&sorted, &adapter).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidRequest(_)));
    Ok(())
}

/// Declares one width and returns another.
struct Lopsided;

#[async_trait]
impl EmbeddingProvider for Lopsided {
    fn model_id(&self) -> &str {
        "lopsided"
    }

    fn dim(&self) -> usize {
        64
    }

    async fn embed(&self, _: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.1; 63])
    }
}

#[tokio::test]
async fn query_vectors_of_the_wrong_width_are_invalid() -> anyhow::Result<()> {
    let embedder = HashEmbedder::new(64);
    let adapter = vectors_with(&[wine(1, "Tuscany red", "Italy", 90, None)], &embedder).await?;
    let err = translator()
        .with_embedder(Arc::new(Lopsided))
        .translate_and_execute(&SearchRequest::search("red"), &adapter)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidRequest(ref msg) if msg.contains("63")), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn capability_mismatches_are_refused() -> anyhow::Result<()> {
    let keyword = KeywordAdapter::default();
    let err = translator().translate(&SearchRequest::most_by_variety("red", 88), &keyword).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnsupportedOperation { backend: BackendKind::FastKeyword, capability: Capability::GroupCount }
    ));
    let err = translator().translate(&SearchRequest::count_by_country("Italy"), &keyword).await.unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedOperation { capability: Capability::Count, .. }));

    let graph = GraphAdapter::new();
    let semantic = SearchRequest::search("red").mode(MatchMode::Semantic);
    let err = translator().translate(&semantic, &graph).await.unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedOperation { capability: Capability::VectorSimilarity, .. }));

    let ranged = SearchRequest::new().filter(FilterField::Country, Constraint::at_least(1.0));
    assert!(matches!(translator().translate(&ranged, &graph).await, Err(QueryError::InvalidRequest(_))));
    Ok(())
}

async fn seeded_graph() -> anyhow::Result<GraphAdapter> {
    let graph = GraphAdapter::new();
    graph.ensure_schema().await?;
    let records = vec![
        wine(1, "Chianti red blend", "Italy", 91, Some(30.0)),
        wine(2, "Brunello red", "Italy", 95, None),
        wine(3, "Douro red", "Portugal", 88, Some(12.0)),
        wine(4, "Rioja reserva", "Spain", 90, Some(25.0)),
        wine(5, "Maremma sangiovese", "Italy", 87, Some(18.0)),
    ];
    graph.write_batch(&records, None).await?;
    Ok(graph)
}

#[tokio::test]
async fn graph_hits_are_normalised_and_paged_by_cursor() -> anyhow::Result<()> {
    let graph = seeded_graph().await?;
    let translator = translator();

    let first = translator.translate_and_execute(&SearchRequest::top_by_country("italy").limit(2), &graph).await?;
    assert_eq!(first.hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(first.hits[0].country, "Italy");
    assert_eq!(first.hits[0].price, None);
    assert_eq!(first.hits[1].price, Some(30.0));
    assert!(!first.metadata.client_side_paging);

    let cursor = first.next_cursor.clone().unwrap_or_default();
    assert_eq!(Cursor::decode(&cursor), Some(2));
    let second = SearchRequest::top_by_country("italy").limit(2).cursor(cursor);
    let second = translator.translate_and_execute(&second, &graph).await?;
    assert_eq!(second.hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![5]);
    assert_eq!(second.next_cursor, None);
    Ok(())
}

#[tokio::test]
async fn aggregations_come_back_without_hits() -> anyhow::Result<()> {
    let graph = seeded_graph().await?;
    let translator = translator();

    let count = translator.translate_and_execute(&SearchRequest::count_by_filters("Italy", 90, 40.0), &graph).await?;
    assert!(count.hits.is_empty());
    assert_eq!(count.aggregation, Some(AggregationResult::Count(1)));

    let groups = translator.translate_and_execute(&SearchRequest::most_by_variety("red", 88), &graph).await?;
    assert_eq!(
        groups.aggregation,
        Some(AggregationResult::Groups(vec![
            GroupCount { key: "Italy".into(), count: 2 },
            GroupCount { key: "Portugal".into(), count: 1 },
        ]))
    );
    assert_eq!(groups.next_cursor, None);
    Ok(())
}

#[tokio::test]
async fn client_side_paging_when_the_backend_cannot_page() -> anyhow::Result<()> {
    let adapter = Unpaged {
        records: (1..=6).map(|id| wine(id, "Red", "Italy", 90, None)).collect(),
        last_limit: Mutex::new(None),
    };
    let request = SearchRequest::new().filter(FilterField::Country, Constraint::Eq("Italy".into())).limit(2).offset(2);
    let result = translator().translate_and_execute(&request, &adapter).await?;

    assert!(result.metadata.client_side_paging);
    assert_eq!(result.hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(*adapter.last_limit.lock().map_err(|e| anyhow::anyhow!("{e}"))?, Some(4));
    assert_eq!(result.next_cursor.as_deref().and_then(Cursor::decode), Some(4));
    Ok(())
}

#[tokio::test]
async fn oversized_limits_are_clamped() -> anyhow::Result<()> {
    let adapter = Unpaged {
        records: (1..=10).map(|id| wine(id, "Red", "Italy", 90, None)).collect(),
        last_limit: Mutex::new(None),
    };
    let settings = QuerySettings { default_limit: 2, max_limit: 3, ..QuerySettings::default() };
    let translator = QueryTranslator::new(settings, fast_retry());

    let result = translator.translate_and_execute(&SearchRequest::new().limit(50), &adapter).await?;
    assert!(result.metadata.limit_clamped);
    assert_eq!(result.hits.len(), 3);

    let result = translator.translate_and_execute(&SearchRequest::new(), &adapter).await?;
    assert!(!result.metadata.limit_clamped);
    assert_eq!(result.hits.len(), 2);
    assert!(matches!(
        translator.translate(&SearchRequest::new().limit(0), &adapter).await,
        Err(QueryError::InvalidRequest(_))
    ));
    Ok(())
}

#[tokio::test]
async fn backend_failures_do_not_leak_details() -> anyhow::Result<()> {
    let request = SearchRequest::search("red");

    let err = translator().translate_and_execute(&request, &Broken { transient: false }).await.unwrap_err();
    assert!(matches!(err, QueryError::BackendRejected { backend: BackendKind::InvertedIndex, .. }));
    assert!(!err.to_string().contains("secret_col"));

    let err = translator().translate_and_execute(&request, &Broken { transient: true }).await.unwrap_err();
    assert!(matches!(err, QueryError::BackendUnavailable { .. }));
    assert!(!err.to_string().contains("10.0.0.7"));

    let err = translator().explain(&request, &Broken { transient: false }).await.unwrap_err();
    assert!(matches!(err, QueryError::BackendRejected { .. }));
    Ok(())
}

#[tokio::test]
async fn explain_shows_the_native_query() -> anyhow::Result<()> {
    let keyword = KeywordAdapter::default();
    let request = SearchRequest::search_by_filters("chianti", "Italy", 88, 50.0).sort(SortBy::PointsDesc);
    let text = translator().explain(&request, &keyword).await?;
    assert!(text.contains("country = \\\"Italy\\\""), "{text}");
    assert!(text.contains("points:desc"));

    let graph = GraphAdapter::new();
    let plan = translator().translate(&SearchRequest::count_by_country("Italy"), &graph).await?;
    assert_eq!(plan.aggregation, Some(Aggregation::Count));
    assert_eq!(plan.mode, PlannedMode::FilterOnly);
    Ok(())
}
