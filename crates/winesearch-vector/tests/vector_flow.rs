use winesearch_core::query::{Aggregation, ClauseOp, FilterClause, FilterField, GroupField, PlannedMode, QueryPlan, SortBy};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::{AggregationResult, SchemaStatus, WineRecord};
use winesearch_vector::VectorAdapter;

fn wine(id: i64, country: &str, points: u8, price: Option<f64>, description: &str) -> WineRecord {
    WineRecord {
        id,
        title: format!("Wine {id}"),
        description: Some(description.into()),
        variety: "Red Blend".into(),
        country: country.into(),
        province: None,
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

async fn seeded() -> anyhow::Result<VectorAdapter> {
    let adapter = VectorAdapter::new("wines", 3);
    assert_eq!(adapter.ensure_schema().await?, SchemaStatus::Created);
    assert_eq!(adapter.ensure_schema().await?, SchemaStatus::AlreadyPresent);
    let records = vec![
        wine(1, "Italy", 90, Some(40.0), "ripe cherry tuscany"),
        wine(2, "Italy", 93, Some(60.0), "structured tannins"),
        wine(3, "France", 88, Some(20.0), "cherry and plum"),
        wine(4, "Italy", 86, None, "light and fresh"),
    ];
    let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.9, 0.1, 0.0], vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
    let out = adapter.write_batch(&records, Some(vectors.as_slice())).await?;
    assert_eq!((out.inserted, out.updated), (4, 0));
    Ok(adapter)
}

fn ids(out: &winesearch_core::RawResults) -> Vec<i64> {
    out.hits.iter().filter_map(|h| h.fields["id"].as_i64()).collect()
}

fn semantic(filters: Vec<FilterClause>) -> QueryPlan {
    let mut plan = QueryPlan::filter_only(filters, 10);
    plan.mode = PlannedMode::Semantic;
    plan.vector = Some(vec![1.0, 0.0, 0.0]);
    plan
}

#[tokio::test]
async fn nearest_with_must_filters() -> anyhow::Result<()> {
    let adapter = seeded().await?;
    let plan = semantic(vec![
        FilterClause { field: FilterField::Country, op: ClauseOp::Eq("Italy".into()) },
        FilterClause { field: FilterField::Price, op: ClauseOp::Range { min: None, max: Some(50.0.into()) } },
    ]);
    let out = adapter.query(&plan).await?;
    assert_eq!(ids(&out), vec![1]);
    assert!((out.hits[0].score.unwrap_or_default() - 1.0).abs() < 1e-6);

    let out = adapter.query(&semantic(vec![])).await?;
    // 1 and 3 tie on score, broken by id
    assert_eq!(ids(&out), vec![1, 3, 2, 4]);
    Ok(())
}

#[tokio::test]
async fn hybrid_blends_text_overlap() -> anyhow::Result<()> {
    let adapter = seeded().await?;
    let mut plan = semantic(vec![]);
    plan.mode = PlannedMode::Hybrid { alpha: 0.5 };
    plan.text = Some("plum".into());
    let out = adapter.query(&plan).await?;
    assert_eq!(ids(&out)[0], 3);
    Ok(())
}

#[tokio::test]
async fn scroll_count_and_sort() -> anyhow::Result<()> {
    let adapter = seeded().await?;
    let italy = vec![FilterClause { field: FilterField::Country, op: ClauseOp::Eq("Italy".into()) }];

    let mut plan = QueryPlan::filter_only(italy.clone(), 2);
    plan.sort = SortBy::PointsDesc;
    assert_eq!(ids(&adapter.query(&plan).await?), vec![2, 1]);

    plan.aggregation = Some(Aggregation::Count);
    assert_eq!(adapter.query(&plan).await?.aggregation, Some(AggregationResult::Count(3)));

    plan.aggregation = Some(Aggregation::CountBy(GroupField::Country));
    assert!(adapter.query(&plan).await.is_err());
    Ok(())
}

#[tokio::test]
async fn per_point_dimension_failures() -> anyhow::Result<()> {
    let adapter = seeded().await?;
    let records = vec![wine(1, "Italy", 91, Some(41.0), "ripe cherry"), wine(9, "Chile", 85, None, "green")];
    let vectors = vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.0]];
    let out = adapter.write_batch(&records, Some(vectors.as_slice())).await?;
    assert_eq!((out.inserted, out.updated, out.failed.len()), (0, 1, 1));
    assert_eq!(out.failed[0].id, 9);
    assert_eq!(adapter.point_count().await, 4);
    assert!(adapter.write_batch(&records, None).await.is_err());
    Ok(())
}

#[tokio::test]
async fn explain_renders_must_filter() -> anyhow::Result<()> {
    let adapter = VectorAdapter::new("wines", 3);
    let plan = semantic(vec![FilterClause { field: FilterField::Country, op: ClauseOp::Eq("Italy".into()) }]);
    let text = adapter.explain(&plan)?;
    assert!(text.contains("\"must\""));
    assert!(text.contains("\"Cosine\""));
    Ok(())
}
