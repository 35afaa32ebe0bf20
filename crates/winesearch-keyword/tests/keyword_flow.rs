use winesearch_core::query::{Aggregation, ClauseOp, FilterClause, FilterField, PlannedMode, QueryPlan, SortBy};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::{SchemaStatus, WineRecord};
use winesearch_keyword::{IndexSettings, KeywordAdapter};

fn wine(id: i64, title: &str, country: &str, points: u8, price: Option<f64>) -> WineRecord {
    WineRecord {
        id,
        title: title.into(),
        description: None,
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

async fn seeded() -> anyhow::Result<KeywordAdapter> {
    let adapter = KeywordAdapter::default();
    assert_eq!(adapter.ensure_schema().await?, SchemaStatus::Created);
    assert_eq!(adapter.ensure_schema().await?, SchemaStatus::AlreadyPresent);
    let records = vec![
        wine(1, "Montepulciano d'Abruzzo", "Italy", 87, Some(12.0)),
        wine(2, "Montepulciano riserva", "Italy", 92, Some(45.0)),
        wine(3, "Vino Nobile di Montepulciano", "Italy", 94, Some(80.0)),
        wine(4, "Cotes du Rhone", "France", 90, None),
    ];
    adapter.write_batch(&records, None).await?;
    Ok(adapter)
}

fn ids(hits: &[winesearch_core::RawHit]) -> Vec<i64> {
    hits.iter().filter_map(|h| h.fields["id"].as_i64()).collect()
}

#[tokio::test]
async fn typo_tolerant_search_with_filter() -> anyhow::Result<()> {
    let adapter = seeded().await?;
    let mut plan = QueryPlan::filter_only(
        vec![FilterClause { field: FilterField::Price, op: ClauseOp::Range { min: None, max: Some(50.0.into()) } }],
        10,
    );
    plan.mode = PlannedMode::FullText;
    plan.text = Some("montepulcino".into());
    plan.sort = SortBy::PointsDesc;
    let out = adapter.query(&plan).await?;
    assert_eq!(ids(&out.hits), vec![2, 1]);
    assert!(out.hits.iter().all(|h| h.score.is_some()));
    Ok(())
}

#[tokio::test]
async fn placeholder_search_pages_by_points() -> anyhow::Result<()> {
    let adapter = seeded().await?;
    let mut plan = QueryPlan::filter_only(
        vec![FilterClause { field: FilterField::Country, op: ClauseOp::Eq("italy".into()) }],
        2,
    );
    plan.sort = SortBy::PointsDesc;
    assert_eq!(ids(&adapter.query(&plan).await?.hits), vec![3, 2]);
    plan.offset = 2;
    assert_eq!(ids(&adapter.query(&plan).await?.hits), vec![1]);
    Ok(())
}

#[tokio::test]
async fn rewrites_count_as_updates() -> anyhow::Result<()> {
    let adapter = seeded().await?;
    let out = adapter.write_batch(&[wine(4, "Cotes du Rhone Villages", "France", 91, Some(20.0))], None).await?;
    assert_eq!((out.inserted, out.updated), (0, 1));
    assert_eq!(adapter.document_count().await, 4);
    Ok(())
}

#[tokio::test]
async fn aggregations_and_undeclared_filters_are_refused() -> anyhow::Result<()> {
    let adapter = seeded().await?;
    let mut plan = QueryPlan::filter_only(vec![], 5);
    plan.aggregation = Some(Aggregation::Count);
    assert!(adapter.query(&plan).await.is_err());

    let narrow = KeywordAdapter::new(IndexSettings { filterable_attributes: vec![FilterField::Country], ..Default::default() });
    narrow.ensure_schema().await?;
    let plan = QueryPlan::filter_only(
        vec![FilterClause { field: FilterField::Points, op: ClauseOp::Range { min: Some(90i64.into()), max: None } }],
        5,
    );
    assert!(narrow.query(&plan).await.is_err());
    Ok(())
}

#[tokio::test]
async fn explain_renders_a_search_payload() -> anyhow::Result<()> {
    let adapter = KeywordAdapter::default();
    let mut plan = QueryPlan::filter_only(
        vec![
            FilterClause { field: FilterField::Country, op: ClauseOp::Eq("Italy".into()) },
            FilterClause { field: FilterField::Price, op: ClauseOp::Range { min: None, max: Some(50.0.into()) } },
        ],
        5,
    );
    plan.sort = SortBy::PointsDesc;
    let text = adapter.explain(&plan)?;
    assert!(text.contains(r#"country = \"Italy\" AND price <= 50"#));
    assert!(text.contains("points:desc"));
    Ok(())
}

#[tokio::test]
async fn equal_points_page_in_id_order_whatever_the_score() -> anyhow::Result<()> {
    let adapter = KeywordAdapter::default();
    adapter.ensure_schema().await?;
    let records = vec![
        wine(30, "barolo barolo barolo", "Italy", 90, None),
        wine(10, "barolo", "Italy", 90, None),
        wine(20, "barolo nebbiolo", "Italy", 90, None),
    ];
    adapter.write_batch(&records, None).await?;

    let mut plan = QueryPlan::filter_only(vec![], 2);
    plan.mode = PlannedMode::FullText;
    plan.text = Some("barolo".into());
    plan.sort = SortBy::PointsDesc;
    assert_eq!(ids(&adapter.query(&plan).await?.hits), vec![10, 20]);
    plan.offset = 2;
    assert_eq!(ids(&adapter.query(&plan).await?.hits), vec![30]);
    Ok(())
}
