use winesearch_core::query::{
    Aggregation, ClauseOp, FilterClause, FilterField, GroupField, PlannedMode, QueryPlan, SortBy,
};
use winesearch_core::traits::BackendAdapter;
use winesearch_core::types::{AggregationResult, GroupCount, SchemaStatus, WineRecord};
use winesearch_graph::GraphAdapter;

fn wine(id: i64, title: &str, variety: &str, country: &str, province: Option<&str>, points: u8, price: Option<f64>) -> WineRecord {
    WineRecord {
        id,
        title: title.into(),
        description: None,
        variety: variety.into(),
        country: country.into(),
        province: province.map(Into::into),
        winery: format!("Winery {id}"),
        points,
        price,
        taster_name: Some("Roger Voss".into()),
        taster_twitter_handle: None,
        vineyard: None,
        region_1: None,
        region_2: None,
    }
}

async fn seeded() -> anyhow::Result<GraphAdapter> {
    let graph = GraphAdapter::new();
    assert_eq!(graph.ensure_schema().await?, SchemaStatus::Created);
    assert_eq!(graph.ensure_schema().await?, SchemaStatus::AlreadyPresent);
    let records = vec![
        wine(1, "Chianti red blend", "Sangiovese", "Italy", Some("Tuscany"), 91, Some(30.0)),
        wine(2, "Brunello red", "Sangiovese", "Italy", Some("Tuscany"), 95, None),
        wine(3, "Douro red", "Portuguese Red", "Portugal", Some("Douro"), 88, Some(12.0)),
        wine(4, "Rioja reserva", "Tempranillo", "Spain", Some("Northern Spain"), 90, Some(25.0)),
        wine(5, "Maremma sangiovese", "Sangiovese", "Italy", Some("Tuscany"), 87, Some(18.0)),
    ];
    let out = graph.write_batch(&records, None).await?;
    assert_eq!((out.inserted, out.updated), (5, 0));
    Ok(graph)
}

fn plan() -> QueryPlan {
    QueryPlan::filter_only(vec![], 10)
}

fn ids(out: &winesearch_core::query::RawResults) -> Vec<i64> {
    out.hits.iter().filter_map(|h| h.fields["wineID"].as_i64()).collect()
}

#[tokio::test]
async fn writes_need_a_schema() {
    let graph = GraphAdapter::new();
    assert!(graph.write_batch(&[wine(1, "t", "v", "Italy", None, 90, None)], None).await.is_err());
}

#[tokio::test]
async fn merge_is_an_upsert() -> anyhow::Result<()> {
    let graph = seeded().await?;
    let moved = wine(3, "Douro red", "Portuguese Red", "Portugal", None, 89, Some(14.0));
    let out = graph.write_batch(&[moved], None).await?;
    assert_eq!((out.inserted, out.updated), (0, 1));
    assert_eq!(graph.stats().await.wines, 5);

    let mut p = plan();
    p.filters = vec![FilterClause { field: FilterField::Id, op: ClauseOp::Eq(3i64.into()) }];
    let out = graph.query(&p).await?;
    assert_eq!(out.hits[0].fields["points"].as_i64(), Some(89));
    assert!(out.hits[0].fields["provinceName"].is_null());
    Ok(())
}

#[tokio::test]
async fn country_match_ignores_case_and_sorts_by_points() -> anyhow::Result<()> {
    let graph = seeded().await?;
    let mut p = plan();
    p.filters = vec![FilterClause { field: FilterField::Country, op: ClauseOp::Eq("italy".into()) }];
    p.sort = SortBy::PointsDesc;
    p.limit = 2;
    let out = graph.query(&p).await?;
    assert_eq!(ids(&out), vec![2, 1]);
    assert_eq!(out.hits[0].fields["price"], "Not available");
    assert_eq!(out.hits[0].fields["countryName"], "Italy");

    p.offset = 2;
    assert_eq!(ids(&graph.query(&p).await?), vec![5]);
    Ok(())
}

#[tokio::test]
async fn points_ties_page_by_id_not_score() -> anyhow::Result<()> {
    let graph = GraphAdapter::new();
    graph.ensure_schema().await?;
    let records = vec![
        wine(30, "red tempranillo", "Tempranillo", "Spain", None, 90, None),
        wine(10, "red", "Merlot", "Chile", None, 90, None),
        wine(20, "red", "Merlot", "Chile", None, 90, None),
    ];
    graph.write_batch(&records, None).await?;

    let mut p = plan();
    p.mode = PlannedMode::FullText;
    p.text = Some("red tempranillo".into());
    p.sort = SortBy::PointsDesc;
    p.limit = 2;
    assert_eq!(ids(&graph.query(&p).await?), vec![10, 20]);
    p.offset = 2;
    assert_eq!(ids(&graph.query(&p).await?), vec![30]);
    Ok(())
}

#[tokio::test]
async fn full_text_with_price_filter() -> anyhow::Result<()> {
    let graph = seeded().await?;
    let mut p = plan();
    p.mode = PlannedMode::FullText;
    p.text = Some("red sangiovese".into());
    p.filters = vec![FilterClause { field: FilterField::Price, op: ClauseOp::Range { min: None, max: Some(50.0.into()) } }];
    let out = graph.query(&p).await?;
    // wine 2 has no price, so the range cannot hold
    assert_eq!(ids(&out), vec![1, 3, 5]);
    assert!(out.hits.iter().all(|h| h.score.is_some()));
    Ok(())
}

#[tokio::test]
async fn counts_and_groups() -> anyhow::Result<()> {
    let graph = seeded().await?;
    let mut p = plan();
    p.filters = vec![FilterClause { field: FilterField::Points, op: ClauseOp::Range { min: Some(88i64.into()), max: None } }];
    p.aggregation = Some(Aggregation::Count);
    assert_eq!(graph.query(&p).await?.aggregation, Some(AggregationResult::Count(4)));

    p.mode = PlannedMode::FullText;
    p.text = Some("red".into());
    p.aggregation = Some(Aggregation::CountBy(GroupField::Country));
    let out = graph.query(&p).await?;
    assert!(out.hits.is_empty());
    assert_eq!(
        out.aggregation,
        Some(AggregationResult::Groups(vec![
            GroupCount { key: "Italy".into(), count: 2 },
            GroupCount { key: "Portugal".into(), count: 1 },
        ]))
    );
    Ok(())
}

#[tokio::test]
async fn vector_plans_are_rejected() -> anyhow::Result<()> {
    let graph = seeded().await?;
    let mut p = plan();
    p.mode = PlannedMode::Semantic;
    p.vector = Some(vec![0.0; 4]);
    assert!(graph.query(&p).await.is_err());
    Ok(())
}

#[tokio::test]
async fn explain_renders_cypher() -> anyhow::Result<()> {
    let graph = GraphAdapter::new();
    let mut p = plan();
    p.mode = PlannedMode::FullText;
    p.text = Some("tuscany red".into());
    p.filters = vec![FilterClause { field: FilterField::Country, op: ClauseOp::Eq("Italy".into()) }];
    let text = graph.explain(&p)?;
    assert!(text.contains("db.index.fulltext.queryNodes"));
    assert!(text.contains("tolower(c.countryName) = tolower($country)"));
    assert!(text.contains("coalesce(wine.price"));
    Ok(())
}
