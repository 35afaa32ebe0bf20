//! Cypher rendering of query plans and the schema/merge statements.
use serde_json::{json, Map, Value};

use winesearch_core::query::{Aggregation, ClauseOp, FilterClause, FilterField, GroupField, PlannedMode, QueryPlan, SortBy};

pub const SCHEMA_STATEMENTS: [&str; 5] = [
    "CREATE CONSTRAINT countryName IF NOT EXISTS FOR (c:Country) REQUIRE c.countryName IS UNIQUE",
    "CREATE CONSTRAINT wineID IF NOT EXISTS FOR (w:Wine) REQUIRE w.wineID IS UNIQUE",
    "CREATE INDEX provinceName IF NOT EXISTS FOR (p:Province) ON (p.provinceName)",
    "CREATE INDEX tasterName IF NOT EXISTS FOR (p:Person) ON (p.tasterName)",
    "CREATE FULLTEXT INDEX searchText IF NOT EXISTS FOR (w:Wine) ON EACH [w.title, w.description, w.variety]",
];

pub const MERGE_WINES: &str = "UNWIND $records AS record
MERGE (wine:Wine {wineID: record.id})
  SET wine += {title: record.title, description: record.description, points: record.points,
               price: record.price, variety: record.variety, winery: record.winery}
FOREACH (_ IN CASE WHEN record.taster_name IS NULL THEN [] ELSE [1] END |
  MERGE (taster:Person {tasterName: record.taster_name})
  MERGE (wine)-[:TASTED_BY]->(taster))
MERGE (country:Country {countryName: record.country})
MERGE (wine)-[:IS_FROM_COUNTRY]->(country)
FOREACH (_ IN CASE WHEN record.province IS NULL THEN [] ELSE [1] END |
  MERGE (province:Province {provinceName: record.province})
  MERGE (wine)-[:IS_FROM_PROVINCE]->(province)
  MERGE (province)-[:IS_LOCATED_IN]->(country))";

/// One parameterised statement, shaped like a transactional-endpoint payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Map<String, Value>,
}

impl Statement {
    pub fn to_json(&self) -> Value {
        json!({ "statement": self.text, "parameters": self.params })
    }
}

fn property(field: FilterField) -> &'static str {
    match field {
        FilterField::Id => "wine.wineID",
        FilterField::Country => "c.countryName",
        FilterField::Province => "p.provinceName",
        FilterField::Variety => "wine.variety",
        FilterField::Winery => "wine.winery",
        FilterField::TasterName => "t.tasterName",
        FilterField::Points => "wine.points",
        FilterField::Price => "wine.price",
    }
}

fn group_property(group: GroupField) -> &'static str {
    match group {
        GroupField::Country => "c.countryName",
        GroupField::Province => "p.provinceName",
        GroupField::Variety => "wine.variety",
    }
}

fn condition(clause: &FilterClause, params: &mut Map<String, Value>) -> String {
    let name = clause.field.as_str();
    let prop = property(clause.field);
    let textual = clause.field.kind() == winesearch_core::query::FieldKind::Categorical;
    match &clause.op {
        ClauseOp::Eq(v) => {
            params.insert(name.to_string(), json!(v));
            if textual {
                format!("tolower({prop}) = tolower(${name})")
            } else {
                format!("{prop} = ${name}")
            }
        }
        ClauseOp::In(options) => {
            let list: Vec<Value> = options
                .iter()
                .map(|o| match o.as_text() {
                    Some(s) => Value::from(s.to_lowercase()),
                    None => json!(o),
                })
                .collect();
            params.insert(name.to_string(), Value::Array(list));
            if textual {
                format!("tolower({prop}) IN ${name}")
            } else {
                format!("{prop} IN ${name}")
            }
        }
        ClauseOp::Range { min, max } => {
            let mut parts = Vec::new();
            if let Some(min) = min {
                params.insert(format!("min_{name}"), json!(min));
                parts.push(format!("{prop} >= $min_{name}"));
            }
            if let Some(max) = max {
                params.insert(format!("max_{name}"), json!(max));
                parts.push(format!("{prop} <= $max_{name}"));
            }
            parts.join(" AND ")
        }
    }
}

/// Renders a plan as one Cypher read statement.
pub fn render(plan: &QueryPlan) -> Statement {
    let mut params = Map::new();
    let mut lines = Vec::new();

    let text = plan.text.as_deref().filter(|_| plan.mode == PlannedMode::FullText);
    match text {
        Some(terms) => {
            params.insert("terms".into(), Value::from(terms));
            lines.push("CALL db.index.fulltext.queryNodes(\"searchText\", $terms) YIELD node AS wine, score".into());
        }
        None => lines.push("MATCH (wine:Wine)".into()),
    }
    lines.push("MATCH (wine)-[:IS_FROM_COUNTRY]->(c:Country)".into());

    let filters_on = |f: FilterField| plan.filters.iter().any(|c| c.field == f);
    if filters_on(FilterField::Province) {
        lines.push("MATCH (wine)-[:IS_FROM_PROVINCE]->(p:Province)-[:IS_LOCATED_IN]->(c)".into());
    } else {
        lines.push("OPTIONAL MATCH (wine)-[:IS_FROM_PROVINCE]->(p:Province)".into());
    }
    if filters_on(FilterField::TasterName) {
        lines.push("MATCH (wine)-[:TASTED_BY]->(t:Person)".into());
    }

    let conditions: Vec<String> = plan
        .filters
        .iter()
        .map(|c| condition(c, &mut params))
        .filter(|c| !c.is_empty())
        .collect();
    if !conditions.is_empty() {
        lines.push(format!("WHERE {}", conditions.join(" AND ")));
    }

    match plan.aggregation {
        Some(Aggregation::Count) => lines.push("RETURN count(DISTINCT wine) AS wineCount".into()),
        Some(Aggregation::CountBy(group)) => {
            params.insert("limit".into(), Value::from(plan.limit));
            lines.push(format!(
                "RETURN {} AS {}, count(DISTINCT wine) AS wineCount",
                group_property(group),
                group.as_str()
            ));
            lines.push(format!("ORDER BY wineCount DESC, {} ASC LIMIT $limit", group.as_str()));
        }
        None => {
            let score = if text.is_some() { ",\n  score" } else { "" };
            lines.push(format!(
                "RETURN\n  wine.wineID AS wineID,\n  c.countryName AS countryName,\n  p.provinceName AS provinceName,\n  \
                 wine.title AS title,\n  wine.description AS description,\n  wine.variety AS variety,\n  \
                 wine.winery AS winery,\n  wine.points AS points,\n  \
                 coalesce(wine.price, \"Not available\") AS price{score}"
            ));
            let order = match (plan.sort, text.is_some()) {
                (SortBy::PointsDesc, _) => "points DESC, wineID ASC",
                (SortBy::Relevance, true) => "score DESC, wineID ASC",
                (SortBy::Relevance, false) => "wineID ASC",
            };
            params.insert("offset".into(), Value::from(plan.offset));
            params.insert("limit".into(), Value::from(plan.limit));
            lines.push(format!("ORDER BY {order} SKIP $offset LIMIT $limit"));
        }
    }

    Statement { text: lines.join("\n"), params }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winesearch_core::query::FilterValue;

    #[test]
    fn province_filter_walks_to_country() {
        let plan = QueryPlan {
            sort: SortBy::PointsDesc,
            ..QueryPlan::filter_only(
                vec![FilterClause { field: FilterField::Province, op: ClauseOp::Eq("Tuscany".into()) }],
                5,
            )
        };
        let st = render(&plan);
        assert!(st.text.contains("-[:IS_LOCATED_IN]->(c)"));
        assert!(st.text.contains("WHERE tolower(p.provinceName) = tolower($province)"));
        assert!(st.text.ends_with("ORDER BY points DESC, wineID ASC SKIP $offset LIMIT $limit"));
        assert_eq!(st.params["province"], Value::from("Tuscany"));
    }

    #[test]
    fn ranges_get_bound_parameters() {
        let plan = QueryPlan::filter_only(
            vec![FilterClause {
                field: FilterField::Price,
                op: ClauseOp::Range { min: None, max: Some(FilterValue::Float(50.0)) },
            }],
            5,
        );
        let st = render(&plan);
        assert!(st.text.contains("WHERE wine.price <= $max_price"));
        assert_eq!(st.params["max_price"], Value::from(50.0));
    }
}
