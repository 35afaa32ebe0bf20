//! `QueryPlan` lowering: to a Tantivy query tree for execution, and to a
//! bool-query JSON document for `explain`.

use serde_json::{json, Value as Json};
use std::ops::Bound;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::{Index, Term};

use winesearch_core::error::BackendError;
use winesearch_core::query::{
    Aggregation, ClauseOp, FieldKind, FilterClause, FilterValue, PlannedMode, QueryPlan, SortBy,
};

use crate::schema::Fields;

pub fn to_query(index: &Index, fields: &Fields, plan: &QueryPlan) -> Result<Box<dyn Query>, BackendError> {
    let mut must: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    match plan.mode {
        PlannedMode::FullText => {
            let text = plan.text.as_deref().unwrap_or_default();
            let parser = QueryParser::for_index(index, fields.full_text());
            let (query, errors) = parser.parse_query_lenient(text);
            if !errors.is_empty() {
                tracing::debug!(errors = errors.len(), "lenient parse dropped query fragments");
            }
            must.push((Occur::Must, query));
        }
        PlannedMode::FilterOnly => {}
        PlannedMode::Semantic | PlannedMode::Hybrid { .. } => {
            return Err(BackendError::permanent("vector similarity is not available on the inverted index"));
        }
    }
    for clause in &plan.filters {
        must.push((Occur::Must, clause_query(fields, clause)?));
    }
    if must.is_empty() {
        return Ok(Box::new(AllQuery));
    }
    Ok(Box::new(BooleanQuery::new(must)))
}

fn clause_query(fields: &Fields, clause: &FilterClause) -> Result<Box<dyn Query>, BackendError> {
    let field = fields.filter(clause.field);
    let kind = clause.field.kind();
    match &clause.op {
        ClauseOp::Eq(v) => Ok(Box::new(TermQuery::new(term(field, kind, v)?, IndexRecordOption::Basic))),
        ClauseOp::In(values) => {
            let mut should: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(values.len());
            for v in values {
                should.push((Occur::Should, Box::new(TermQuery::new(term(field, kind, v)?, IndexRecordOption::Basic))));
            }
            Ok(Box::new(BooleanQuery::new(should)))
        }
        ClauseOp::Range { min, max } => {
            let lower = bound(field, kind, min.as_ref(), true)?;
            let upper = bound(field, kind, max.as_ref(), false)?;
            Ok(Box::new(RangeQuery::new(lower, upper)))
        }
    }
}

fn term(field: Field, kind: FieldKind, value: &FilterValue) -> Result<Term, BackendError> {
    match (kind, value) {
        (FieldKind::Categorical, FilterValue::Text(s)) => Ok(Term::from_field_text(field, &s.to_lowercase())),
        (FieldKind::Integer, FilterValue::Int(v)) => Ok(Term::from_field_i64(field, *v)),
        (FieldKind::Float, v) => v
            .as_f64()
            .map(|f| Term::from_field_f64(field, f))
            .ok_or_else(|| BackendError::permanent(format!("'{}' is not a number", v))),
        (_, v) => Err(BackendError::permanent(format!("value '{}' does not match the field type", v))),
    }
}

fn bound(field: Field, kind: FieldKind, value: Option<&FilterValue>, lower: bool) -> Result<Bound<Term>, BackendError> {
    let Some(value) = value else { return Ok(Bound::Unbounded) };
    let f = value
        .as_f64()
        .ok_or_else(|| BackendError::permanent(format!("range bound '{}' is not a number", value)))?;
    match kind {
        FieldKind::Integer => {
            let v = (if lower { f.ceil() } else { f.floor() }) as i64;
            Ok(Bound::Included(Term::from_field_i64(field, v)))
        }
        FieldKind::Float => Ok(Bound::Included(Term::from_field_f64(field, f))),
        FieldKind::Categorical => Err(BackendError::permanent("range over a categorical field")),
    }
}

/// Bool-query document equivalent to the executed query.
pub fn to_dsl(plan: &QueryPlan) -> Json {
    let mut must = Vec::new();
    if let (PlannedMode::FullText, Some(text)) = (plan.mode, plan.text.as_deref()) {
        must.push(json!({ "multi_match": { "query": text, "fields": ["title", "description", "variety"] } }));
    }
    let filter: Vec<Json> = plan.filters.iter().map(clause_dsl).collect();
    let mut body = json!({
        "query": { "bool": { "must": must, "filter": filter } },
        "from": plan.offset,
        "size": plan.limit,
    });
    if plan.sort == SortBy::PointsDesc {
        body["sort"] = json!([{ "points": { "order": "desc" } }]);
    }
    match plan.aggregation {
        Some(Aggregation::Count) => body["size"] = json!(0),
        Some(Aggregation::CountBy(group)) => {
            body["size"] = json!(0);
            body["aggs"] = json!({ "groups": { "terms": { "field": group.as_str() } } });
        }
        None => {}
    }
    body
}

fn clause_dsl(clause: &FilterClause) -> Json {
    let name = clause.field.as_str();
    match &clause.op {
        ClauseOp::Eq(v) => keyed("term", keyed(name, json!(v))),
        ClauseOp::In(vs) => keyed("terms", keyed(name, json!(vs))),
        ClauseOp::Range { min, max } => {
            let mut range = serde_json::Map::new();
            if let Some(min) = min {
                range.insert("gte".into(), json!(min));
            }
            if let Some(max) = max {
                range.insert("lte".into(), json!(max));
            }
            keyed("range", keyed(name, Json::Object(range)))
        }
    }
}

fn keyed(key: &str, value: Json) -> Json {
    let mut map = serde_json::Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}
