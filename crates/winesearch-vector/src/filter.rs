use serde_json::{json, Value};

use winesearch_core::query::{ClauseOp, FilterClause};

/// One `must` condition per clause.
pub fn condition(clause: &FilterClause) -> Value {
    let key = clause.field.as_str();
    match &clause.op {
        ClauseOp::Eq(v) => json!({ "key": key, "match": { "value": v } }),
        ClauseOp::In(options) => json!({ "key": key, "match": { "any": options } }),
        ClauseOp::Range { min, max } => {
            let mut range = serde_json::Map::new();
            if let Some(min) = min {
                range.insert("gte".into(), json!(min));
            }
            if let Some(max) = max {
                range.insert("lte".into(), json!(max));
            }
            json!({ "key": key, "range": range })
        }
    }
}

pub fn to_filter(clauses: &[FilterClause]) -> Option<Value> {
    if clauses.is_empty() {
        return None;
    }
    Some(json!({ "must": clauses.iter().map(condition).collect::<Vec<_>>() }))
}
