//! Filter expression strings: `country = "Italy" AND price <= 50`.
use winesearch_core::query::{ClauseOp, FilterClause, FilterValue};

fn literal(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}

pub fn clause_expression(clause: &FilterClause) -> Option<String> {
    let field = clause.field.as_str();
    match &clause.op {
        ClauseOp::Eq(v) => Some(format!("{} = {}", field, literal(v))),
        ClauseOp::In(options) => {
            let items: Vec<String> = options.iter().map(literal).collect();
            Some(format!("{} IN [{}]", field, items.join(", ")))
        }
        ClauseOp::Range { min: Some(min), max: Some(max) } => {
            Some(format!("{} {} TO {}", field, literal(min), literal(max)))
        }
        ClauseOp::Range { min: Some(min), max: None } => Some(format!("{} >= {}", field, literal(min))),
        ClauseOp::Range { min: None, max: Some(max) } => Some(format!("{} <= {}", field, literal(max))),
        ClauseOp::Range { min: None, max: None } => None,
    }
}

pub fn filter_expression(clauses: &[FilterClause]) -> Option<String> {
    let parts: Vec<String> = clauses.iter().filter_map(clause_expression).collect();
    (!parts.is_empty()).then(|| parts.join(" AND "))
}
