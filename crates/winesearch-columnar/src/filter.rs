//! Filter clauses rendered as a Lance SQL where-clause.

use winesearch_core::query::{ClauseOp, FilterClause, FilterValue};

fn literal(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        FilterValue::Int(v) => v.to_string(),
        FilterValue::Float(v) => v.to_string(),
    }
}

fn number(value: &FilterValue) -> Option<String> {
    value.as_f64().map(|v| v.to_string())
}

pub fn clause_sql(clause: &FilterClause) -> String {
    let column = clause.field.as_str();
    match &clause.op {
        ClauseOp::Eq(v) => format!("{} = {}", column, literal(v)),
        ClauseOp::In(values) => {
            let list: Vec<String> = values.iter().map(literal).collect();
            format!("{} IN ({})", column, list.join(", "))
        }
        ClauseOp::Range { min, max } => {
            let mut parts = Vec::new();
            if let Some(min) = min.as_ref().and_then(number) {
                parts.push(format!("{} >= {}", column, min));
            }
            if let Some(max) = max.as_ref().and_then(number) {
                parts.push(format!("{} <= {}", column, max));
            }
            if parts.is_empty() {
                format!("{} IS NOT NULL", column)
            } else {
                parts.join(" AND ")
            }
        }
    }
}

/// `None` when there is nothing to filter on.
pub fn where_clause(filters: &[FilterClause]) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    Some(filters.iter().map(clause_sql).collect::<Vec<_>>().join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use winesearch_core::query::FilterField;

    #[test]
    fn renders_conjunction_with_escaping() {
        let filters = vec![
            FilterClause { field: FilterField::Winery, op: ClauseOp::Eq("Chateau d'Yquem".into()) },
            FilterClause { field: FilterField::Price, op: ClauseOp::Range { min: None, max: Some(50.0.into()) } },
            FilterClause { field: FilterField::Points, op: ClauseOp::Range { min: Some(88i64.into()), max: None } },
        ];
        assert_eq!(
            where_clause(&filters).as_deref(),
            Some("winery = 'Chateau d''Yquem' AND price <= 50 AND points >= 88")
        );
        assert_eq!(where_clause(&[]), None);
    }

    #[test]
    fn in_lists() {
        let clause = FilterClause {
            field: FilterField::Country,
            op: ClauseOp::In(vec!["Italy".into(), "France".into()]),
        };
        assert_eq!(clause_sql(&clause), "country IN ('Italy', 'France')");
    }
}
