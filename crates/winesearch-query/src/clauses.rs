use std::collections::BTreeMap;

use winesearch_core::error::QueryError;
use winesearch_core::query::{ClauseOp, Constraint, FieldKind, FilterClause, FilterField, FilterValue};

fn invalid(msg: impl Into<String>) -> QueryError {
    QueryError::InvalidRequest(msg.into())
}

/// Coerces one caller value to the field's declared type.
fn typed_value(field: FilterField, value: &FilterValue) -> Result<FilterValue, QueryError> {
    match (field.kind(), value) {
        (FieldKind::Categorical, FilterValue::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(invalid(format!("{field} needs a non-empty value")));
            }
            Ok(FilterValue::Text(s.to_string()))
        }
        (FieldKind::Categorical, _) => Err(invalid(format!("{field} expects text, got {value}"))),
        (FieldKind::Integer, FilterValue::Int(v)) => Ok(FilterValue::Int(*v)),
        (FieldKind::Integer, FilterValue::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
            Ok(FilterValue::Int(*f as i64))
        }
        (FieldKind::Integer, FilterValue::Text(s)) => {
            let parsed = s.trim().parse::<i64>();
            parsed.map(FilterValue::Int).map_err(|_| invalid(format!("{field} expects an integer, got '{s}'")))
        }
        (FieldKind::Integer, _) => Err(invalid(format!("{field} expects an integer, got {value}"))),
        (FieldKind::Float, FilterValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(FilterValue::Float)
            .ok_or_else(|| invalid(format!("{field} expects a number, got '{s}'"))),
        (FieldKind::Float, v) => v
            .as_f64()
            .filter(|f| f.is_finite())
            .map(FilterValue::Float)
            .ok_or_else(|| invalid(format!("{field} expects a number"))),
    }
}

/// Inclusive bounds typed for the field. Integer fields round inward so a
/// bound of 87.5 points admits 88 and above.
fn typed_bound(field: FilterField, bound: Option<f64>, lower: bool) -> Result<Option<FilterValue>, QueryError> {
    let Some(b) = bound else { return Ok(None) };
    if !b.is_finite() {
        return Err(invalid(format!("{field} bound must be finite")));
    }
    Ok(Some(match field.kind() {
        FieldKind::Integer => FilterValue::Int((if lower { b.ceil() } else { b.floor() }) as i64),
        _ => FilterValue::Float(b),
    }))
}

/// Builds typed clauses from the request's filters, in field order.
pub fn build(filters: &BTreeMap<FilterField, Constraint>) -> Result<Vec<FilterClause>, QueryError> {
    filters
        .iter()
        .map(|(&field, constraint)| {
            let op = match constraint {
                Constraint::Eq(v) => ClauseOp::Eq(typed_value(field, v)?),
                Constraint::In(values) => {
                    if values.is_empty() {
                        return Err(invalid(format!("{field} IN needs at least one value")));
                    }
                    ClauseOp::In(values.iter().map(|v| typed_value(field, v)).collect::<Result<_, _>>()?)
                }
                Constraint::Range { min, max } => {
                    if field.kind() == FieldKind::Categorical {
                        return Err(invalid(format!("{field} is categorical and cannot take a range")));
                    }
                    if min.is_none() && max.is_none() {
                        return Err(invalid(format!("range on {field} has no bounds")));
                    }
                    if let (Some(lo), Some(hi)) = (min, max) {
                        if lo > hi {
                            return Err(invalid(format!("range on {field} is empty: {lo} > {hi}")));
                        }
                    }
                    ClauseOp::Range { min: typed_bound(field, *min, true)?, max: typed_bound(field, *max, false)? }
                }
            };
            Ok(FilterClause { field, op })
        })
        .collect()
}
