//! Raw JSON → `WineRecord`, collecting every field problem before rejecting.
//! Only required fields can reject a record; malformed optional fields are
//! nulled.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FieldIssue, ValidationError};
use crate::types::{WineId, WineRecord};

const UNKNOWN_COUNTRY: &str = "Unknown";

/// Validates and coerces one raw record. Pure; validating the canonical form
/// of an accepted record yields the same record.
pub fn validate(raw: &Value) -> Result<WineRecord, ValidationError> {
    let Some(obj) = raw.as_object() else {
        return Err(ValidationError {
            id: None,
            issues: vec![FieldIssue { field: "record".into(), problem: "is not a JSON object".into() }],
        });
    };

    let mut issues = Vec::new();
    let id = required(&mut issues, "id", integer(obj, "id"));
    let title = required(&mut issues, "title", text(obj, "title"));
    let variety = required(&mut issues, "variety", text(obj, "variety"));
    let winery = required(&mut issues, "winery", text(obj, "winery"));
    let points = match required(&mut issues, "points", integer(obj, "points")) {
        Some(p) if (0..=100).contains(&p) => u8::try_from(p).ok(),
        Some(p) => {
            issues.push(issue("points", format!("{} is outside 0..=100", p)));
            None
        }
        None => None,
    };

    let optional = |key: &str| match text(obj, key) {
        Ok(v) => v,
        Err(problem) => {
            debug!(id = ?id, field = key, %problem, "optional field nulled");
            None
        }
    };
    let description = optional("description");
    let province = optional("province");
    let taster_name = optional("taster_name");
    let taster_twitter_handle = optional("taster_twitter_handle");
    let vineyard = optional("designation").or_else(|| optional("vineyard"));
    let region_1 = optional("region_1");
    let region_2 = optional("region_2");
    let country = optional("country").unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());

    match (id, title, variety, winery, points) {
        (Some(id), Some(title), Some(variety), Some(winery), Some(points)) if issues.is_empty() => {
            Ok(WineRecord {
                id,
                title,
                description,
                variety,
                country,
                province,
                winery,
                points,
                price: price(obj.get("price")),
                taster_name,
                taster_twitter_handle,
                vineyard,
                region_1,
                region_2,
            })
        }
        _ => Err(ValidationError { id: id.or_else(|| loose_id(obj)), issues }),
    }
}

fn issue(field: &str, problem: impl Into<String>) -> FieldIssue {
    FieldIssue { field: field.to_string(), problem: problem.into() }
}

/// Records a "missing" issue when the field had no value.
fn required<T>(issues: &mut Vec<FieldIssue>, field: &str, value: Result<Option<T>, String>) -> Option<T> {
    match value {
        Ok(Some(v)) => Some(v),
        Ok(None) => {
            issues.push(issue(field, "is missing"));
            None
        }
        Err(problem) => {
            issues.push(issue(field, problem));
            None
        }
    }
}

fn is_null_text(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("null")
}

/// Trimmed string; numbers and booleans are rendered as text, empty and
/// `"null"` are absent.
fn text(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if is_null_text(t) { None } else { Some(t.to_string()) })
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(format!("expected text, found {}", kind_of(other))),
    }
}

fn integer(obj: &Map<String, Value>, key: &str) -> Result<Option<i64>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => Ok(Some(v)),
            None => n.as_f64().map(integral).ok_or_else(|| format!("{} is not an integer", n))?.map(Some),
        },
        Some(Value::String(s)) => {
            let t = s.trim();
            if is_null_text(t) {
                return Ok(None);
            }
            if let Ok(v) = t.parse::<i64>() {
                return Ok(Some(v));
            }
            match t.parse::<f64>() {
                Ok(f) => integral(f).map(Some),
                Err(_) => Err(format!("'{}' is not a number", t)),
            }
        }
        Some(other) => Err(format!("expected an integer, found {}", kind_of(other))),
    }
}

fn integral(f: f64) -> Result<i64, String> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Ok(f as i64)
    } else {
        Err(format!("{} is not an integer", f))
    }
}

/// Lenient price parsing: anything that is not a positive finite number is
/// an unknown price.
fn price(value: Option<&Value>) -> Option<f64> {
    let p = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_start_matches('$').parse::<f64>().ok()?,
        _ => return None,
    };
    (p.is_finite() && p > 0.0).then_some(p)
}

/// Best-effort id of a raw record that may not validate.
pub fn raw_id(raw: &Value) -> Option<WineId> {
    raw.as_object().and_then(loose_id)
}

fn loose_id(obj: &Map<String, Value>) -> Option<WineId> {
    match obj.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_numeric_strings_and_integral_floats() {
        let rec = validate(&json!({
            "id": "12", "title": " T ", "variety": "Red Blend", "winery": 7,
            "points": 87.0, "price": "15.5"
        }))
        .unwrap();
        assert_eq!(rec.id, 12);
        assert_eq!(rec.title, "T");
        assert_eq!(rec.winery, "7");
        assert_eq!(rec.points, 87);
        assert_eq!(rec.price, Some(15.5));
        assert_eq!(rec.country, "Unknown");
    }

    #[test]
    fn collects_every_issue() {
        let err = validate(&json!({"id": 3, "points": 87.5, "title": ["x"]})).unwrap_err();
        assert_eq!(err.id, Some(3));
        for field in ["title", "points", "variety", "winery"] {
            assert!(err.has_issue(field), "missing issue for {field}: {err}");
        }
    }

    #[test]
    fn null_spellings_for_optionals() {
        let rec = validate(&json!({
            "id": 1, "title": "t", "variety": "v", "winery": "w", "points": 90,
            "province": "null", "description": "  ", "price": 0
        }))
        .unwrap();
        assert_eq!(rec.province, None);
        assert_eq!(rec.description, None);
        assert_eq!(rec.price, None);
    }

    #[test]
    fn malformed_optionals_are_nulled() {
        let rec = validate(&json!({
            "id": 1, "title": "t", "variety": "v", "winery": "w", "points": 90,
            "province": {"x": 1}, "country": ["Italy"]
        }))
        .unwrap();
        assert_eq!(rec.province, None);
        assert_eq!(rec.country, "Unknown");
    }

    #[test]
    fn non_object_is_rejected() {
        let err = validate(&Value::String("{broken".into())).unwrap_err();
        assert_eq!(err.id, None);
        assert!(err.has_issue("record"));
    }
}
