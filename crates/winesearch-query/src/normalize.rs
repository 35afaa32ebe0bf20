use serde_json::{Map, Value};

use winesearch_core::query::RawHit;
use winesearch_core::types::{ScoredWine, WineId};

/// Attribute spellings used across the backend schemas, canonical first.
const ID: &[&str] = &["id", "wineID", "wine_id"];
const COUNTRY: &[&str] = &["country", "countryName"];
const PROVINCE: &[&str] = &["province", "provinceName"];
const TITLE: &[&str] = &["title"];
const DESCRIPTION: &[&str] = &["description"];
const POINTS: &[&str] = &["points"];
const PRICE: &[&str] = &["price"];
const VARIETY: &[&str] = &["variety"];
const WINERY: &[&str] = &["winery"];

fn lookup<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| fields.get(*n)).filter(|v| !v.is_null())
}

/// Trimmed text; empty strings and the literal `null` are absent.
fn text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    let s = match lookup(fields, names)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty() && !s.eq_ignore_ascii_case("null")).then_some(s)
}

fn integer(fields: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    match lookup(fields, names)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `"Not available"`, missing, non-numeric and non-positive prices are all
/// an unknown price.
fn price(fields: &Map<String, Value>) -> Option<f64> {
    let p = match lookup(fields, PRICE)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_start_matches('$').parse().ok()?,
        _ => return None,
    };
    (p.is_finite() && p > 0.0).then_some(p)
}

/// Maps a backend hit to the canonical projection. Hits without a usable id
/// are dropped by the caller.
pub fn scored_wine(hit: &RawHit) -> Option<ScoredWine> {
    let f = &hit.fields;
    let id: WineId = integer(f, ID)?;
    let points = integer(f, POINTS).and_then(|p| u8::try_from(p).ok()).filter(|p| *p <= 100).unwrap_or(0);
    Some(ScoredWine {
        id,
        country: text(f, COUNTRY).unwrap_or_else(|| "Unknown".to_string()),
        province: text(f, PROVINCE),
        title: text(f, TITLE).unwrap_or_default(),
        description: text(f, DESCRIPTION),
        points,
        price: price(f),
        variety: text(f, VARIETY),
        winery: text(f, WINERY),
        score: hit.score.unwrap_or(0.0),
    })
}
