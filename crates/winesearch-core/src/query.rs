//! Canonical query model: the caller-facing `SearchRequest`, the typed
//! `QueryPlan` handed to adapters, and the adapters' raw responses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{AggregationResult, WineRecord};

/// Declared type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Categorical,
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Id,
    Country,
    Province,
    Variety,
    Winery,
    TasterName,
    Points,
    Price,
}

impl FilterField {
    pub fn kind(self) -> FieldKind {
        match self {
            FilterField::Id | FilterField::Points => FieldKind::Integer,
            FilterField::Price => FieldKind::Float,
            FilterField::Country
            | FilterField::Province
            | FilterField::Variety
            | FilterField::Winery
            | FilterField::TasterName => FieldKind::Categorical,
        }
    }

    /// Canonical attribute name, shared by every backend schema.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterField::Id => "id",
            FilterField::Country => "country",
            FilterField::Province => "province",
            FilterField::Variety => "variety",
            FilterField::Winery => "winery",
            FilterField::TasterName => "taster_name",
            FilterField::Points => "points",
            FilterField::Price => "price",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FilterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Int(v) => Some(*v as f64),
            FilterValue::Float(v) => Some(*v),
            FilterValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Int(v) => write!(f, "{}", v),
            FilterValue::Float(v) => write!(f, "{}", v),
            FilterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

/// Caller-side constraint on one field. Range bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Eq(FilterValue),
    Range { min: Option<f64>, max: Option<f64> },
    In(Vec<FilterValue>),
}

impl Constraint {
    pub fn at_least(min: f64) -> Self {
        Constraint::Range { min: Some(min), max: None }
    }

    pub fn at_most(max: f64) -> Self {
        Constraint::Range { min: None, max: Some(max) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum MatchMode {
    /// Semantic when the backend is vector-capable, full-text otherwise.
    #[default]
    Auto,
    FullText,
    Semantic,
    /// `alpha` weights the vector score, `1 - alpha` the keyword score.
    Hybrid { alpha: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    PointsDesc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Offset(usize),
    Cursor(String),
}

impl Default for Page {
    fn default() -> Self {
        Page::Offset(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Country,
    Province,
    Variety,
}

impl GroupField {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupField::Country => "country",
            GroupField::Province => "province",
            GroupField::Variety => "variety",
        }
    }

    pub fn key_of(self, record: &WineRecord) -> Option<&str> {
        match self {
            GroupField::Country => Some(record.country.as_str()),
            GroupField::Province => record.province.as_deref(),
            GroupField::Variety => Some(record.variety.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    CountBy(GroupField),
}

/// Opaque paging token handed back in `SearchResult::next_cursor`.
pub struct Cursor;

impl Cursor {
    const PREFIX: &'static str = "wsc1.";

    pub fn encode(offset: usize) -> String {
        format!("{}{:x}", Self::PREFIX, offset)
    }

    pub fn decode(token: &str) -> Option<usize> {
        token.strip_prefix(Self::PREFIX).and_then(|hex| usize::from_str_radix(hex, 16).ok())
    }
}

/// One canonical query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchRequest {
    pub terms: Option<String>,
    pub filters: BTreeMap<FilterField, Constraint>,
    pub limit: Option<usize>,
    pub page: Page,
    pub mode: MatchMode,
    pub sort: SortBy,
    pub aggregate: Option<Aggregation>,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terms(mut self, terms: impl Into<String>) -> Self {
        self.terms = Some(terms.into());
        self
    }

    pub fn filter(mut self, field: FilterField, constraint: Constraint) -> Self {
        self.filters.insert(field, constraint);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.page = Page::Offset(offset);
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.page = Page::Cursor(cursor.into());
        self
    }

    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn sort(mut self, sort: SortBy) -> Self {
        self.sort = sort;
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregate = Some(aggregation);
        self
    }

    pub fn search(terms: &str) -> Self {
        Self::new().terms(terms)
    }

    pub fn search_by_country(terms: &str, country: &str) -> Self {
        Self::search(terms).filter(FilterField::Country, Constraint::Eq(country.into()))
    }

    pub fn search_by_filters(terms: &str, country: &str, min_points: u8, max_price: f64) -> Self {
        Self::search_by_country(terms, country)
            .filter(FilterField::Points, Constraint::at_least(f64::from(min_points)))
            .filter(FilterField::Price, Constraint::at_most(max_price))
    }

    pub fn top_by_country(country: &str) -> Self {
        Self::new()
            .filter(FilterField::Country, Constraint::Eq(country.into()))
            .sort(SortBy::PointsDesc)
    }

    pub fn top_by_province(province: &str) -> Self {
        Self::new()
            .filter(FilterField::Province, Constraint::Eq(province.into()))
            .sort(SortBy::PointsDesc)
    }

    pub fn count_by_country(country: &str) -> Self {
        Self::new()
            .filter(FilterField::Country, Constraint::Eq(country.into()))
            .aggregate(Aggregation::Count)
    }

    pub fn count_by_filters(country: &str, min_points: u8, max_price: f64) -> Self {
        Self::count_by_country(country)
            .filter(FilterField::Points, Constraint::at_least(f64::from(min_points)))
            .filter(FilterField::Price, Constraint::at_most(max_price))
    }

    /// Countries holding the most wines of a variety at or above `min_points`.
    pub fn most_by_variety(variety: &str, min_points: u8) -> Self {
        Self::new()
            .terms(variety)
            .mode(MatchMode::FullText)
            .filter(FilterField::Points, Constraint::at_least(f64::from(min_points)))
            .aggregate(Aggregation::CountBy(GroupField::Country))
    }
}

/// Named-parameter surface exposed to outer layers (HTTP, CLI).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub terms: Option<String>,
    pub country: Option<String>,
    pub max_price: Option<f64>,
    pub min_points: Option<u8>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub cursor: Option<String>,
}

impl From<SearchParams> for SearchRequest {
    fn from(p: SearchParams) -> Self {
        let mut req = SearchRequest::new();
        if let Some(terms) = p.terms.filter(|t| !t.trim().is_empty()) {
            req = req.terms(terms);
        }
        if let Some(country) = p.country {
            req = req.filter(FilterField::Country, Constraint::Eq(FilterValue::Text(country)));
        }
        if let Some(max_price) = p.max_price {
            req = req.filter(FilterField::Price, Constraint::at_most(max_price));
        }
        if let Some(min_points) = p.min_points {
            req = req.filter(FilterField::Points, Constraint::at_least(f64::from(min_points)));
        }
        req.limit = p.limit;
        req.page = match (p.cursor, p.offset) {
            (Some(cursor), _) => Page::Cursor(cursor),
            (None, Some(offset)) => Page::Offset(offset),
            (None, None) => Page::Offset(0),
        };
        req
    }
}

/// Typed, capability-checked operation on one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseOp {
    Eq(FilterValue),
    Range { min: Option<FilterValue>, max: Option<FilterValue> },
    In(Vec<FilterValue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Exact,
    IgnoreCase,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterClause {
    pub field: FilterField,
    pub op: ClauseOp,
}

impl FilterClause {
    pub fn matches(&self, record: &WineRecord) -> bool {
        self.matches_with(record, TextMatch::Exact)
    }

    /// Evaluates the clause against a record. A record without a value for the
    /// field never matches.
    pub fn matches_with(&self, record: &WineRecord, text: TextMatch) -> bool {
        let Some(value) = record.field_value(self.field) else { return false };
        match &self.op {
            ClauseOp::Eq(expected) => values_equal(&value, expected, text),
            ClauseOp::In(options) => options.iter().any(|o| values_equal(&value, o, text)),
            ClauseOp::Range { min, max } => {
                let Some(v) = value.as_f64() else { return false };
                let above = min.as_ref().and_then(FilterValue::as_f64).map_or(true, |m| v >= m);
                let below = max.as_ref().and_then(FilterValue::as_f64).map_or(true, |m| v <= m);
                above && below
            }
        }
    }
}

fn values_equal(a: &FilterValue, b: &FilterValue, text: TextMatch) -> bool {
    match (a, b) {
        (FilterValue::Text(x), FilterValue::Text(y)) => match text {
            TextMatch::Exact => x == y,
            TextMatch::IgnoreCase => x.to_lowercase() == y.to_lowercase(),
        },
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => false,
        },
    }
}

/// Matching strategy chosen by the translator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PlannedMode {
    FilterOnly,
    FullText,
    Semantic,
    Hybrid { alpha: f32 },
}

/// Native query object built by the translator and lowered by an adapter to
/// its own wire form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub mode: PlannedMode,
    pub text: Option<String>,
    #[serde(skip)]
    pub vector: Option<Vec<f32>>,
    pub filters: Vec<FilterClause>,
    pub sort: SortBy,
    pub limit: usize,
    pub offset: usize,
    pub aggregation: Option<Aggregation>,
}

impl QueryPlan {
    pub fn filter_only(filters: Vec<FilterClause>, limit: usize) -> Self {
        Self {
            mode: PlannedMode::FilterOnly,
            text: None,
            vector: None,
            filters,
            sort: SortBy::Relevance,
            limit,
            offset: 0,
            aggregation: None,
        }
    }

    pub fn matches_filters(&self, record: &WineRecord) -> bool {
        self.filters.iter().all(|c| c.matches(record))
    }
}

/// One hit as the backend produced it: backend-specific field names and
/// null spellings, normalised later by the translator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawHit {
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResults {
    pub hits: Vec<RawHit>,
    pub aggregation: Option<AggregationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips_offsets() {
        let token = Cursor::encode(40);
        assert_eq!(Cursor::decode(&token), Some(40));
        assert_eq!(Cursor::decode("40"), None);
    }

    #[test]
    fn params_build_typed_filters() {
        let params = SearchParams {
            terms: Some("tuscany red".into()),
            country: Some("Italy".into()),
            max_price: Some(50.0),
            min_points: Some(88),
            limit: Some(10),
            ..Default::default()
        };
        let req: SearchRequest = params.into();
        assert_eq!(req.terms.as_deref(), Some("tuscany red"));
        assert_eq!(req.filters.get(&FilterField::Country), Some(&Constraint::Eq("Italy".into())));
        assert_eq!(req.filters.get(&FilterField::Price), Some(&Constraint::at_most(50.0)));
        assert_eq!(req.filters.get(&FilterField::Points), Some(&Constraint::at_least(88.0)));
        assert_eq!(req.page, Page::Offset(0));
    }

    #[test]
    fn blank_terms_are_dropped() {
        let req: SearchRequest = SearchParams { terms: Some("   ".into()), ..Default::default() }.into();
        assert!(req.terms.is_none());
    }
}
