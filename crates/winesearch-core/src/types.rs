//! Domain types shared by the validator, the adapters, the ingestion pipeline
//! and the query translator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::query::{FilterField, FilterValue};

pub type WineId = i64;

/// A validated wine review.
///
/// - `id`: externally assigned, unique within a dataset; re-ingesting the same
///   id replaces the stored record
/// - `points`: always within `0..=100`
/// - `price`: strictly positive when present; every "unknown price" spelling
///   in the raw data ends up as `None`
/// - `vineyard`: the raw dataset calls this field `designation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WineRecord {
    pub id: WineId,
    pub title: String,
    pub description: Option<String>,
    pub variety: String,
    pub country: String,
    pub province: Option<String>,
    pub winery: String,
    pub points: u8,
    pub price: Option<f64>,
    pub taster_name: Option<String>,
    pub taster_twitter_handle: Option<String>,
    #[serde(rename = "designation", alias = "vineyard")]
    pub vineyard: Option<String>,
    pub region_1: Option<String>,
    pub region_2: Option<String>,
}

impl WineRecord {
    /// Value of a filterable field, `None` when the record has no value for it.
    pub fn field_value(&self, field: FilterField) -> Option<FilterValue> {
        match field {
            FilterField::Id => Some(FilterValue::Int(self.id)),
            FilterField::Country => Some(FilterValue::Text(self.country.clone())),
            FilterField::Province => self.province.clone().map(FilterValue::Text),
            FilterField::Variety => Some(FilterValue::Text(self.variety.clone())),
            FilterField::Winery => Some(FilterValue::Text(self.winery.clone())),
            FilterField::TasterName => self.taster_name.clone().map(FilterValue::Text),
            FilterField::Points => Some(FilterValue::Int(i64::from(self.points))),
            FilterField::Price => self.price.map(FilterValue::Float),
        }
    }

    /// The record as a JSON object in the raw input schema.
    pub fn to_raw(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Which storage engine an adapter wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Graph,
    InvertedIndex,
    FastKeyword,
    Vector,
    ColumnarVector,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Graph,
        BackendKind::InvertedIndex,
        BackendKind::FastKeyword,
        BackendKind::Vector,
        BackendKind::ColumnarVector,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Graph => "graph",
            BackendKind::InvertedIndex => "search",
            BackendKind::FastKeyword => "keyword",
            BackendKind::Vector => "vector",
            BackendKind::ColumnarVector => "columnar",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "graph" | "neo4j" => Ok(BackendKind::Graph),
            "search" | "inverted" | "tantivy" | "elasticsearch" => Ok(BackendKind::InvertedIndex),
            "keyword" | "meilisearch" => Ok(BackendKind::FastKeyword),
            "vector" | "qdrant" => Ok(BackendKind::Vector),
            "columnar" | "lancedb" => Ok(BackendKind::ColumnarVector),
            other => Err(crate::error::Error::InvalidConfig(format!("unknown backend '{}'", other))),
        }
    }
}

/// A query feature an adapter may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FullText,
    Filter,
    VectorSimilarity,
    Hybrid,
    Count,
    GroupCount,
    Sort,
    NativePaging,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::FullText => "full-text search",
            Capability::Filter => "structured filters",
            Capability::VectorSimilarity => "vector similarity",
            Capability::Hybrid => "hybrid search",
            Capability::Count => "count aggregation",
            Capability::GroupCount => "grouped count aggregation",
            Capability::Sort => "field sort",
            Capability::NativePaging => "native paging",
        };
        f.write_str(name)
    }
}

/// Capability set advertised by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn of(caps: &[Capability]) -> Self {
        Self(caps.iter().copied().collect())
    }

    pub fn supports(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

/// Result of `ensure_schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStatus {
    Created,
    AlreadyPresent,
}

/// A record the backend refused while accepting the rest of its batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub id: WineId,
    pub reason: String,
}

/// Per-batch write acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub failed: Vec<RecordFailure>,
}

impl WriteOutcome {
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Canonical projection returned to query callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredWine {
    pub id: WineId,
    pub country: String,
    pub province: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub points: u8,
    pub price: Option<f64>,
    pub variety: Option<String>,
    pub winery: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationResult {
    Count(u64),
    Groups(Vec<GroupCount>),
}

/// How the translator ended up executing a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMetadata {
    pub backend: BackendKind,
    pub mode: crate::query::PlannedMode,
    /// Paging was applied by the translator because the backend cannot page.
    pub client_side_paging: bool,
    /// The requested limit exceeded the configured maximum and was lowered.
    pub limit_clamped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub hits: Vec<ScoredWine>,
    pub aggregation: Option<AggregationResult>,
    pub next_cursor: Option<String>,
    pub metadata: ResultMetadata,
}
