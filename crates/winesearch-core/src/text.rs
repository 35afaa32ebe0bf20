//! Builds the text that gets embedded, for records and for queries alike.

use serde::{Deserialize, Serialize};

use crate::types::WineRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Variety,
    Title,
    Description,
    Country,
    Province,
    Winery,
}

impl TextField {
    pub fn of(self, record: &WineRecord) -> Option<&str> {
        match self {
            TextField::Variety => Some(&record.variety),
            TextField::Title => Some(&record.title),
            TextField::Description => record.description.as_deref(),
            TextField::Country => Some(&record.country),
            TextField::Province => record.province.as_deref(),
            TextField::Winery => Some(&record.winery),
        }
    }
}

/// Ordered list of record fields concatenated into the embedding text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbedFields(pub Vec<TextField>);

impl Default for EmbedFields {
    fn default() -> Self {
        Self(vec![TextField::Variety, TextField::Title, TextField::Description])
    }
}

/// Normalised text ready for an embedding model. Records and queries go
/// through the same normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddableText(String);

impl EmbeddableText {
    pub fn from_record(record: &WineRecord, fields: &EmbedFields) -> Self {
        Self::normalize(fields.0.iter().filter_map(|f| f.of(record)))
    }

    pub fn from_query(terms: &str) -> Self {
        Self::normalize(std::iter::once(terms))
    }

    fn normalize<'a>(parts: impl Iterator<Item = &'a str>) -> Self {
        let joined = parts
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        Self(joined.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lowercased alphanumeric terms of `text`, in order. Shared by the
/// in-process engines for indexing and matching.
pub fn search_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
