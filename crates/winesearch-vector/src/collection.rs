use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use winesearch_core::query::{ClauseOp, FilterClause, FilterField, FilterValue, TextMatch};
use winesearch_core::text::search_terms;
use winesearch_core::types::{WineId, WineRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PayloadSchema {
    /// Exact-value index over a categorical field.
    Keyword,
    /// Lowercased word index; tokens outside the length bounds are dropped.
    Text { min_token_len: usize, max_token_len: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionConfig {
    pub name: String,
    pub size: usize,
    pub distance: &'static str,
    pub payload_indexes: Vec<(String, PayloadSchema)>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let text = PayloadSchema::Text { min_token_len: 3, max_token_len: 15 };
        let mut payload_indexes = vec![("title".to_string(), text.clone()), ("description".to_string(), text)];
        for field in ["country", "province", "variety"] {
            payload_indexes.push((field.to_string(), PayloadSchema::Keyword));
        }
        Self { name: name.into(), size, distance: "Cosine", payload_indexes }
    }

    fn text_bounds(&self) -> Option<(usize, usize)> {
        self.payload_indexes.iter().find_map(|(_, schema)| match schema {
            PayloadSchema::Text { min_token_len, max_token_len } => Some((*min_token_len, *max_token_len)),
            PayloadSchema::Keyword => None,
        })
    }

    fn keyword_fields(&self) -> Vec<FilterField> {
        self.payload_indexes
            .iter()
            .filter(|(_, schema)| *schema == PayloadSchema::Keyword)
            .filter_map(|(name, _)| match name.as_str() {
                "country" => Some(FilterField::Country),
                "province" => Some(FilterField::Province),
                "variety" => Some(FilterField::Variety),
                "winery" => Some(FilterField::Winery),
                "taster_name" => Some(FilterField::TasterName),
                _ => None,
            })
            .collect()
    }
}

struct Point {
    vector: Vec<f32>,
    payload: WineRecord,
    tokens: BTreeSet<String>,
}

/// Points keyed by wine id. Vectors are stored unit-length so cosine
/// similarity is a dot product.
pub struct Collection {
    config: CollectionConfig,
    points: BTreeMap<WineId, Point>,
    keyword: HashMap<FilterField, HashMap<String, BTreeSet<WineId>>>,
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl Collection {
    pub fn new(config: CollectionConfig) -> Self {
        let keyword = config.keyword_fields().into_iter().map(|f| (f, HashMap::new())).collect();
        Self { config, points: BTreeMap::new(), keyword }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn text_tokens(&self, texts: &[Option<&str>]) -> BTreeSet<String> {
        let Some((min, max)) = self.config.text_bounds() else { return BTreeSet::new() };
        texts
            .iter()
            .flatten()
            .flat_map(|t| search_terms(t))
            .filter(|t| (min..=max).contains(&t.chars().count()))
            .collect()
    }

    /// Inserts or replaces a point. Returns whether the id existed, or the
    /// reason the vector was refused.
    pub fn upsert(&mut self, record: WineRecord, vector: Vec<f32>) -> Result<bool, String> {
        if vector.len() != self.config.size {
            return Err(format!("vector has {} dimensions, collection expects {}", vector.len(), self.config.size));
        }
        let existed = self.remove(record.id);
        for (field, values) in self.keyword.iter_mut() {
            if let Some(FilterValue::Text(v)) = record.field_value(*field) {
                values.entry(v).or_default().insert(record.id);
            }
        }
        let tokens = self.text_tokens(&[Some(record.title.as_str()), record.description.as_deref()]);
        self.points.insert(record.id, Point { vector: normalize(vector), payload: record, tokens });
        Ok(existed)
    }

    fn remove(&mut self, id: WineId) -> bool {
        let Some(old) = self.points.remove(&id) else { return false };
        for (field, values) in self.keyword.iter_mut() {
            if let Some(FilterValue::Text(v)) = old.payload.field_value(*field) {
                if let Some(ids) = values.get_mut(&v) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        values.remove(&v);
                    }
                }
            }
        }
        true
    }

    /// Ids passing every clause. An equality clause on a keyword-indexed
    /// field narrows the candidates before the payload check.
    fn filtered(&self, clauses: &[FilterClause]) -> Vec<WineId> {
        let seed = clauses.iter().find_map(|c| match (&c.op, self.keyword.get(&c.field)) {
            (ClauseOp::Eq(FilterValue::Text(v)), Some(index)) => Some(index.get(v).cloned().unwrap_or_default()),
            _ => None,
        });
        let pass = |id: &WineId| {
            self.points
                .get(id)
                .is_some_and(|p| clauses.iter().all(|c| c.matches_with(&p.payload, TextMatch::Exact)))
        };
        match seed {
            Some(ids) => ids.into_iter().filter(pass).collect(),
            None => self.points.keys().copied().filter(pass).collect(),
        }
    }

    pub fn count(&self, clauses: &[FilterClause]) -> usize {
        self.filtered(clauses).len()
    }

    /// Share of the query's text-index tokens present in the point's tokens.
    fn keyword_overlap(&self, query: &BTreeSet<String>, id: WineId) -> f32 {
        if query.is_empty() {
            return 0.0;
        }
        let Some(point) = self.points.get(&id) else { return 0.0 };
        query.intersection(&point.tokens).count() as f32 / query.len() as f32
    }

    /// Nearest neighbours by cosine similarity; with `hybrid`, the score is
    /// `alpha * cosine + (1 - alpha) * keyword overlap`. A query vector of
    /// the wrong size is refused.
    pub fn search(
        &self,
        vector: &[f32],
        clauses: &[FilterClause],
        hybrid: Option<(&str, f32)>,
    ) -> Result<Vec<(&WineRecord, f32)>, String> {
        if vector.len() != self.config.size {
            return Err(format!("query vector has {} dimensions, collection expects {}", vector.len(), self.config.size));
        }
        let query = normalize(vector.to_vec());
        let terms = hybrid.map(|(text, _)| self.text_tokens(&[Some(text)])).unwrap_or_default();
        let mut scored: Vec<(&WineRecord, f32)> = self
            .filtered(clauses)
            .into_iter()
            .filter_map(|id| {
                let point = self.points.get(&id)?;
                let cosine = dot(&query, &point.vector);
                let score = match hybrid {
                    Some((_, alpha)) => alpha * cosine + (1.0 - alpha) * self.keyword_overlap(&terms, id),
                    None => cosine,
                };
                Some((&point.payload, score))
            })
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then_with(|| a.id.cmp(&b.id)));
        Ok(scored)
    }

    /// Filtered payloads in id order.
    pub fn scroll(&self, clauses: &[FilterClause]) -> Vec<&WineRecord> {
        self.filtered(clauses).into_iter().filter_map(|id| self.points.get(&id).map(|p| &p.payload)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wine(id: WineId, country: &str, description: &str) -> WineRecord {
        WineRecord {
            id,
            title: format!("Wine {id}"),
            description: Some(description.into()),
            variety: "Nebbiolo".into(),
            country: country.into(),
            province: None,
            winery: "W".into(),
            points: 90,
            price: None,
            taster_name: None,
            taster_twitter_handle: None,
            vineyard: None,
            region_1: None,
            region_2: None,
        }
    }

    #[test]
    fn keyword_index_follows_upserts() {
        let mut c = Collection::new(CollectionConfig::new("wines", 2));
        c.upsert(wine(1, "Italy", "tar and roses"), vec![1.0, 0.0]).unwrap();
        assert!(c.upsert(wine(1, "France", "tar and roses"), vec![1.0, 0.0]).unwrap());
        let italy = [FilterClause { field: FilterField::Country, op: ClauseOp::Eq("Italy".into()) }];
        let france = [FilterClause { field: FilterField::Country, op: ClauseOp::Eq("France".into()) }];
        assert_eq!(c.count(&italy), 0);
        assert_eq!(c.count(&france), 1);
    }

    #[test]
    fn keyword_index_drops_emptied_values() {
        let mut c = Collection::new(CollectionConfig::new("wines", 2));
        c.upsert(wine(1, "Italy", "x"), vec![1.0, 0.0]).unwrap();
        c.upsert(wine(1, "France", "x"), vec![1.0, 0.0]).unwrap();
        let countries = &c.keyword[&FilterField::Country];
        assert!(!countries.contains_key("Italy"));
        assert_eq!(countries.get("France").map(BTreeSet::len), Some(1));
    }

    #[test]
    fn wrong_size_is_refused() {
        let mut c = Collection::new(CollectionConfig::new("wines", 3));
        assert!(c.upsert(wine(1, "Italy", "x"), vec![1.0, 0.0]).is_err());
        assert!(c.is_empty());
        c.upsert(wine(1, "Italy", "x"), vec![1.0, 0.0, 0.0]).unwrap();
        assert!(c.search(&[1.0, 0.0], &[], None).is_err());
    }

    #[test]
    fn hybrid_rewards_keyword_overlap() {
        let mut c = Collection::new(CollectionConfig::new("wines", 2));
        c.upsert(wine(1, "Italy", "cherry and leather"), vec![1.0, 0.0]).unwrap();
        c.upsert(wine(2, "Italy", "tar and roses"), vec![1.0, 0.0]).unwrap();
        let pure = c.search(&[1.0, 0.0], &[], None).unwrap();
        assert_eq!(pure.iter().map(|(r, _)| r.id).collect::<Vec<_>>(), vec![1, 2]);
        let mixed = c.search(&[1.0, 0.0], &[], Some(("roses", 0.5))).unwrap();
        assert_eq!(mixed[0].0.id, 2);
        assert!((mixed[0].1 - 1.0).abs() < 1e-6);
        assert!((mixed[1].1 - 0.5).abs() < 1e-6);
    }
}
