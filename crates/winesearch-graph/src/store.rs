use std::collections::{BTreeMap, BTreeSet, HashMap};

use winesearch_core::text::search_terms;
use winesearch_core::types::{WineId, WineRecord};

/// Edge types. Wines point at their taster, country and province; provinces
/// point at the countries they were seen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rel {
    TastedBy,
    IsFromCountry,
    IsFromProvince,
    IsLocatedIn,
}

impl Rel {
    pub fn as_str(self) -> &'static str {
        match self {
            Rel::TastedBy => "TASTED_BY",
            Rel::IsFromCountry => "IS_FROM_COUNTRY",
            Rel::IsFromProvince => "IS_FROM_PROVINCE",
            Rel::IsLocatedIn => "IS_LOCATED_IN",
        }
    }
}

#[derive(Debug, Clone)]
struct WineNode {
    title: String,
    description: Option<String>,
    variety: String,
    winery: String,
    points: u8,
    price: Option<f64>,
    vineyard: Option<String>,
    region_1: Option<String>,
    region_2: Option<String>,
}

impl WineNode {
    fn from_record(r: &WineRecord) -> Self {
        Self {
            title: r.title.clone(),
            description: r.description.clone(),
            variety: r.variety.clone(),
            winery: r.winery.clone(),
            points: r.points,
            price: r.price,
            vineyard: r.vineyard.clone(),
            region_1: r.region_1.clone(),
            region_2: r.region_2.clone(),
        }
    }

    /// Terms of the `searchText` full-text index: title, description, variety.
    fn search_text(&self) -> BTreeSet<String> {
        let mut terms: BTreeSet<String> = search_terms(&self.title).into_iter().collect();
        if let Some(d) = &self.description {
            terms.extend(search_terms(d));
        }
        terms.extend(search_terms(&self.variety));
        terms
    }
}

#[derive(Debug, Clone, Default)]
struct PersonNode {
    twitter_handle: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub wines: usize,
    pub people: usize,
    pub countries: usize,
    pub provinces: usize,
    pub edges: usize,
}

/// Property graph keyed like the unique constraints: `Wine.wineID`,
/// `Person.tasterName`, `Country.countryName`, `Province.provinceName`.
#[derive(Debug, Default)]
pub struct GraphStore {
    wines: BTreeMap<WineId, WineNode>,
    people: BTreeMap<String, PersonNode>,
    countries: BTreeSet<String>,
    provinces: BTreeMap<String, BTreeSet<String>>,
    wine_edges: BTreeMap<WineId, Vec<(Rel, String)>>,
    postings: HashMap<String, BTreeSet<WineId>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one wine and its neighbourhood. An existing wine keeps its node
    /// but loses its previous outgoing edges and index terms. Returns whether
    /// the wine already existed.
    pub fn merge_wine(&mut self, record: &WineRecord) -> bool {
        let existed = match self.wines.remove(&record.id) {
            Some(old) => {
                for term in old.search_text() {
                    if let Some(ids) = self.postings.get_mut(&term) {
                        ids.remove(&record.id);
                        if ids.is_empty() {
                            self.postings.remove(&term);
                        }
                    }
                }
                true
            }
            None => false,
        };

        let node = WineNode::from_record(record);
        for term in node.search_text() {
            self.postings.entry(term).or_default().insert(record.id);
        }
        self.wines.insert(record.id, node);

        let mut edges = Vec::with_capacity(3);
        if let Some(taster) = &record.taster_name {
            let person = self.people.entry(taster.clone()).or_default();
            if record.taster_twitter_handle.is_some() {
                person.twitter_handle = record.taster_twitter_handle.clone();
            }
            edges.push((Rel::TastedBy, taster.clone()));
        }
        self.countries.insert(record.country.clone());
        edges.push((Rel::IsFromCountry, record.country.clone()));
        if let Some(province) = &record.province {
            self.provinces.entry(province.clone()).or_default().insert(record.country.clone());
            edges.push((Rel::IsFromProvince, province.clone()));
        }
        self.wine_edges.insert(record.id, edges);
        existed
    }

    fn neighbour(&self, id: WineId, rel: Rel) -> Option<&str> {
        self.wine_edges.get(&id)?.iter().find(|(r, _)| *r == rel).map(|(_, name)| name.as_str())
    }

    /// Reassembles the record from the wine node and its edges.
    pub fn record(&self, id: WineId) -> Option<WineRecord> {
        let node = self.wines.get(&id)?;
        let taster = self.neighbour(id, Rel::TastedBy).map(str::to_string);
        let handle = taster
            .as_ref()
            .and_then(|t| self.people.get(t))
            .and_then(|p| p.twitter_handle.clone());
        Some(WineRecord {
            id,
            title: node.title.clone(),
            description: node.description.clone(),
            variety: node.variety.clone(),
            country: self.neighbour(id, Rel::IsFromCountry).unwrap_or_default().to_string(),
            province: self.neighbour(id, Rel::IsFromProvince).map(str::to_string),
            winery: node.winery.clone(),
            points: node.points,
            price: node.price,
            taster_name: taster,
            taster_twitter_handle: handle,
            vineyard: node.vineyard.clone(),
            region_1: node.region_1.clone(),
            region_2: node.region_2.clone(),
        })
    }

    pub fn records(&self) -> impl Iterator<Item = WineRecord> + '_ {
        self.wines.keys().filter_map(|id| self.record(*id))
    }

    /// Scores wines against the `searchText` index. Any matching term is
    /// enough; rarer terms weigh more.
    pub fn full_text(&self, text: &str) -> BTreeMap<WineId, f32> {
        let total = self.wines.len().max(1) as f32;
        let mut scores = BTreeMap::new();
        let terms: BTreeSet<String> = search_terms(text).into_iter().collect();
        for term in terms {
            let Some(ids) = self.postings.get(&term) else { continue };
            let idf = (1.0 + total / ids.len() as f32).ln();
            for id in ids {
                *scores.entry(*id).or_insert(0.0) += idf;
            }
        }
        scores
    }

    pub fn stats(&self) -> GraphStats {
        let located_in: usize = self.provinces.values().map(BTreeSet::len).sum();
        let wine_edges: usize = self.wine_edges.values().map(Vec::len).sum();
        GraphStats {
            wines: self.wines.len(),
            people: self.people.len(),
            countries: self.countries.len(),
            provinces: self.provinces.len(),
            edges: wine_edges + located_in,
        }
    }
}
