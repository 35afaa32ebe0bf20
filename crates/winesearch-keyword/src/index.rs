use std::collections::BTreeMap;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, INDEXED, STORED};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError, Term};

use winesearch_core::text::search_terms;
use winesearch_core::types::{WineId, WineRecord};

use crate::settings::IndexSettings;
use crate::typo::typo_tolerant_query;

const TOKENIZER: &str = "keyword";
const WRITER_MEMORY: usize = 20_000_000;

/// Documents keyed by primary key, with their searchable attributes in an
/// in-RAM Tantivy index.
pub struct KeywordIndex {
    settings: IndexSettings,
    docs: BTreeMap<WineId, WineRecord>,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id: Field,
    text: Field,
}

impl KeywordIndex {
    pub fn new(settings: IndexSettings) -> Result<Self, TantivyError> {
        let mut builder = Schema::builder();
        let id = builder.add_i64_field("id", INDEXED | STORED);
        let indexing =
            TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqs);
        let text = builder.add_text_field("text", TextOptions::default().set_indexing_options(indexing));
        let index = Index::create_in_ram(builder.build());
        index
            .tokenizers()
            .register(TOKENIZER, TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build());

        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY)?;
        Ok(Self { settings, docs: BTreeMap::new(), reader, writer: Mutex::new(writer), id, text })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, id: WineId) -> Option<&WineRecord> {
        self.docs.get(&id)
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>, TantivyError> {
        self.writer.lock().map_err(|_| TantivyError::SystemError("keyword index writer poisoned".into()))
    }

    /// Replaces every document sharing an id with one of `records` and makes
    /// the batch searchable. Returns `(inserted, updated)`.
    pub fn upsert_all(&mut self, records: &[WineRecord]) -> Result<(usize, usize), TantivyError> {
        let (mut inserted, mut updated) = (0, 0);
        {
            let mut writer = self.writer()?;
            for record in records {
                let mut doc = TantivyDocument::default();
                doc.add_i64(self.id, record.id);
                for attr in &self.settings.searchable_attributes {
                    if let Some(value) = attr.of(record) {
                        doc.add_text(self.text, value);
                    }
                }
                writer.delete_term(Term::from_field_i64(self.id, record.id));
                writer.add_document(doc)?;
            }
            writer.commit()?;
        }
        self.reader.reload()?;
        for record in records {
            if self.docs.insert(record.id, record.clone()).is_some() {
                updated += 1;
            } else {
                inserted += 1;
            }
        }
        Ok((inserted, updated))
    }

    /// Documents matching at least one query word, scored by the index. An
    /// empty query matches every document without a score.
    pub fn search(&self, query: &str) -> Result<Vec<(&WineRecord, Option<f32>)>, TantivyError> {
        let words = search_terms(query);
        if words.is_empty() {
            return Ok(self.docs.values().map(|r| (r, None)).collect());
        }
        if self.docs.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query = typo_tolerant_query(self.text, &words);
        let top = searcher.search(query.as_ref(), &TopDocs::with_limit(self.docs.len()))?;
        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address)?;
            let Some(id) = doc.get_first(self.id).and_then(|v| v.as_i64()) else { continue };
            if let Some(record) = self.docs.get(&id) {
                hits.push((record, Some(score)));
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wine(id: WineId, title: &str) -> WineRecord {
        WineRecord {
            id,
            title: title.into(),
            description: None,
            variety: "Merlot".into(),
            country: "France".into(),
            province: Some("Bordeaux".into()),
            winery: "Château X".into(),
            points: 88,
            price: None,
            taster_name: None,
            taster_twitter_handle: None,
            vineyard: None,
            region_1: None,
            region_2: None,
        }
    }

    fn ids(hits: &[(&WineRecord, Option<f32>)]) -> Vec<WineId> {
        let mut ids: Vec<WineId> = hits.iter().map(|(r, _)| r.id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn upsert_reindexes_terms() -> Result<(), TantivyError> {
        let mut idx = KeywordIndex::new(IndexSettings::default())?;
        assert_eq!(idx.upsert_all(&[wine(1, "Pomerol grand vin")])?, (1, 0));
        assert_eq!(idx.upsert_all(&[wine(1, "Saint-Émilion")])?, (0, 1));
        assert_eq!(idx.len(), 1);
        assert!(idx.search("pomerol")?.is_empty());
        assert_eq!(ids(&idx.search("émilion")?), vec![1]);
        Ok(())
    }

    #[test]
    fn exact_beats_typo() -> Result<(), TantivyError> {
        let mut idx = KeywordIndex::new(IndexSettings::default())?;
        idx.upsert_all(&[wine(1, "cabernet"), wine(2, "cabarnet")])?;
        let hits = idx.search("cabernet")?;
        let score = |id| hits.iter().find(|(r, _)| r.id == id).and_then(|(_, s)| *s).unwrap_or(0.0);
        assert_eq!(ids(&hits), vec![1, 2]);
        assert!(score(1) > score(2));
        Ok(())
    }

    #[test]
    fn short_words_need_an_exact_match() -> Result<(), TantivyError> {
        let mut idx = KeywordIndex::new(IndexSettings::default())?;
        idx.upsert_all(&[wine(1, "rosso"), wine(2, "rosé")])?;
        assert_eq!(ids(&idx.search("rose red")?), Vec::<WineId>::new());
        assert_eq!(ids(&idx.search("rossi")?), vec![1]);
        Ok(())
    }

    #[test]
    fn last_word_matches_as_prefix() -> Result<(), TantivyError> {
        let mut idx = KeywordIndex::new(IndexSettings::default())?;
        idx.upsert_all(&[wine(1, "bordeaux blend")])?;
        assert_eq!(ids(&idx.search("bord")?), vec![1]);
        Ok(())
    }
}
