use tantivy::schema::{
    FacetOptions, Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED,
    STRING,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::{Index, TantivyError};

use winesearch_core::query::{FilterField, GroupField};

pub const TOKENIZER: &str = "text_with_stopwords";

pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_i64_field("id", INDEXED | STORED | FAST);
    builder.add_i64_field("points", INDEXED | STORED | FAST);
    builder.add_f64_field("price", INDEXED | STORED | FAST);

    let indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let full_text = TextOptions::default().set_indexing_options(indexing);
    for name in ["title", "description", "variety_text"] {
        builder.add_text_field(name, full_text.clone());
    }
    // Lowercased exact-match copies of the categorical fields.
    for name in ["country", "province", "variety", "winery", "taster_name"] {
        builder.add_text_field(name, STRING);
    }
    for name in ["country_facet", "province_facet", "variety_facet"] {
        builder.add_facet_field(name, FacetOptions::default());
    }
    builder.add_text_field("_source", STORED);
    builder.build()
}

pub fn register_tokenizer(index: &Index) {
    let stop_words = vec![
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its", "of", "on",
        "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their",
        "there", "then", "than", "so", "if", "when", "where", "which", "who", "can", "could", "should", "would",
        "may", "might", "must", "do", "does", "did", "have", "had",
    ];
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
        .build();
    index.tokenizers().register(TOKENIZER, tokenizer);
}

/// Resolved handles for every schema field.
#[derive(Clone, Copy)]
pub struct Fields {
    pub id: Field,
    pub points: Field,
    pub price: Field,
    pub title: Field,
    pub description: Field,
    pub variety_text: Field,
    pub country: Field,
    pub province: Field,
    pub variety: Field,
    pub winery: Field,
    pub taster_name: Field,
    pub country_facet: Field,
    pub province_facet: Field,
    pub variety_facet: Field,
    pub source: Field,
}

impl Fields {
    pub fn resolve(schema: &Schema) -> Result<Self, TantivyError> {
        Ok(Self {
            id: schema.get_field("id")?,
            points: schema.get_field("points")?,
            price: schema.get_field("price")?,
            title: schema.get_field("title")?,
            description: schema.get_field("description")?,
            variety_text: schema.get_field("variety_text")?,
            country: schema.get_field("country")?,
            province: schema.get_field("province")?,
            variety: schema.get_field("variety")?,
            winery: schema.get_field("winery")?,
            taster_name: schema.get_field("taster_name")?,
            country_facet: schema.get_field("country_facet")?,
            province_facet: schema.get_field("province_facet")?,
            variety_facet: schema.get_field("variety_facet")?,
            source: schema.get_field("_source")?,
        })
    }

    pub fn filter(&self, field: FilterField) -> Field {
        match field {
            FilterField::Id => self.id,
            FilterField::Country => self.country,
            FilterField::Province => self.province,
            FilterField::Variety => self.variety,
            FilterField::Winery => self.winery,
            FilterField::TasterName => self.taster_name,
            FilterField::Points => self.points,
            FilterField::Price => self.price,
        }
    }

    pub fn facet_name(group: GroupField) -> &'static str {
        match group {
            GroupField::Country => "country_facet",
            GroupField::Province => "province_facet",
            GroupField::Variety => "variety_facet",
        }
    }

    pub fn full_text(&self) -> Vec<Field> {
        vec![self.title, self.description, self.variety_text]
    }
}
