//! Fast keyword backend: a typo-tolerant in-RAM Tantivy index with declared
//! searchable, filterable and sortable attributes. Filters render as
//! expression strings such as `country = "Italy" AND price <= 50`.
mod adapter;
pub mod filter;
pub mod index;
pub mod settings;
pub mod typo;

pub use adapter::KeywordAdapter;
pub use settings::IndexSettings;
