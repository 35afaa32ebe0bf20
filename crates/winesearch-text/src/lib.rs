//! winesearch-text
//!
//! Inverted-index backend on Tantivy: stop-word analysed full text over
//! title, description and variety, exact categorical terms, facets for group
//! counts and fast numeric fields for range filters and points ordering.
mod adapter;
mod lower;
pub mod schema;

pub use adapter::TantivyAdapter;
pub use lower::to_dsl;
