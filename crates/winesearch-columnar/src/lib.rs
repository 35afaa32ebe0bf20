//! Columnar-vector backend on LanceDB.
//!
//! Records live in one Arrow table with a fixed-size `vector` column. Writes
//! are `merge_insert` upserts on `id`; reads are cosine vector searches or
//! filtered scans with a SQL where-clause.
mod adapter;
pub mod filter;
pub mod index_build;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use adapter::LanceAdapter;
