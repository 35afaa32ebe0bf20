//! Graph backend: wines, tasters, countries and provinces as nodes joined by
//! typed edges, merged on their natural keys. Plans render as Cypher.
mod adapter;
pub mod cypher;
pub mod store;

pub use adapter::GraphAdapter;
pub use store::{GraphStats, GraphStore, Rel};
