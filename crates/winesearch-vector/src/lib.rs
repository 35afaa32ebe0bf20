//! Vector backend: a cosine collection of points carrying the wine as
//! payload, with keyword payload indexes for filtering and a text index used
//! by hybrid scoring. Filters render as `must` condition lists.
mod adapter;
pub mod collection;
pub mod filter;

pub use adapter::VectorAdapter;
pub use collection::{Collection, CollectionConfig, PayloadSchema};
