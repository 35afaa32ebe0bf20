pub mod config;
pub mod error;
pub mod query;
pub mod retry;
pub mod source;
pub mod text;
pub mod traits;
pub mod types;
pub mod validator;

pub use error::{BackendError, EmbeddingError, Error, QueryError, Result, ValidationError};
pub use query::{QueryPlan, RawHit, RawResults, SearchParams, SearchRequest};
pub use traits::{BackendAdapter, EmbeddingProvider};
pub use types::{BackendKind, Capabilities, Capability, WineRecord};
pub use validator::validate;
