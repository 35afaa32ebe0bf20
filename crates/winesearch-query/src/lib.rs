//! Query translation: checks a canonical `SearchRequest` against an adapter's
//! capabilities, lowers it to a `QueryPlan`, runs it and maps the backend's
//! answer back to canonical `ScoredWine`s.

mod clauses;
mod normalize;
mod translator;

pub use normalize::scored_wine;
pub use translator::QueryTranslator;
