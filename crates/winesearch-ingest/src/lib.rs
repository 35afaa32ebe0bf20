//! Bulk ingestion: a bounded-concurrency pipeline that validates raw records,
//! groups them into batches, embeds them when the target backend stores
//! vectors, and writes them under a retry envelope. Every record read ends in
//! exactly one terminal state of the returned [`IngestReport`].

mod batch;
mod cancel;
mod metrics;
mod pipeline;
mod report;

pub use cancel::CancelToken;
pub use metrics::{InFlightGauge, InFlightGuard, MetricsSnapshot, PipelineMetrics};
pub use pipeline::Pipeline;
pub use report::{FailureKind, FailureSample, IngestReport};
