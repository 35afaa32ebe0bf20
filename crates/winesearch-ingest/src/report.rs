use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

use winesearch_core::types::{BackendKind, WineId};

/// Terminal failure state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Embedding,
    Write,
    RetriesExhausted,
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSample {
    pub id: Option<WineId>,
    pub reason: String,
}

fn millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Summary of one ingestion run. Every record read lands in exactly one
/// terminal count: `read == succeeded + failed() + not_attempted`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub backend: BackendKind,
    pub read: usize,
    pub succeeded: usize,
    pub inserted: usize,
    pub updated: usize,
    pub validation_failed: usize,
    pub embedding_failed: usize,
    pub write_failed: usize,
    pub retries_exhausted: usize,
    pub not_attempted: usize,
    pub batches: usize,
    pub retries: u64,
    #[serde(rename = "total_backoff_ms", serialize_with = "millis")]
    pub total_backoff: Duration,
    #[serde(rename = "elapsed_ms", serialize_with = "millis")]
    pub elapsed: Duration,
    pub peak_in_flight: usize,
    pub cancelled: bool,
    pub samples: BTreeMap<FailureKind, Vec<FailureSample>>,
}

impl IngestReport {
    pub(crate) fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            read: 0,
            succeeded: 0,
            inserted: 0,
            updated: 0,
            validation_failed: 0,
            embedding_failed: 0,
            write_failed: 0,
            retries_exhausted: 0,
            not_attempted: 0,
            batches: 0,
            retries: 0,
            total_backoff: Duration::ZERO,
            elapsed: Duration::ZERO,
            peak_in_flight: 0,
            cancelled: false,
            samples: BTreeMap::new(),
        }
    }

    /// Records that reached a failure state, not counting `not_attempted`.
    pub fn failed(&self) -> usize {
        self.validation_failed + self.embedding_failed + self.write_failed + self.retries_exhausted
    }

    pub fn is_balanced(&self) -> bool {
        self.read == self.succeeded + self.failed() + self.not_attempted
    }

    pub fn samples_of(&self, kind: FailureKind) -> &[FailureSample] {
        self.samples.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Accumulates batch outcomes into a report, keeping at most `sample_cap`
/// samples per failure kind.
pub(crate) struct ReportBuilder {
    report: IngestReport,
    sample_cap: usize,
}

impl ReportBuilder {
    pub fn new(backend: BackendKind, sample_cap: usize) -> Self {
        Self { report: IngestReport::new(backend), sample_cap }
    }

    pub fn read(&mut self) {
        self.report.read += 1;
    }

    pub fn fail(&mut self, kind: FailureKind, id: Option<WineId>, reason: impl Into<String>) {
        let counter = match kind {
            FailureKind::Validation => &mut self.report.validation_failed,
            FailureKind::Embedding => &mut self.report.embedding_failed,
            FailureKind::Write => &mut self.report.write_failed,
            FailureKind::RetriesExhausted => &mut self.report.retries_exhausted,
            FailureKind::NotAttempted => &mut self.report.not_attempted,
        };
        *counter += 1;
        let samples = self.report.samples.entry(kind).or_default();
        if samples.len() < self.sample_cap {
            samples.push(FailureSample { id, reason: reason.into() });
        }
    }

    /// Retries spent outside any batch, such as preparing the schema.
    pub fn add_retries(&mut self, retries: u32, backoff: Duration) {
        self.report.retries += u64::from(retries);
        self.report.total_backoff += backoff;
    }

    pub fn absorb(&mut self, batch: crate::batch::BatchResult) {
        self.report.batches += 1;
        self.report.succeeded += batch.succeeded;
        self.report.inserted += batch.inserted;
        self.report.updated += batch.updated;
        self.report.retries += u64::from(batch.retries);
        self.report.total_backoff += batch.backoff;
        for (kind, id, reason) in batch.failures {
            self.fail(kind, Some(id), reason);
        }
    }

    pub fn finish(mut self, elapsed: Duration, peak_in_flight: usize, cancelled: bool) -> IngestReport {
        self.report.elapsed = elapsed;
        self.report.peak_in_flight = peak_in_flight;
        self.report.cancelled = cancelled;
        self.report
    }
}
