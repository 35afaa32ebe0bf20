use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Batches currently holding a concurrency permit, and the most seen at once.
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    pub fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { gauge: self }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct InFlightGuard<'a> {
    gauge: &'a InFlightGauge,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Live counters for progress display while a run is going.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    read: AtomicUsize,
    rejected: AtomicUsize,
    written: AtomicUsize,
    failed: AtomicUsize,
    batches_started: AtomicUsize,
    batches_done: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub read: usize,
    pub rejected: usize,
    pub written: usize,
    pub failed: usize,
    pub batches_started: usize,
    pub batches_done: usize,
}

impl PipelineMetrics {
    pub(crate) fn record_read(&self) {
        self.read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_started(&self) {
        self.batches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_done(&self, written: usize, failed: usize) {
        self.written.fetch_add(written, Ordering::Relaxed);
        self.failed.fetch_add(failed, Ordering::Relaxed);
        self.batches_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            read: self.read.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches_started: self.batches_started.load(Ordering::Relaxed),
            batches_done: self.batches_done.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_tracks_peak() {
        let gauge = InFlightGauge::default();
        let a = gauge.enter();
        let b = gauge.enter();
        assert_eq!(gauge.current(), 2);
        drop(a);
        drop(b);
        let _c = gauge.enter();
        assert_eq!((gauge.current(), gauge.peak()), (1, 2));
    }
}
