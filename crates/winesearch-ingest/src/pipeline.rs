use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use winesearch_core::config::IngestSettings;
use winesearch_core::retry::{retry_with_backoff, RetryPolicy};
use winesearch_core::text::EmbedFields;
use winesearch_core::traits::{BackendAdapter, EmbeddingProvider};
use winesearch_core::types::WineRecord;
use winesearch_core::validator::{raw_id, validate};

use crate::batch::{Batch, BatchContext, BatchResult};
use crate::cancel::CancelToken;
use crate::metrics::{InFlightGauge, PipelineMetrics};
use crate::report::{FailureKind, IngestReport, ReportBuilder};

/// Streams raw records into one backend: validates, batches by size or age,
/// embeds when the backend stores vectors, and writes with at most
/// `max_in_flight` batches outstanding.
pub struct Pipeline {
    adapter: Arc<dyn BackendAdapter>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    fields: EmbedFields,
    settings: IngestSettings,
    policy: RetryPolicy,
    metrics: Arc<PipelineMetrics>,
    gauge: Arc<InFlightGauge>,
}

enum Event {
    Cancelled,
    FlushDue,
    Item(Option<Value>),
}

/// Hands batches to spawned tasks once a concurrency permit is free.
struct Dispatcher {
    ctx: Arc<BatchContext>,
    semaphore: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<BatchResult>,
    gauge: Arc<InFlightGauge>,
    metrics: Arc<PipelineMetrics>,
    seq: u64,
}

impl Dispatcher {
    /// Spawns the batch, or gives the records back if cancelled while
    /// waiting for a permit.
    async fn send(&mut self, records: Vec<WineRecord>, cancel: &CancelToken) -> Result<(), Vec<WineRecord>> {
        if records.is_empty() {
            return Ok(());
        }
        let permit: OwnedSemaphorePermit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(records),
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => return Err(records),
            },
        };

        self.seq += 1;
        let batch = Batch::new(self.seq, records);
        debug!(batch = self.seq, records = batch.len(), "batch dispatched");
        self.metrics.batch_started();

        let ctx = Arc::clone(&self.ctx);
        let gauge = Arc::clone(&self.gauge);
        let metrics = Arc::clone(&self.metrics);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let _in_flight = gauge.enter();
            let result = ctx.run(batch).await;
            metrics.batch_done(result.succeeded, result.failures.len());
            // the receiver outlives every sender
            let _ = tx.send(result);
        });
        Ok(())
    }
}

impl Pipeline {
    pub fn new(adapter: Arc<dyn BackendAdapter>, settings: IngestSettings, policy: RetryPolicy) -> Self {
        Self {
            adapter,
            embedder: None,
            fields: EmbedFields::default(),
            settings,
            policy,
            metrics: Arc::new(PipelineMetrics::default()),
            gauge: Arc::new(InFlightGauge::default()),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>, fields: EmbedFields) -> Self {
        self.embedder = Some(embedder);
        self.fields = fields;
        self
    }

    /// Live counters, readable while `run` is going.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn gauge(&self) -> Arc<InFlightGauge> {
        Arc::clone(&self.gauge)
    }

    /// Consumes `source` to the end, or until `cancel` fires, and reports
    /// the terminal state of every record read. Batches already dispatched
    /// when cancellation arrives run to completion; records not yet handed
    /// to a batch are reported as not attempted.
    pub async fn run<S>(&self, mut source: S, cancel: &CancelToken) -> IngestReport
    where
        S: Stream<Item = Value> + Unpin,
    {
        let started = std::time::Instant::now();
        let backend = self.adapter.kind();
        let mut report = ReportBuilder::new(backend, self.settings.failure_samples);

        let schema = retry_with_backoff(&self.policy, self.settings.write_timeout(), |_| self.adapter.ensure_schema())
            .await;
        report.add_retries(schema.attempts.saturating_sub(1), schema.backoff);
        match schema.result {
            Ok(status) => info!(%backend, ?status, "schema ready"),
            Err(e) => {
                warn!(%backend, error = %e, "schema could not be prepared, nothing will be written");
                while let Some(raw) = source.next().await {
                    report.read();
                    self.metrics.record_read();
                    report.fail(FailureKind::NotAttempted, raw_id(&raw), format!("schema unavailable: {e}"));
                }
                return report.finish(started.elapsed(), 0, cancel.is_cancelled());
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher {
            ctx: Arc::new(BatchContext {
                adapter: Arc::clone(&self.adapter),
                embedder: self.embedder.clone(),
                fields: self.fields.clone(),
                policy: self.policy,
                write_timeout: self.settings.write_timeout(),
                embed_timeout: self.settings.embed_timeout(),
            }),
            semaphore: Arc::new(Semaphore::new(self.settings.max_in_flight.max(1))),
            tx,
            gauge: Arc::clone(&self.gauge),
            metrics: Arc::clone(&self.metrics),
            seq: 0,
        };

        let batch_size = self.settings.batch_size.max(1);
        let flush_interval = self.settings.flush_interval();
        let mut open: Vec<WineRecord> = Vec::with_capacity(batch_size);
        let mut flush_at: Option<Instant> = None;
        let mut cancelled = false;

        loop {
            let flush_due = async move {
                match flush_at {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => Event::Cancelled,
                () = flush_due => Event::FlushDue,
                item = source.next() => Event::Item(item),
            };

            let ready = match event {
                Event::Cancelled => {
                    cancelled = true;
                    break;
                }
                Event::Item(None) => break,
                Event::FlushDue => true,
                Event::Item(Some(raw)) => {
                    report.read();
                    self.metrics.record_read();
                    match validate(&raw) {
                        Ok(record) => {
                            if open.is_empty() {
                                flush_at = Some(Instant::now() + flush_interval);
                            }
                            open.push(record);
                            open.len() >= batch_size
                        }
                        Err(e) => {
                            self.metrics.record_rejected();
                            debug!(id = ?e.id, error = %e, "record rejected");
                            report.fail(FailureKind::Validation, e.id, e.to_string());
                            false
                        }
                    }
                }
            };

            if ready {
                flush_at = None;
                let records = std::mem::replace(&mut open, Vec::with_capacity(batch_size));
                if let Err(records) = dispatcher.send(records, cancel).await {
                    open = records;
                    cancelled = true;
                    break;
                }
            }
            while let Ok(done) = rx.try_recv() {
                report.absorb(done);
            }
        }

        if cancelled {
            info!(%backend, pending = open.len(), "ingestion cancelled, draining source");
            for record in open.drain(..) {
                report.fail(FailureKind::NotAttempted, Some(record.id), "cancelled before dispatch");
            }
            while let Some(raw) = source.next().await {
                report.read();
                self.metrics.record_read();
                report.fail(FailureKind::NotAttempted, raw_id(&raw), "cancelled before read");
            }
        } else if let Err(records) = dispatcher.send(std::mem::take(&mut open), cancel).await {
            cancelled = true;
            for record in records {
                report.fail(FailureKind::NotAttempted, Some(record.id), "cancelled before dispatch");
            }
        }

        drop(dispatcher);
        while let Some(done) = rx.recv().await {
            report.absorb(done);
        }

        let report = report.finish(started.elapsed(), self.gauge.peak(), cancelled);
        info!(
            %backend,
            read = report.read,
            succeeded = report.succeeded,
            failed = report.failed(),
            not_attempted = report.not_attempted,
            batches = report.batches,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingestion finished"
        );
        report
    }
}
