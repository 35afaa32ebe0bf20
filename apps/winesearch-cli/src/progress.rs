use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use winesearch_ingest::{MetricsSnapshot, PipelineMetrics};

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({percent}%) {msg}";

fn message(s: &MetricsSnapshot) -> String {
    format!("{} batches, {} rejected, {} failed", s.batches_done, s.rejected, s.failed)
}

/// Polls the pipeline counters onto a progress bar until `finish` is called.
pub struct IngestProgress {
    bar: ProgressBar,
    ticker: JoinHandle<()>,
    metrics: Arc<PipelineMetrics>,
}

impl IngestProgress {
    pub fn start(total: usize, metrics: Arc<PipelineMetrics>) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        let ticker = {
            let bar = bar.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(100));
                loop {
                    interval.tick().await;
                    let s = metrics.snapshot();
                    bar.set_position((s.written + s.failed + s.rejected) as u64);
                    bar.set_message(message(&s));
                }
            })
        };
        Self { bar, ticker, metrics }
    }

    pub fn finish(self) {
        self.ticker.abort();
        let s = self.metrics.snapshot();
        self.bar.set_position((s.written + s.failed + s.rejected) as u64);
        self.bar.finish_with_message(message(&s));
    }
}
