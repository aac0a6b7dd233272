//! Loader observability sink
//!
//! A loader reports its lifecycle to one injected [`LoaderObserver`]:
//! opened at construction, once per batch, once per completed epoch, and
//! closed exactly once at shutdown.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DataType;
use crate::metrics::LoaderMetrics;

/// What a loader looks like when it opens
#[derive(Debug, Clone)]
pub struct LoaderSummary {
    pub num_utterances: usize,
    pub nominal_batch_size: usize,
    pub num_devices: usize,
    pub data_type: DataType,
    pub hierarchical: bool,
    pub max_epoch: Option<u32>,
}

/// One emitted batch
#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub epoch: u32,
    pub epoch_detail: f64,
    pub utterances: usize,
    pub dropped: usize,
    pub max_frames: usize,
    pub is_new_epoch: bool,
    pub assembly_time: Duration,
}

/// Receives loader lifecycle events
pub trait LoaderObserver: Send {
    fn on_open(&mut self, _summary: &LoaderSummary) {}

    fn on_batch(&mut self, _event: &BatchEvent) {}

    fn on_epoch_end(&mut self, _epoch: u32) {}

    fn on_close(&mut self) {}
}

/// Logs events through `tracing`
#[derive(Debug, Default)]
pub struct TracingObserver {
    batches: u64,
    utterances: u64,
}

impl LoaderObserver for TracingObserver {
    fn on_open(&mut self, summary: &LoaderSummary) {
        info!(
            "Loader opened: {} utterances, batch size {} over {} device(s), {:?} split",
            summary.num_utterances, summary.nominal_batch_size, summary.num_devices, summary.data_type
        );
    }

    fn on_batch(&mut self, event: &BatchEvent) {
        self.batches += 1;
        self.utterances += event.utterances as u64;
        debug!(
            "Batch {}: {} utterances, {} frames, epoch {:.4} ({:?})",
            self.batches, event.utterances, event.max_frames, event.epoch_detail, event.assembly_time
        );
    }

    fn on_epoch_end(&mut self, epoch: u32) {
        info!("Finished epoch {}", epoch);
    }

    fn on_close(&mut self) {
        info!(
            "Loader closed after {} batches, {} utterances",
            self.batches, self.utterances
        );
    }
}

/// Records events into shared [`LoaderMetrics`]
pub struct MetricsObserver {
    metrics: Arc<LoaderMetrics>,
}

impl MetricsObserver {
    pub fn new(metrics: Arc<LoaderMetrics>) -> Self {
        Self { metrics }
    }
}

impl LoaderObserver for MetricsObserver {
    fn on_batch(&mut self, event: &BatchEvent) {
        self.metrics.batches_emitted.inc();
        self.metrics.utterances_emitted.inc_by(event.utterances as u64);
        self.metrics.utterances_dropped.inc_by(event.dropped as u64);
        self.metrics.batch_size.observe(event.utterances as f64);
        self.metrics
            .assembly_duration
            .observe(event.assembly_time.as_secs_f64());
        self.metrics.current_epoch.set(i64::from(event.epoch));
    }

    fn on_epoch_end(&mut self, epoch: u32) {
        self.metrics.epochs_completed.inc();
        self.metrics.current_epoch.set(i64::from(epoch) + 1);
    }

    fn on_close(&mut self) {
        debug!("Metrics observer closed:\n{}", self.metrics.export());
    }
}
