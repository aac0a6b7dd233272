//! Mini-batch loader
//!
//! Wires the utterance index, ordering policy, epoch tracker, batch
//! assembler and device splitter into one synchronous iterator.

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::assembler::BatchAssembler;
use super::batch::Batch;
use super::corpus::Corpus;
use super::epoch::{EpochState, EpochTracker};
use super::index::{IndexOptions, UtteranceIndex};
use super::ordering::OrderingPolicy;
use super::splitter::{DeviceBatches, DeviceSplitter};
use crate::config::LoaderConfig;
use crate::error::Result;
use crate::observe::{BatchEvent, LoaderObserver, LoaderSummary, TracingObserver};

/// Batch delivered for one step
#[derive(Debug, Clone)]
pub enum LoadedBatch {
    /// Single-device batch
    Single(Batch),
    /// Batch partitioned across devices
    Devices(DeviceBatches),
}

impl LoadedBatch {
    /// Utterances delivered to the caller
    pub fn num_utterances(&self) -> usize {
        match self {
            LoadedBatch::Single(batch) => batch.len(),
            LoadedBatch::Devices(devices) => devices.num_utterances(),
        }
    }

    /// Delivered ids, in device order when split
    pub fn names(&self) -> Vec<&str> {
        match self {
            LoadedBatch::Single(batch) => batch.names.iter().map(String::as_str).collect(),
            LoadedBatch::Devices(devices) => devices.names(),
        }
    }

    /// Ids that were drawn but not delivered
    pub fn dropped(&self) -> &[String] {
        match self {
            LoadedBatch::Single(_) => &[],
            LoadedBatch::Devices(devices) => &devices.dropped,
        }
    }

    /// The batch, when not split
    pub fn as_single(&self) -> Option<&Batch> {
        match self {
            LoadedBatch::Single(batch) => Some(batch),
            LoadedBatch::Devices(_) => None,
        }
    }

    /// The per-device batches, when split
    pub fn as_devices(&self) -> Option<&DeviceBatches> {
        match self {
            LoadedBatch::Single(_) => None,
            LoadedBatch::Devices(devices) => Some(devices),
        }
    }

    fn max_frames(&self) -> usize {
        match self {
            LoadedBatch::Single(batch) => batch.max_input_len(),
            LoadedBatch::Devices(devices) => devices
                .batches
                .iter()
                .map(Batch::max_input_len)
                .max()
                .unwrap_or(0),
        }
    }
}

/// One iteration step
#[derive(Debug, Clone)]
pub struct Step {
    pub batch: LoadedBatch,
    /// This batch completed an epoch
    pub is_new_epoch: bool,
    /// Progress after this batch
    pub epoch_detail: f64,
}

/// Synchronous mini-batch loader.
///
/// Iteration is unbounded when `max_epoch` is `None`; the caller must then
/// stop on its own condition.
pub struct DataLoader {
    config: LoaderConfig,
    index: Arc<UtteranceIndex>,
    assembler: BatchAssembler,
    tracker: EpochTracker,
    splitter: Option<DeviceSplitter>,
    observer: Box<dyn LoaderObserver>,
    closed: bool,
}

impl DataLoader {
    /// Create a loader that logs through `tracing`
    pub fn new(corpus: Arc<dyn Corpus>, config: LoaderConfig) -> Result<Self> {
        Self::with_observer(corpus, config, Box::new(TracingObserver::default()))
    }

    /// Create a loader reporting to `observer`
    pub fn with_observer(
        corpus: Arc<dyn Corpus>,
        config: LoaderConfig,
        mut observer: Box<dyn LoaderObserver>,
    ) -> Result<Self> {
        config.validate()?;

        let index = Arc::new(corpus.build_utterance_index(&IndexOptions::from(&config))?);
        let policy = OrderingPolicy::from_config(&config);
        let tracker = EpochTracker::new(index.clone(), policy, config.max_epoch);
        let assembler = BatchAssembler::new(corpus, &config);
        let splitter = (config.num_devices > 1).then(|| DeviceSplitter::from_config(&config));

        observer.on_open(&LoaderSummary {
            num_utterances: index.len(),
            nominal_batch_size: assembler.nominal_batch_size(),
            num_devices: config.num_devices,
            data_type: config.data_type,
            hierarchical: index.is_hierarchical(),
            max_epoch: config.max_epoch,
        });

        Ok(Self {
            config,
            index,
            assembler,
            tracker,
            splitter,
            observer,
            closed: false,
        })
    }

    /// Assemble the next batch; `None` once `max_epoch` epochs are emitted.
    ///
    /// An error consumes the failed draw. When that draw completed an epoch,
    /// the boundary is only visible through the observer's `on_epoch_end`
    /// and through [`epoch`](Self::epoch), which has already advanced.
    pub fn next_step(&mut self) -> Option<Result<Step>> {
        let window = self.tracker.peek(self.assembler.nominal_batch_size());
        let batch_size = self.assembler.batch_size_for(&self.index, window);
        let draw = self.tracker.draw(batch_size)?;

        let start = Instant::now();
        let batch = match self.assembler.assemble(&self.index, &draw.positions) {
            Ok(batch) => batch,
            Err(e) => {
                if draw.is_new_epoch {
                    self.observer.on_epoch_end(draw.epoch);
                }
                return Some(Err(e));
            }
        };
        let batch = match &self.splitter {
            Some(splitter) => LoadedBatch::Devices(splitter.split(&batch)),
            None => LoadedBatch::Single(batch),
        };
        let assembly_time = start.elapsed();

        let epoch_detail = self.tracker.epoch_detail();
        self.observer.on_batch(&BatchEvent {
            epoch: draw.epoch,
            epoch_detail,
            utterances: batch.num_utterances(),
            dropped: batch.dropped().len(),
            max_frames: batch.max_frames(),
            is_new_epoch: draw.is_new_epoch,
            assembly_time,
        });
        if draw.is_new_epoch {
            self.observer.on_epoch_end(draw.epoch);
        }

        Some(Ok(Step {
            batch,
            is_new_epoch: draw.is_new_epoch,
            epoch_detail,
        }))
    }

    /// Fractional epoch progress
    pub fn epoch_detail(&self) -> f64 {
        self.tracker.epoch_detail()
    }

    /// Current epoch index
    pub fn epoch(&self) -> u32 {
        self.tracker.epoch()
    }

    /// Progress snapshot
    pub fn epoch_state(&self) -> EpochState {
        self.tracker.state()
    }

    /// Utterances per epoch
    pub fn num_utterances(&self) -> usize {
        self.index.len()
    }

    /// Batch size before dynamic sizing, across devices
    pub fn nominal_batch_size(&self) -> usize {
        self.assembler.nominal_batch_size()
    }

    /// Ids not yet emitted in the current epoch
    pub fn remaining_ids(&self) -> Vec<&str> {
        self.tracker
            .remaining()
            .iter()
            .filter_map(|&pos| self.index.get(pos))
            .map(|record| record.id.as_str())
            .collect()
    }

    /// The utterance index
    pub fn index(&self) -> &Arc<UtteranceIndex> {
        &self.index
    }

    /// Configuration in effect
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Whether iteration has reached `max_epoch`
    pub fn is_finished(&self) -> bool {
        self.tracker.is_finished()
    }

    /// Restart from epoch 0
    pub fn reset(&mut self) {
        debug!("Resetting loader at epoch {:.4}", self.epoch_detail());
        self.tracker.reset();
    }

    /// Close the observer
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.closed {
            self.closed = true;
            self.observer.on_close();
        }
    }
}

impl Iterator for DataLoader {
    type Item = Result<Step>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_step()
    }
}

impl Drop for DataLoader {
    fn drop(&mut self) {
        self.finish();
    }
}
