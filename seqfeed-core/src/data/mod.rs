//! Data loading pipeline
//!
//! Manifest parsing, utterance indexing, per-epoch ordering, batch
//! assembly, multi-device splitting and background prefetching.

pub mod assembler;
pub mod batch;
pub mod corpus;
pub mod epoch;
pub mod index;
pub mod loader;
pub mod manifest;
pub mod ordering;
pub mod prefetcher;
pub mod splitter;
pub mod transform;

pub use assembler::BatchAssembler;
pub use batch::{Batch, LabelBatch};
pub use corpus::{Corpus, FeatureSource, HierarchicalCorpus, ManifestCorpus, MemoryFeatureSource, NpyFeatureSource};
pub use epoch::{EpochState, EpochTracker};
pub use index::{IndexOptions, Label, UtteranceIndex, UtteranceRecord};
pub use loader::{DataLoader, LoadedBatch, Step};
pub use manifest::{Manifest, ManifestRow};
pub use ordering::{OrderMode, OrderingPolicy};
pub use prefetcher::{PrefetchLoader, Prefetcher};
pub use splitter::{DeviceBatches, DeviceSplitter};
pub use transform::FrameTransformer;
