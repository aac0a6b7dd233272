//! Seqfeed Core - mini-batch feeding for sequence-to-sequence training
//!
//! This crate provides:
//! - Manifest-driven utterance indexing with length filtering
//! - Sorted, shuffled and path-ordered epoch iteration
//! - Frame stacking, splicing and padded batch assembly
//! - Multi-device batch splitting
//! - Background prefetching on a Tokio runtime

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod observe;
pub mod runtime;

pub use config::{DataType, LoaderConfig};
pub use data::{DataLoader, LoadedBatch, PrefetchLoader, Step};
pub use error::{Result, SeqfeedError};
pub use runtime::LoaderRuntime;

/// Default prefetch queue capacity, in batches
pub const DEFAULT_PREFETCH_QUEUE_SIZE: usize = 4;
