//! Error types for seqfeed
//!
//! Error taxonomy covering manifest loading, data integrity,
//! configuration, and the prefetch pipeline.

use thiserror::Error;

/// Primary error type for all seqfeed operations
#[derive(Debug, Error)]
pub enum SeqfeedError {
    // ========== Data Integrity Errors ==========

    /// Dual-label manifests disagree after length filtering
    #[error("Manifest consistency check failed: {reason}")]
    Consistency { reason: String },

    /// A training label is longer than the features it aligns to
    #[error("Label of {utterance} has {label_len} symbols but only {feature_len} frames")]
    LabelLength {
        utterance: String,
        label_len: usize,
        feature_len: usize,
    },

    /// Feature width differs from the rest of the batch
    #[error("Feature width mismatch for {utterance}: expected {expected}, got {actual}")]
    FeatureShape {
        utterance: String,
        expected: usize,
        actual: usize,
    },

    // ========== Manifest Errors ==========

    /// No utterances survived filtering
    #[error("Utterance index is empty: {reason}")]
    EmptyIndex { reason: String },

    /// Manifest row or header could not be used
    #[error("Invalid manifest {path}: {reason}")]
    ManifestInvalid { path: String, reason: String },

    /// Feature file could not be read
    #[error("Failed to load features from {input_path}: {reason}")]
    FeatureLoad { input_path: String, reason: String },

    /// CSV decoding failed
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // ========== Configuration Errors ==========

    /// Configuration rejected at construction
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ========== Runtime Errors ==========

    /// Background producer died without reporting an error
    #[error("Prefetch producer failed: {reason}")]
    ProducerFailed { reason: String },

    /// Shutdown in progress
    #[error("Shutdown in progress")]
    ShutdownInProgress,

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SeqfeedError {
    /// Returns true if this error indicates corrupt input data
    pub fn is_data_corruption(&self) -> bool {
        matches!(
            self,
            SeqfeedError::Consistency { .. }
                | SeqfeedError::LabelLength { .. }
                | SeqfeedError::FeatureShape { .. }
        )
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        SeqfeedError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Result type alias for seqfeed operations
pub type Result<T> = std::result::Result<T, SeqfeedError>;
