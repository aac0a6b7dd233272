//! Manifest files
//!
//! A manifest is a CSV table with one row per utterance. Only the
//! `frame_num`, `input_path` and `transcript` columns are read.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// One manifest row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRow {
    /// Number of feature frames in the utterance
    pub frame_num: u32,
    /// Reference handed to the feature source
    pub input_path: String,
    /// Space-separated label indices, or raw text for test splits
    pub transcript: String,
}

impl ManifestRow {
    pub fn new(frame_num: u32, input_path: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self {
            frame_num,
            input_path: input_path.into(),
            transcript: transcript.into(),
        }
    }
}

/// Parsed manifest
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Where the rows came from (used in error messages)
    pub source: String,
    /// Rows in file order
    pub rows: Vec<ManifestRow>,
}

impl Manifest {
    /// Read a manifest CSV from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(path.display().to_string(), file)
    }

    /// Read a manifest CSV from any reader
    pub fn from_reader<R: Read>(source: impl Into<String>, reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let source = source.into();

        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        debug!("Read {} manifest rows from {}", rows.len(), source);
        Ok(Self { source, rows })
    }

    /// Build a manifest from rows already in memory
    pub fn from_rows(source: impl Into<String>, rows: Vec<ManifestRow>) -> Self {
        Self {
            source: source.into(),
            rows,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the manifest has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
