//! Utterance index
//!
//! The ordered, deduplicated table of utterances a loader iterates over.
//! Built once from one or two manifests and read-only afterwards.

use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use super::manifest::{Manifest, ManifestRow};
use crate::config::{DataType, LoaderConfig};
use crate::error::{Result, SeqfeedError};

/// Label sequence of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// Already-mapped vocabulary indices
    Indices(Vec<i32>),
    /// Raw transcript (test splits)
    Text(String),
}

impl Label {
    /// Number of symbols (characters for raw text)
    pub fn len(&self) -> usize {
        match self {
            Label::Indices(idx) => idx.len(),
            Label::Text(text) => text.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn parse(transcript: &str, data_type: DataType, source: &str) -> Result<Self> {
        if data_type.is_test() {
            return Ok(Label::Text(transcript.to_string()));
        }
        transcript
            .split_whitespace()
            .map(|tok| {
                tok.parse::<i32>().map_err(|_| SeqfeedError::ManifestInvalid {
                    path: source.to_string(),
                    reason: format!("label token {tok:?} is not an integer index"),
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Label::Indices)
    }
}

/// Metadata for one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceRecord {
    /// Utterance identifier (file stem of `input_path`)
    pub id: String,
    /// Raw frame count, before any transform
    pub frame_count: u32,
    /// Handle passed to the feature source
    pub input_path: String,
    /// Primary label sequence
    pub label: Label,
    /// Secondary label sequence for hierarchical datasets
    pub label_sub: Option<Label>,
}

impl UtteranceRecord {
    pub fn new(id: impl Into<String>, frame_count: u32, input_path: impl Into<String>, label: Label) -> Self {
        Self {
            id: id.into(),
            frame_count,
            input_path: input_path.into(),
            label,
            label_sub: None,
        }
    }

    /// Attach a secondary label
    pub fn with_sub_label(mut self, label: Label) -> Self {
        self.label_sub = Some(label);
        self
    }
}

/// Length filtering and label parsing settings
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub data_type: DataType,
    pub min_frame_num: u32,
    pub max_frame_num: u32,
}

impl From<&LoaderConfig> for IndexOptions {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            data_type: config.data_type,
            min_frame_num: config.min_frame_num,
            max_frame_num: config.max_frame_num,
        }
    }
}

/// Ordered table of utterances
#[derive(Debug, Clone)]
pub struct UtteranceIndex {
    records: Vec<UtteranceRecord>,
    data_type: DataType,
}

impl UtteranceIndex {
    /// Build a single-label index from one manifest
    pub fn from_manifest(manifest: &Manifest, options: &IndexOptions) -> Result<Self> {
        let rows = filter_rows(manifest, options);
        let records = rows
            .into_iter()
            .map(|row| {
                let label = Label::parse(&row.transcript, options.data_type, &manifest.source)?;
                Ok(UtteranceRecord::new(
                    utterance_id(&row.input_path),
                    row.frame_num,
                    row.input_path.clone(),
                    label,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_records(records, options.data_type)
    }

    /// Build a dual-label index from a main and a sub manifest.
    ///
    /// Both manifests are length filtered on their own and must still
    /// describe the same utterances row for row afterwards.
    pub fn from_hierarchical(main: &Manifest, sub: &Manifest, options: &IndexOptions) -> Result<Self> {
        let mut main_rows = filter_rows(main, options);
        let mut sub_rows = filter_rows(sub, options);
        main_rows.sort_by(|a, b| a.input_path.cmp(&b.input_path));
        sub_rows.sort_by(|a, b| a.input_path.cmp(&b.input_path));

        if main_rows.len() != sub_rows.len() {
            return Err(SeqfeedError::Consistency {
                reason: format!(
                    "{} keeps {} utterances after filtering but {} keeps {}",
                    main.source,
                    main_rows.len(),
                    sub.source,
                    sub_rows.len()
                ),
            });
        }
        if let Some((row, (a, b))) = main_rows
            .iter()
            .zip(sub_rows.iter())
            .enumerate()
            .find(|(_, (a, b))| a.input_path != b.input_path)
        {
            return Err(SeqfeedError::Consistency {
                reason: format!(
                    "row {row} refers to {} in {} but {} in {}",
                    a.input_path, main.source, b.input_path, sub.source
                ),
            });
        }

        let records = main_rows
            .into_iter()
            .zip(sub_rows)
            .map(|(row, sub_row)| {
                let label = Label::parse(&row.transcript, options.data_type, &main.source)?;
                let label_sub = Label::parse(&sub_row.transcript, options.data_type, &sub.source)?;
                Ok(UtteranceRecord::new(
                    utterance_id(&row.input_path),
                    row.frame_num,
                    row.input_path.clone(),
                    label,
                )
                .with_sub_label(label_sub))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_records(records, options.data_type)
    }

    /// Build an index from records, keeping the first record of each id
    pub fn from_records(records: Vec<UtteranceRecord>, data_type: DataType) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if record.frame_count == 0 {
                return Err(SeqfeedError::ManifestInvalid {
                    path: record.input_path,
                    reason: "frame count must be > 0".into(),
                });
            }
            if seen.insert(record.id.clone()) {
                kept.push(record);
            } else {
                warn!("Dropping duplicate utterance {}", record.id);
            }
        }
        if kept.is_empty() {
            return Err(SeqfeedError::EmptyIndex {
                reason: "no utterances left after filtering".into(),
            });
        }
        Ok(Self {
            records: kept,
            data_type,
        })
    }

    /// Number of utterances
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for a constructed index
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at a position
    pub fn get(&self, position: usize) -> Option<&UtteranceRecord> {
        self.records.get(position)
    }

    /// All records in index order
    pub fn records(&self) -> &[UtteranceRecord] {
        &self.records
    }

    /// Split this index was built for
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Whether records carry a secondary label
    pub fn is_hierarchical(&self) -> bool {
        self.records.first().is_some_and(|r| r.label_sub.is_some())
    }
}

fn filter_rows<'a>(manifest: &'a Manifest, options: &IndexOptions) -> Vec<&'a ManifestRow> {
    if options.data_type.is_test() {
        return manifest.rows.iter().collect();
    }
    let kept: Vec<&ManifestRow> = manifest
        .rows
        .iter()
        .filter(|row| (options.min_frame_num..=options.max_frame_num).contains(&row.frame_num))
        .collect();
    info!(
        "{}: original utterance num {}, restricted utterance num {}",
        manifest.source,
        manifest.len(),
        kept.len()
    );
    kept
}

fn utterance_id(input_path: &str) -> String {
    Path::new(input_path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| input_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(data_type: DataType) -> IndexOptions {
        IndexOptions {
            data_type,
            min_frame_num: 40,
            max_frame_num: 2000,
        }
    }

    fn manifest(rows: &[(u32, &str, &str)]) -> Manifest {
        Manifest::from_rows(
            "test",
            rows.iter()
                .map(|(n, p, t)| ManifestRow::new(*n, *p, *t))
                .collect(),
        )
    }

    #[test]
    fn test_filters_by_length_for_train() {
        let m = manifest(&[
            (10, "f/a.npy", "1"),
            (100, "f/b.npy", "1 2"),
            (3000, "f/c.npy", "1"),
            (2000, "f/d.npy", "4"),
        ]);
        let index = UtteranceIndex::from_manifest(&m, &options(DataType::Train)).unwrap();
        let ids: Vec<&str> = index.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
        assert_eq!(index.get(0).unwrap().label, Label::Indices(vec![1, 2]));
    }

    #[test]
    fn test_test_split_is_unfiltered_and_raw() {
        let m = manifest(&[(10, "f/a.npy", "hello world"), (3000, "f/b.npy", "bye")]);
        let index = UtteranceIndex::from_manifest(&m, &options(DataType::Test)).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(0).unwrap().label, Label::Text("hello world".into()));
    }

    #[test]
    fn test_non_integer_label_rejected() {
        let m = manifest(&[(100, "f/a.npy", "hello")]);
        assert!(matches!(
            UtteranceIndex::from_manifest(&m, &options(DataType::Dev)),
            Err(SeqfeedError::ManifestInvalid { .. })
        ));
    }

    #[test]
    fn test_duplicates_keep_first() {
        let m = manifest(&[(100, "x/a.npy", "1"), (200, "y/a.npy", "2")]);
        let index = UtteranceIndex::from_manifest(&m, &options(DataType::Train)).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).unwrap().frame_count, 100);
    }

    #[test]
    fn test_empty_after_filter() {
        let m = manifest(&[(5, "f/a.npy", "1")]);
        assert!(matches!(
            UtteranceIndex::from_manifest(&m, &options(DataType::Train)),
            Err(SeqfeedError::EmptyIndex { .. })
        ));
    }

    #[test]
    fn test_hierarchical_aligns_by_path() {
        let main = manifest(&[(100, "f/b.npy", "7"), (120, "f/a.npy", "8")]);
        let sub = manifest(&[(120, "f/a.npy", "1 2 3"), (100, "f/b.npy", "4 5")]);
        let index = UtteranceIndex::from_hierarchical(&main, &sub, &options(DataType::Train)).unwrap();
        assert!(index.is_hierarchical());
        let a = index.get(0).unwrap();
        assert_eq!(a.id, "a");
        assert_eq!(a.label, Label::Indices(vec![8]));
        assert_eq!(a.label_sub, Some(Label::Indices(vec![1, 2, 3])));
    }

    #[test]
    fn test_hierarchical_count_mismatch() {
        let main = manifest(&[(100, "f/a.npy", "1"), (120, "f/b.npy", "2")]);
        // sub disagrees on the frame count of b, so b is filtered only there
        let sub = manifest(&[(100, "f/a.npy", "1"), (5000, "f/b.npy", "2")]);
        assert!(matches!(
            UtteranceIndex::from_hierarchical(&main, &sub, &options(DataType::Train)),
            Err(SeqfeedError::Consistency { .. })
        ));
    }

    #[test]
    fn test_hierarchical_row_mismatch() {
        let main = manifest(&[(100, "f/a.npy", "1"), (120, "f/b.npy", "2")]);
        let sub = manifest(&[(100, "f/a.npy", "1"), (120, "f/c.npy", "2")]);
        let err = UtteranceIndex::from_hierarchical(&main, &sub, &options(DataType::Train)).unwrap_err();
        assert!(err.is_data_corruption());
    }
}
