//! Batch assembly
//!
//! Loads and transforms the utterances of one draw, validates them and pads
//! them into a [`Batch`]. Also owns the length-dependent batch sizing rule.

use std::sync::Arc;
use tracing::debug;

use super::batch::{AssembledUtterance, Batch};
use super::corpus::Corpus;
use super::index::UtteranceIndex;
use super::transform::FrameTransformer;
use crate::config::{DataType, DynamicBatchingConfig, LoaderConfig};
use crate::error::{Result, SeqfeedError};

/// Turns drawn index positions into padded batches
pub struct BatchAssembler {
    corpus: Arc<dyn Corpus>,
    transformer: FrameTransformer,
    dynamic: DynamicBatchingConfig,
    batch_size: usize,
    num_devices: usize,
    data_type: DataType,
    feature_pad: f32,
    label_pad: i32,
}

impl BatchAssembler {
    pub fn new(corpus: Arc<dyn Corpus>, config: &LoaderConfig) -> Self {
        Self {
            corpus,
            transformer: FrameTransformer::from(config),
            dynamic: config.dynamic_batching.clone(),
            batch_size: config.batch_size,
            num_devices: config.num_devices.max(1),
            data_type: config.data_type,
            feature_pad: config.feature_pad_value,
            label_pad: config.label_pad_index,
        }
    }

    /// Batch size before dynamic sizing, across devices
    pub fn nominal_batch_size(&self) -> usize {
        self.batch_size * self.num_devices
    }

    /// Transform applied to every utterance
    pub fn transformer(&self) -> &FrameTransformer {
        &self.transformer
    }

    /// Batch size for a window whose shortest utterance has `min_frames`.
    ///
    /// The per-device size is divided, so the result stays a multiple of the
    /// device count and only an epoch's last draw can leave a remainder.
    pub fn select_batch_size(&self, min_frames: u32) -> usize {
        if !self.dynamic.enabled {
            return self.nominal_batch_size();
        }
        let divisor = self
            .dynamic
            .tiers
            .iter()
            .filter(|tier| min_frames > tier.above_frames)
            .max_by_key(|tier| tier.above_frames)
            .map_or(1, |tier| tier.divisor);
        (self.batch_size / divisor).max(1) * self.num_devices
    }

    /// Batch size for the upcoming `window` of index positions
    pub fn batch_size_for(&self, index: &UtteranceIndex, window: &[usize]) -> usize {
        let min_frames = window
            .iter()
            .filter_map(|&pos| index.get(pos))
            .map(|record| record.frame_count)
            .min()
            .unwrap_or(0);
        self.select_batch_size(min_frames)
    }

    /// Load, transform, validate and pad the utterances at `positions`
    pub fn assemble(&self, index: &UtteranceIndex, positions: &[usize]) -> Result<Batch> {
        let mut utterances = Vec::with_capacity(positions.len());
        let mut feature_dim = None;

        for &pos in positions {
            let record = index.get(pos).ok_or_else(|| SeqfeedError::Internal {
                message: format!("index position {pos} out of range"),
            })?;

            let raw = self.corpus.load_raw_features(record)?;
            let features = self.transformer.apply(raw.view());

            let width = features.ncols();
            match feature_dim {
                None => feature_dim = Some(width),
                Some(expected) if expected != width => {
                    return Err(SeqfeedError::FeatureShape {
                        utterance: record.id.clone(),
                        expected,
                        actual: width,
                    });
                }
                Some(_) => {}
            }

            if self.data_type == DataType::Train {
                let frames = features.nrows();
                let longest_label = record
                    .label_sub
                    .iter()
                    .chain(std::iter::once(&record.label))
                    .map(|l| l.len())
                    .max()
                    .unwrap_or(0);
                if longest_label > frames {
                    return Err(SeqfeedError::LabelLength {
                        utterance: record.id.clone(),
                        label_len: longest_label,
                        feature_len: frames,
                    });
                }
            }

            utterances.push(AssembledUtterance {
                name: record.id.clone(),
                features,
                label: record.label.clone(),
                label_sub: record.label_sub.clone(),
            });
        }

        let batch = Batch::from_utterances(
            utterances,
            feature_dim.unwrap_or(0),
            self.feature_pad,
            self.label_pad,
        );
        debug!(
            "Assembled batch of {} utterances, {} frames x {} dims",
            batch.len(),
            batch.max_input_len(),
            batch.feature_dim()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LengthTier;
    use crate::data::corpus::{ManifestCorpus, MemoryFeatureSource};
    use crate::data::index::IndexOptions;
    use crate::data::manifest::{Manifest, ManifestRow};
    use ndarray::Array2;

    fn setup(rows: &[(u32, &str, &str, usize)], config: &LoaderConfig) -> (BatchAssembler, UtteranceIndex) {
        let source = MemoryFeatureSource::new();
        let mut manifest_rows = Vec::new();
        for &(frames, path, transcript, dim) in rows {
            source.insert(path, Array2::from_elem((frames as usize, dim), 0.5));
            manifest_rows.push(ManifestRow::new(frames, path, transcript));
        }
        let corpus = ManifestCorpus::new(Manifest::from_rows("inline", manifest_rows), source);
        let index = corpus
            .build_utterance_index(&IndexOptions::from(config))
            .unwrap();
        (BatchAssembler::new(Arc::new(corpus), config), index)
    }

    #[test]
    fn test_dynamic_batch_size() {
        let config = LoaderConfig {
            batch_size: 64,
            dynamic_batching: DynamicBatchingConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let (assembler, _) = setup(&[(100, "a.npy", "1", 2)], &config);
        assert_eq!(assembler.select_batch_size(100), 64);
        assert_eq!(assembler.select_batch_size(800), 64);
        assert_eq!(assembler.select_batch_size(801), 32);
        assert_eq!(assembler.select_batch_size(1600), 32);
        assert_eq!(assembler.select_batch_size(1601), 16);
    }

    #[test]
    fn test_dynamic_batch_size_floor() {
        let config = LoaderConfig {
            batch_size: 2,
            dynamic_batching: DynamicBatchingConfig {
                enabled: true,
                tiers: vec![LengthTier {
                    above_frames: 10,
                    divisor: 8,
                }],
            },
            ..Default::default()
        };
        let (assembler, _) = setup(&[(100, "a.npy", "1", 2)], &config);
        assert_eq!(assembler.select_batch_size(500), 1);
    }

    #[test]
    fn test_dynamic_batch_size_multiple_of_devices() {
        let config = LoaderConfig {
            batch_size: 3,
            num_devices: 2,
            dynamic_batching: DynamicBatchingConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let (assembler, _) = setup(&[(100, "a.npy", "1", 2)], &config);
        assert_eq!(assembler.select_batch_size(100), 6);
        assert_eq!(assembler.select_batch_size(900), 2);
        assert_eq!(assembler.select_batch_size(1700), 2);
    }

    #[test]
    fn test_disabled_dynamic_batching_keeps_nominal() {
        let config = LoaderConfig {
            batch_size: 8,
            num_devices: 2,
            ..Default::default()
        };
        let (assembler, _) = setup(&[(100, "a.npy", "1", 2)], &config);
        assert_eq!(assembler.select_batch_size(5000), 16);
    }

    #[test]
    fn test_label_longer_than_features_fails() {
        let config = LoaderConfig {
            num_stack: 3,
            num_skip: 3,
            min_frame_num: 1,
            ..Default::default()
        };
        // 6 frames stack to 2, but the label has 3 symbols
        let (assembler, index) = setup(&[(6, "a.npy", "1 2 3", 2)], &config);
        assert!(matches!(
            assembler.assemble(&index, &[0]),
            Err(SeqfeedError::LabelLength {
                label_len: 3,
                feature_len: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_label_length_not_checked_outside_train() {
        let config = LoaderConfig {
            data_type: DataType::Dev,
            min_frame_num: 1,
            ..Default::default()
        };
        let (assembler, index) = setup(&[(2, "a.npy", "1 2 3", 2)], &config);
        assert!(assembler.assemble(&index, &[0]).is_ok());
    }

    #[test]
    fn test_feature_width_mismatch() {
        let config = LoaderConfig {
            min_frame_num: 1,
            ..Default::default()
        };
        let (assembler, index) = setup(&[(50, "a.npy", "1", 2), (60, "b.npy", "1", 3)], &config);
        assert!(matches!(
            assembler.assemble(&index, &[0, 1]),
            Err(SeqfeedError::FeatureShape { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn test_assemble_applies_transform() {
        let config = LoaderConfig {
            num_stack: 2,
            num_skip: 2,
            splice: 3,
            min_frame_num: 1,
            ..Default::default()
        };
        let (assembler, index) = setup(&[(50, "a.npy", "1 2", 4), (41, "b.npy", "3", 4)], &config);
        let batch = assembler.assemble(&index, &[1, 0]).unwrap();
        assert_eq!(batch.names, vec!["b", "a"]);
        assert_eq!(batch.input_lengths, vec![20, 25]);
        assert_eq!(batch.inputs.dim(), (2, 25, 24));
    }
}
