//! Loader configuration
//!
//! All options are plain data with serde defaults so a TOML file only needs
//! to name what differs from [`LoaderConfig::default`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SeqfeedError};

/// Which split a loader serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Training split: length filtered, label lengths checked
    Train,
    /// Development split: length filtered
    Dev,
    /// Evaluation split: never filtered, labels kept as raw text
    Test,
}

impl DataType {
    /// Whether this split keeps every utterance and raw transcripts
    pub fn is_test(self) -> bool {
        matches!(self, DataType::Test)
    }
}

/// One dynamic batching step: windows whose shortest utterance exceeds
/// `above_frames` are divided by `divisor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthTier {
    pub above_frames: u32,
    pub divisor: usize,
}

/// Length-dependent batch sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicBatchingConfig {
    /// Shrink batches for long utterances
    pub enabled: bool,
    /// Tiers, matched by the largest threshold below the window minimum
    pub tiers: Vec<LengthTier>,
}

impl Default for DynamicBatchingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tiers: vec![
                LengthTier {
                    above_frames: 800,
                    divisor: 2,
                },
                LengthTier {
                    above_frames: 1600,
                    divisor: 4,
                },
            ],
        }
    }
}

/// Configuration for the background prefetch stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Maximum number of assembled batches waiting for the consumer
    pub queue_size: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            queue_size: crate::DEFAULT_PREFETCH_QUEUE_SIZE,
        }
    }
}

/// Configuration for a [`DataLoader`](crate::data::DataLoader)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Utterances per device per batch
    pub batch_size: usize,
    /// Stop after this many epochs; `None` iterates forever
    pub max_epoch: Option<u32>,
    /// Shuffle utterances every epoch
    pub shuffle: bool,
    /// Sort utterances by frame count
    pub sort_utt: bool,
    /// Sort in descending order
    pub reverse: bool,
    /// Epoch from which sorting gives way to shuffling
    pub sort_stop_epoch: Option<u32>,
    /// Frames concatenated per stacked block
    pub num_stack: usize,
    /// Frames advanced between stacked blocks
    pub num_skip: usize,
    /// Context window for splicing (odd)
    pub splice: usize,
    /// Devices each batch is split across
    pub num_devices: usize,
    /// Length-dependent batch sizing
    pub dynamic_batching: DynamicBatchingConfig,
    /// Shortest utterance kept (non-test splits)
    pub min_frame_num: u32,
    /// Longest utterance kept (non-test splits)
    pub max_frame_num: u32,
    /// Split served by the loader
    pub data_type: DataType,
    /// Seed for shuffled epochs
    pub seed: Option<u64>,
    /// Padding value for label sequences
    pub label_pad_index: i32,
    /// Padding value for feature frames
    pub feature_pad_value: f32,
    /// Order each device slice by descending input length
    pub sort_within_device: bool,
    /// Prefetch stage settings
    pub prefetch: PrefetchConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_epoch: None,
            shuffle: false,
            sort_utt: false,
            reverse: false,
            sort_stop_epoch: None,
            num_stack: 1,
            num_skip: 1,
            splice: 1,
            num_devices: 1,
            dynamic_batching: DynamicBatchingConfig::default(),
            min_frame_num: 40,
            max_frame_num: 2000,
            data_type: DataType::Train,
            seed: None,
            label_pad_index: -1,
            feature_pad_value: 0.0,
            sort_within_device: false,
            prefetch: PrefetchConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SeqfeedError::config(e.to_string()))
    }

    /// Read and parse a TOML configuration file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Batch size before dynamic sizing, across all devices
    pub fn nominal_batch_size(&self) -> usize {
        self.batch_size * self.num_devices
    }

    /// Reject ambiguous or impossible settings
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SeqfeedError::config("batch_size must be > 0"));
        }
        if self.num_devices == 0 {
            return Err(SeqfeedError::config("num_devices must be > 0"));
        }
        if self.num_stack == 0 || self.num_skip == 0 {
            return Err(SeqfeedError::config("num_stack and num_skip must be > 0"));
        }
        if self.splice == 0 || self.splice % 2 == 0 {
            return Err(SeqfeedError::config(format!(
                "splice must be a positive odd number, got {}",
                self.splice
            )));
        }
        if self.shuffle && self.sort_utt {
            return Err(SeqfeedError::config(
                "shuffle and sort_utt cannot both be enabled",
            ));
        }
        if self.sort_stop_epoch.is_some() && !self.sort_utt {
            return Err(SeqfeedError::config("sort_stop_epoch requires sort_utt"));
        }
        if self.min_frame_num > self.max_frame_num {
            return Err(SeqfeedError::config(format!(
                "min_frame_num ({}) exceeds max_frame_num ({})",
                self.min_frame_num, self.max_frame_num
            )));
        }
        if self.max_epoch == Some(0) {
            return Err(SeqfeedError::config("max_epoch must be > 0 when set"));
        }
        if self.prefetch.queue_size == 0 {
            return Err(SeqfeedError::config("prefetch.queue_size must be > 0"));
        }
        if self.dynamic_batching.tiers.iter().any(|t| t.divisor == 0) {
            return Err(SeqfeedError::config(
                "dynamic batching divisors must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LoaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.nominal_batch_size(), 32);
    }

    #[test]
    fn test_rejects_conflicting_order_flags() {
        let config = LoaderConfig {
            shuffle: true,
            sort_utt: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SeqfeedError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_even_splice() {
        let config = LoaderConfig {
            splice: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_batch_and_epoch() {
        let zero_batch = LoaderConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(zero_batch.validate().is_err());

        let zero_epoch = LoaderConfig {
            max_epoch: Some(0),
            ..Default::default()
        };
        assert!(zero_epoch.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config = LoaderConfig::from_toml_str(
            r#"
            batch_size = 16
            sort_utt = true
            reverse = true
            sort_stop_epoch = 2
            num_devices = 2
            data_type = "dev"

            [dynamic_batching]
            enabled = true

            [prefetch]
            queue_size = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.batch_size, 16);
        assert_eq!(config.nominal_batch_size(), 32);
        assert_eq!(config.sort_stop_epoch, Some(2));
        assert_eq!(config.data_type, DataType::Dev);
        assert!(config.dynamic_batching.enabled);
        assert_eq!(config.dynamic_batching.tiers.len(), 2);
        assert_eq!(config.prefetch.queue_size, 8);
        assert_eq!(config.splice, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_rejects_unknown_type() {
        assert!(LoaderConfig::from_toml_str("batch_size = \"many\"").is_err());
    }
}
