//! Multi-device batch partitioning
//!
//! Slices an assembled batch into one contiguous sub-batch per device. When
//! the batch does not divide evenly, the `len % num_devices` trailing
//! utterances (the tail of the last device slot) are dropped.

use tracing::warn;

use super::batch::Batch;
use crate::config::LoaderConfig;

/// Per-device sub-batches of one draw
#[derive(Debug, Clone)]
pub struct DeviceBatches {
    /// One batch per device that received utterances
    pub batches: Vec<Batch>,
    /// `permutation[k]` is the draw-order position of the `k`-th utterance
    /// when the device batches are concatenated
    pub permutation: Vec<usize>,
    /// Ids that were not assigned to any device
    pub dropped: Vec<String>,
}

impl DeviceBatches {
    /// Utterances across all devices
    pub fn num_utterances(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    /// Ids in flattened device order
    pub fn names(&self) -> Vec<&str> {
        self.batches
            .iter()
            .flat_map(|b| b.names.iter().map(String::as_str))
            .collect()
    }
}

/// Device assignment plan for a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Draw-order positions per device slot
    pub slots: Vec<Vec<usize>>,
    /// Draw-order positions assigned to no device
    pub dropped: Vec<usize>,
}

/// Splits batches across devices
#[derive(Debug, Clone, Copy)]
pub struct DeviceSplitter {
    num_devices: usize,
    sort_within_device: bool,
}

impl DeviceSplitter {
    pub fn new(num_devices: usize, sort_within_device: bool) -> Self {
        Self {
            num_devices: num_devices.max(1),
            sort_within_device,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.num_devices, config.sort_within_device)
    }

    /// Number of configured devices
    pub fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// Plan the assignment of `input_lengths.len()` utterances
    pub fn partition(&self, input_lengths: &[usize]) -> Partition {
        let len = input_lengths.len();
        let (mut slots, dropped): (Vec<Vec<usize>>, Vec<usize>) = if len >= self.num_devices {
            let per_device = len / self.num_devices;
            let kept = per_device * self.num_devices;
            let slots = (0..self.num_devices)
                .map(|d| (d * per_device..(d + 1) * per_device).collect())
                .collect();
            (slots, (kept..len).collect())
        } else {
            ((0..len).map(|p| vec![p]).collect(), Vec::new())
        };

        if self.sort_within_device {
            for slot in &mut slots {
                slot.sort_by(|&a, &b| input_lengths[b].cmp(&input_lengths[a]));
            }
        }

        Partition { slots, dropped }
    }

    /// Slice `batch` into per-device batches
    pub fn split(&self, batch: &Batch) -> DeviceBatches {
        let Partition { slots, dropped } = self.partition(&batch.input_lengths);

        let dropped: Vec<String> = dropped.iter().map(|&p| batch.names[p].clone()).collect();
        if !dropped.is_empty() {
            warn!(
                "Batch of {} does not divide across {} devices, dropping {:?}",
                batch.len(),
                self.num_devices,
                dropped
            );
        }

        DeviceBatches {
            batches: slots.iter().map(|slot| batch.select(slot)).collect(),
            permutation: slots.into_iter().flatten().collect(),
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let splitter = DeviceSplitter::new(2, false);
        let plan = splitter.partition(&[5, 6, 7, 8]);
        assert_eq!(plan.slots, vec![vec![0, 1], vec![2, 3]]);
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_remainder_dropped_from_tail() {
        let splitter = DeviceSplitter::new(3, false);
        let plan = splitter.partition(&[1, 1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(plan.slots, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
        assert_eq!(plan.dropped, vec![6, 7]);
    }

    #[test]
    fn test_fewer_utterances_than_devices() {
        let splitter = DeviceSplitter::new(4, false);
        let plan = splitter.partition(&[3, 9]);
        assert_eq!(plan.slots, vec![vec![0], vec![1]]);
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_sort_within_device() {
        let splitter = DeviceSplitter::new(2, true);
        let plan = splitter.partition(&[10, 30, 20, 20, 50, 40]);
        assert_eq!(plan.slots, vec![vec![1, 2, 0], vec![4, 5, 3]]);
    }
}
