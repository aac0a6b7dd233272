//! Utterance visitation order
//!
//! Decides, per epoch, in which order the index is walked: by length
//! (curriculum), by a fresh random permutation, or by input path.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use super::index::UtteranceIndex;
use crate::config::LoaderConfig;

/// How one epoch is ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    /// By frame count, ascending unless `reverse`
    Sorted { reverse: bool },
    /// Uniform random permutation
    Shuffled,
    /// Lexicographic by input path
    PathOrder,
}

/// Per-epoch ordering with an optional sort-to-shuffle switch
#[derive(Debug, Clone)]
pub struct OrderingPolicy {
    base: OrderMode,
    sort_stop_epoch: Option<u32>,
    seed: Option<u64>,
}

impl OrderingPolicy {
    /// Create a policy; `sort_stop_epoch` only matters for sorted policies
    pub fn new(base: OrderMode, sort_stop_epoch: Option<u32>, seed: Option<u64>) -> Self {
        Self {
            base,
            sort_stop_epoch,
            seed,
        }
    }

    /// Derive the policy from loader flags
    pub fn from_config(config: &LoaderConfig) -> Self {
        let base = if config.sort_utt {
            OrderMode::Sorted {
                reverse: config.reverse,
            }
        } else if config.shuffle {
            OrderMode::Shuffled
        } else {
            OrderMode::PathOrder
        };
        Self::new(base, config.sort_stop_epoch, config.seed)
    }

    /// Mode in effect for `epoch`
    pub fn mode_for_epoch(&self, epoch: u32) -> OrderMode {
        match (self.base, self.sort_stop_epoch) {
            (OrderMode::Sorted { .. }, Some(stop)) if epoch >= stop => OrderMode::Shuffled,
            (mode, _) => mode,
        }
    }

    /// Positions into `index` in the order they are visited during `epoch`
    pub fn order_for_epoch(&self, index: &UtteranceIndex, epoch: u32) -> Vec<usize> {
        let records = index.records();
        let mut order: Vec<usize> = (0..records.len()).collect();
        let mode = self.mode_for_epoch(epoch);

        match mode {
            OrderMode::Sorted { reverse: false } => {
                order.sort_by_key(|&i| records[i].frame_count);
            }
            OrderMode::Sorted { reverse: true } => {
                order.sort_by(|&a, &b| records[b].frame_count.cmp(&records[a].frame_count));
            }
            OrderMode::PathOrder => {
                order.sort_by(|&a, &b| records[a].input_path.cmp(&records[b].input_path));
            }
            OrderMode::Shuffled => {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(epoch))),
                    None => StdRng::from_entropy(),
                };
                order.shuffle(&mut rng);
            }
        }

        debug!("Epoch {} ordered by {:?}", epoch, mode);
        order
    }
}
