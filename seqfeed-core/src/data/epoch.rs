//! Epoch accounting
//!
//! Tracks which utterances of the current epoch are still to be emitted,
//! flags the draw that completes an epoch and keeps fractional progress.

use std::sync::Arc;
use tracing::info;

use super::index::UtteranceIndex;
use super::ordering::OrderingPolicy;

/// Snapshot of epoch progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochState {
    pub epoch_index: u32,
    pub consumed_in_epoch: usize,
    pub total_utterances: usize,
}

impl EpochState {
    /// Completed epochs plus the consumed fraction of the current one
    pub fn epoch_detail(&self) -> f64 {
        f64::from(self.epoch_index) + self.consumed_in_epoch as f64 / self.total_utterances as f64
    }
}

/// Index positions handed out by one draw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    /// Positions into the utterance index, in visiting order
    pub positions: Vec<usize>,
    /// This draw emptied its epoch
    pub is_new_epoch: bool,
    /// Epoch the positions belong to
    pub epoch: u32,
}

/// Remaining-set bookkeeping per epoch
pub struct EpochTracker {
    index: Arc<UtteranceIndex>,
    policy: OrderingPolicy,
    /// Visiting order of the current epoch; `order[cursor..]` is remaining
    order: Vec<usize>,
    cursor: usize,
    epoch: u32,
    max_epoch: Option<u32>,
}

impl EpochTracker {
    /// Start at epoch 0
    pub fn new(index: Arc<UtteranceIndex>, policy: OrderingPolicy, max_epoch: Option<u32>) -> Self {
        let order = policy.order_for_epoch(&index, 0);
        Self {
            index,
            policy,
            order,
            cursor: 0,
            epoch: 0,
            max_epoch,
        }
    }

    /// Current epoch index
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Utterances per epoch
    pub fn total(&self) -> usize {
        self.order.len()
    }

    /// Utterances already emitted in the current epoch
    pub fn consumed(&self) -> usize {
        self.cursor
    }

    /// Positions not yet emitted in the current epoch, in visiting order
    pub fn remaining(&self) -> &[usize] {
        &self.order[self.cursor..]
    }

    /// Progress snapshot
    pub fn state(&self) -> EpochState {
        EpochState {
            epoch_index: self.epoch,
            consumed_in_epoch: self.cursor,
            total_utterances: self.order.len(),
        }
    }

    /// Fractional epoch progress
    pub fn epoch_detail(&self) -> f64 {
        self.state().epoch_detail()
    }

    /// Whether the configured number of epochs has been emitted
    pub fn is_finished(&self) -> bool {
        self.max_epoch.is_some_and(|max| self.epoch >= max)
    }

    /// The next `n` positions without consuming them
    pub fn peek(&self, n: usize) -> &[usize] {
        let remaining = self.remaining();
        &remaining[..n.min(remaining.len())]
    }

    /// Take up to `n` positions from the current epoch.
    ///
    /// A draw never spans two epochs. Returns `None` once finished.
    pub fn draw(&mut self, n: usize) -> Option<Draw> {
        if self.is_finished() {
            return None;
        }

        let take = n.max(1).min(self.order.len() - self.cursor);
        let positions = self.order[self.cursor..self.cursor + take].to_vec();
        self.cursor += take;

        let epoch = self.epoch;
        let is_new_epoch = self.cursor == self.order.len();
        if is_new_epoch {
            self.epoch += 1;
            self.cursor = 0;
            info!("Epoch {} complete ({} utterances)", epoch, self.order.len());
            if !self.is_finished() {
                self.order = self.policy.order_for_epoch(&self.index, self.epoch);
            }
        }

        Some(Draw {
            positions,
            is_new_epoch,
            epoch,
        })
    }

    /// Rewind to epoch 0 with a fresh order
    pub fn reset(&mut self) {
        self.epoch = 0;
        self.cursor = 0;
        self.order = self.policy.order_for_epoch(&self.index, 0);
    }
}
