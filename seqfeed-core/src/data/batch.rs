//! Padded mini-batches
//!
//! A batch owns its padded feature tensor and label matrix together with the
//! true lengths, so padding never leaks into length-dependent code.

use ndarray::{s, Array2, Array3};

use super::index::Label;

/// One utterance after loading and transforming, before padding
#[derive(Debug, Clone)]
pub struct AssembledUtterance {
    pub name: String,
    pub features: Array2<f32>,
    pub label: Label,
    pub label_sub: Option<Label>,
}

/// Labels of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum LabelBatch {
    /// `[B, L_max]` index matrix padded with the pad index
    Indices { padded: Array2<i32>, lengths: Vec<usize> },
    /// Raw transcripts (test splits)
    Text(Vec<String>),
}

impl LabelBatch {
    fn from_labels(labels: &[&Label], pad_index: i32) -> Self {
        let all_indices = labels.iter().all(|l| matches!(l, Label::Indices(_)));
        if !all_indices {
            return LabelBatch::Text(labels.iter().map(|l| label_text(l)).collect());
        }

        let lengths: Vec<usize> = labels.iter().map(|l| l.len()).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        let mut padded = Array2::from_elem((labels.len(), max_len), pad_index);
        for (row, label) in labels.iter().enumerate() {
            if let Label::Indices(idx) = label {
                for (col, &symbol) in idx.iter().enumerate() {
                    padded[[row, col]] = symbol;
                }
            }
        }
        LabelBatch::Indices { padded, lengths }
    }

    /// Number of label sequences
    pub fn len(&self) -> usize {
        match self {
            LabelBatch::Indices { lengths, .. } => lengths.len(),
            LabelBatch::Text(texts) => texts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True label lengths
    pub fn lengths(&self) -> Vec<usize> {
        match self {
            LabelBatch::Indices { lengths, .. } => lengths.clone(),
            LabelBatch::Text(texts) => texts.iter().map(|t| t.chars().count()).collect(),
        }
    }

    fn select(&self, positions: &[usize], pad_index: i32) -> Self {
        match self {
            LabelBatch::Indices { padded, lengths } => {
                let sub_lengths: Vec<usize> = positions.iter().map(|&p| lengths[p]).collect();
                let max_len = sub_lengths.iter().copied().max().unwrap_or(0);
                let mut sub = Array2::from_elem((positions.len(), max_len), pad_index);
                for (row, (&p, &len)) in positions.iter().zip(&sub_lengths).enumerate() {
                    sub.slice_mut(s![row, ..len])
                        .assign(&padded.slice(s![p, ..len]));
                }
                LabelBatch::Indices {
                    padded: sub,
                    lengths: sub_lengths,
                }
            }
            LabelBatch::Text(texts) => {
                LabelBatch::Text(positions.iter().map(|&p| texts[p].clone()).collect())
            }
        }
    }
}

fn label_text(label: &Label) -> String {
    match label {
        Label::Text(text) => text.clone(),
        Label::Indices(idx) => idx
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// A padded mini-batch
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[B, T_max, F]` features, padded along time
    pub inputs: Array3<f32>,
    /// True frame count of each utterance
    pub input_lengths: Vec<usize>,
    /// Primary labels
    pub labels: LabelBatch,
    /// Secondary labels for hierarchical datasets
    pub labels_sub: Option<LabelBatch>,
    /// Utterance ids in batch order
    pub names: Vec<String>,
    feature_pad: f32,
    label_pad: i32,
}

impl Batch {
    /// Pad a group of utterances that share a feature width
    pub fn from_utterances(
        utterances: Vec<AssembledUtterance>,
        feature_dim: usize,
        feature_pad: f32,
        label_pad: i32,
    ) -> Self {
        let input_lengths: Vec<usize> = utterances.iter().map(|u| u.features.nrows()).collect();
        let max_frames = input_lengths.iter().copied().max().unwrap_or(0);

        let mut inputs = Array3::from_elem((utterances.len(), max_frames, feature_dim), feature_pad);
        for (i, utt) in utterances.iter().enumerate() {
            let frames = utt.features.nrows();
            inputs
                .slice_mut(s![i, ..frames, ..])
                .assign(&utt.features);
        }

        let labels: Vec<&Label> = utterances.iter().map(|u| &u.label).collect();
        let labels = LabelBatch::from_labels(&labels, label_pad);

        let subs: Option<Vec<&Label>> = utterances.iter().map(|u| u.label_sub.as_ref()).collect();
        let labels_sub = subs
            .filter(|s| !s.is_empty())
            .map(|s| LabelBatch::from_labels(&s, label_pad));

        Self {
            inputs,
            input_lengths,
            labels,
            labels_sub,
            names: utterances.into_iter().map(|u| u.name).collect(),
            feature_pad,
            label_pad,
        }
    }

    /// Number of utterances
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Padded time dimension
    pub fn max_input_len(&self) -> usize {
        self.inputs.dim().1
    }

    /// Feature width
    pub fn feature_dim(&self) -> usize {
        self.inputs.dim().2
    }

    /// True label lengths of the primary labels
    pub fn label_lengths(&self) -> Vec<usize> {
        self.labels.lengths()
    }

    /// Value used for padded feature frames
    pub fn feature_pad(&self) -> f32 {
        self.feature_pad
    }

    /// Value used for padded label positions
    pub fn label_pad(&self) -> i32 {
        self.label_pad
    }

    /// New batch holding `positions` in the given order, re-padded to the
    /// subset's own maxima
    pub fn select(&self, positions: &[usize]) -> Batch {
        let input_lengths: Vec<usize> = positions.iter().map(|&p| self.input_lengths[p]).collect();
        let max_frames = input_lengths.iter().copied().max().unwrap_or(0);

        let mut inputs = Array3::from_elem(
            (positions.len(), max_frames, self.feature_dim()),
            self.feature_pad,
        );
        for (row, (&p, &frames)) in positions.iter().zip(&input_lengths).enumerate() {
            inputs
                .slice_mut(s![row, ..frames, ..])
                .assign(&self.inputs.slice(s![p, ..frames, ..]));
        }

        Batch {
            inputs,
            input_lengths,
            labels: self.labels.select(positions, self.label_pad),
            labels_sub: self
                .labels_sub
                .as_ref()
                .map(|l| l.select(positions, self.label_pad)),
            names: positions.iter().map(|&p| self.names[p].clone()).collect(),
            feature_pad: self.feature_pad,
            label_pad: self.label_pad,
        }
    }
}
