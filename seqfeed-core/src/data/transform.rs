//! Frame-level feature transforms
//!
//! Stacking/skipping downsamples an utterance in time, splicing widens each
//! frame with its neighbours. Both operate on one `[T, F]` matrix at a time.

use ndarray::{s, Array2, ArrayView2};

use crate::config::LoaderConfig;

/// Stack `num_stack` consecutive frames into one, advancing by `num_skip`.
///
/// Trailing frames that cannot fill a block are dropped. An utterance shorter
/// than one block yields a single block padded with its last frame.
pub fn stack_frames(features: ArrayView2<'_, f32>, num_stack: usize, num_skip: usize) -> Array2<f32> {
    let (frames, dim) = features.dim();
    if num_stack == 1 && num_skip == 1 {
        return features.to_owned();
    }
    if frames == 0 {
        return Array2::zeros((0, dim * num_stack));
    }

    let out_frames = if frames >= num_stack {
        (frames - num_stack) / num_skip + 1
    } else {
        1
    };

    let mut out = Array2::zeros((out_frames, dim * num_stack));
    for t in 0..out_frames {
        let start = t * num_skip;
        for j in 0..num_stack {
            let src = (start + j).min(frames - 1);
            out.slice_mut(s![t, j * dim..(j + 1) * dim])
                .assign(&features.row(src));
        }
    }
    out
}

/// Concatenate each frame with `splice / 2` neighbours on either side.
///
/// Out-of-range neighbours repeat the first or last frame.
pub fn splice_frames(features: ArrayView2<'_, f32>, splice: usize) -> Array2<f32> {
    let (frames, dim) = features.dim();
    if splice == 1 {
        return features.to_owned();
    }
    if frames == 0 {
        return Array2::zeros((0, dim * splice));
    }

    let half = (splice / 2) as isize;
    let last = frames as isize - 1;
    let mut out = Array2::zeros((frames, dim * splice));
    for t in 0..frames {
        for j in 0..splice {
            let src = (t as isize + j as isize - half).clamp(0, last) as usize;
            out.slice_mut(s![t, j * dim..(j + 1) * dim])
                .assign(&features.row(src));
        }
    }
    out
}

/// Stacking followed by splicing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTransformer {
    pub num_stack: usize,
    pub num_skip: usize,
    pub splice: usize,
}

impl Default for FrameTransformer {
    fn default() -> Self {
        Self {
            num_stack: 1,
            num_skip: 1,
            splice: 1,
        }
    }
}

impl From<&LoaderConfig> for FrameTransformer {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            num_stack: config.num_stack,
            num_skip: config.num_skip,
            splice: config.splice,
        }
    }
}

impl FrameTransformer {
    /// Transform one utterance
    pub fn apply(&self, features: ArrayView2<'_, f32>) -> Array2<f32> {
        let stacked = stack_frames(features, self.num_stack, self.num_skip);
        if self.splice == 1 {
            return stacked;
        }
        splice_frames(stacked.view(), self.splice)
    }

    /// Feature width after transforming `raw_dim`-wide frames
    pub fn output_dim(&self, raw_dim: usize) -> usize {
        raw_dim * self.num_stack * self.splice
    }

    /// Frame count after transforming `raw_frames` frames
    pub fn output_frames(&self, raw_frames: usize) -> usize {
        match raw_frames {
            0 => 0,
            n if n < self.num_stack => 1,
            n => (n - self.num_stack) / self.num_skip + 1,
        }
    }

    /// Whether the transform leaves features untouched
    pub fn is_identity(&self) -> bool {
        self.num_stack == 1 && self.num_skip == 1 && self.splice == 1
    }
}
