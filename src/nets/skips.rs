//! Skip connections passed from an encoder to a decoder

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Encoder feature maps captured at every depth, shallowest first.
///
/// Each level is channels-last `[batch, time, height, width, channels]`.
/// The time axis of every level has the same length, and a decoder asked to
/// produce `n` steps needs a bundle of length `n`.
#[derive(Debug, Clone)]
pub struct SkipBundle<B: Backend> {
    levels: Vec<Tensor<B, 5>>,
}

impl<B: Backend> SkipBundle<B> {
    pub fn new(levels: Vec<Tensor<B, 5>>) -> Self {
        if let Some(first) = levels.first() {
            let steps = first.dims()[1];
            assert!(
                levels.iter().all(|l| l.dims()[1] == steps),
                "skip levels disagree on sequence length"
            );
        }
        Self { levels }
    }

    pub fn levels(&self) -> &[Tensor<B, 5>] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Time length shared by every level (0 for an empty bundle).
    pub fn seq_len(&self) -> usize {
        self.levels.first().map(|l| l.dims()[1]).unwrap_or(0)
    }

    /// Keeps `length` steps starting at `start` on every level.
    pub fn slice(&self, start: usize, length: usize) -> Self {
        Self {
            levels: self
                .levels
                .iter()
                .map(|l| l.clone().narrow(1, start, length))
                .collect(),
        }
    }

    /// Broadcasts a single-step bundle to `ntimes` steps.
    pub fn repeat(&self, ntimes: usize) -> Self {
        assert_eq!(
            self.seq_len(),
            1,
            "only single-step skip bundles can be repeated"
        );
        Self {
            levels: self
                .levels
                .iter()
                .map(|l| l.clone().repeat_dim(1, ntimes))
                .collect(),
        }
    }
}
