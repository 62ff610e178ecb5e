//! Positive/negative error images
//!
//! A prediction is written as `reference + pos - neg` where `pos` and `neg`
//! are non-negative. Ground-truth pairs come from clamping the difference
//! both ways, so at every element at least one of them is exactly zero.

use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Number of channels of one half of an error pair.
pub const FRAME_CHANNELS: usize = 3;

/// Error image pair, each `[batch, time, h, w, 3]`.
#[derive(Debug, Clone)]
pub struct ErrorPair<B: Backend> {
    pub pos: Tensor<B, 5>,
    pub neg: Tensor<B, 5>,
}

impl<B: Backend> ErrorPair<B> {
    /// `(relu(actual - reference), relu(reference - actual))`
    pub fn from_target(actual: Tensor<B, 5>, reference: Tensor<B, 5>) -> Self {
        Self {
            pos: relu(actual.clone() - reference.clone()),
            neg: relu(reference - actual),
        }
    }

    /// Splits a 6-channel decoder output into its positive and negative halves.
    pub fn split(decoded: Tensor<B, 5>) -> Self {
        let channels = decoded.dims()[4];
        assert_eq!(
            channels,
            2 * FRAME_CHANNELS,
            "error decoder must produce {} channels, got {}",
            2 * FRAME_CHANNELS,
            channels
        );
        Self {
            pos: decoded.clone().narrow(4, 0, FRAME_CHANNELS),
            neg: decoded.narrow(4, FRAME_CHANNELS, FRAME_CHANNELS),
        }
    }

    /// `[pos, neg]` on the channel axis.
    pub fn concat(&self) -> Tensor<B, 5> {
        Tensor::cat(vec![self.pos.clone(), self.neg.clone()], 4)
    }

    /// `pos - neg`
    pub fn residual(&self) -> Tensor<B, 5> {
        self.pos.clone() - self.neg.clone()
    }

    /// `reference + pos - neg`
    pub fn apply(&self, reference: Tensor<B, 5>) -> Tensor<B, 5> {
        reference + self.pos.clone() - self.neg.clone()
    }

    /// Keeps `length` steps starting at `start`.
    pub fn narrow_time(&self, start: usize, length: usize) -> Self {
        Self {
            pos: self.pos.clone().narrow(1, start, length),
            neg: self.neg.clone().narrow(1, start, length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type Backend = NdArray<f32>;

    #[test]
    fn test_ground_truth_pair_is_disjoint_and_nonnegative() {
        let device = Default::default();
        let actual = Tensor::<Backend, 5>::random([2, 3, 4, 4, 3], Distribution::Uniform(0.0, 1.0), &device);
        let reference = Tensor::<Backend, 5>::random([2, 3, 4, 4, 3], Distribution::Uniform(0.0, 1.0), &device);

        let pair = ErrorPair::from_target(actual.clone(), reference.clone());
        let pos = pair.pos.clone().into_data().to_vec::<f32>().unwrap();
        let neg = pair.neg.clone().into_data().to_vec::<f32>().unwrap();

        for (p, n) in pos.iter().zip(neg.iter()) {
            assert!(*p >= 0.0 && *n >= 0.0);
            assert!(*p == 0.0 || *n == 0.0);
        }

        let rebuilt = pair.apply(reference);
        let diff = (rebuilt - actual).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_split_and_concat() {
        let device = Default::default();
        let decoded = Tensor::<Backend, 5>::random([1, 2, 4, 4, 6], Distribution::Uniform(0.0, 1.0), &device);

        let pair = ErrorPair::split(decoded.clone());
        assert_eq!(pair.pos.dims(), [1, 2, 4, 4, 3]);
        assert_eq!(pair.neg.dims(), [1, 2, 4, 4, 3]);

        let diff = (pair.concat() - decoded).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_apply_is_reference_plus_residual_terms() {
        let device = Default::default();
        let decoded = Tensor::<Backend, 5>::random([1, 2, 4, 4, 6], Distribution::Uniform(0.0, 1.0), &device);
        let reference = Tensor::<Backend, 5>::random([1, 2, 4, 4, 3], Distribution::Uniform(0.0, 1.0), &device);

        let pair = ErrorPair::split(decoded);
        let expected = reference.clone() + pair.pos.clone() - pair.neg.clone();
        let diff = (pair.apply(reference) - expected).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    #[should_panic(expected = "6 channels")]
    fn test_split_rejects_frame_channels() {
        let device = Default::default();
        ErrorPair::split(Tensor::<Backend, 5>::zeros([1, 1, 2, 2, 3], &device));
    }
}
