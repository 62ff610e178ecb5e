//! Activation functions selectable from configuration
//!
//! Layers store an [`Activation`] instead of a closure so that the choice
//! survives serialisation of the surrounding config.

use burn::tensor::activation;
use burn::tensor::{backend::Backend, Tensor};

/// Element-wise activation applied by layers and decoder heads.
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use adr::activation::Activation;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let x = Tensor::<Backend, 1>::from_floats([-1.0, 0.0, 2.0], &device);
/// let y = Activation::Relu.apply(x);
/// assert_eq!(y.into_data().to_vec::<f32>().unwrap(), vec![0.0, 0.0, 2.0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Activation {
    /// `max(x, 0)`
    #[default]
    Relu,
    /// Logistic sigmoid, for frames normalised to `[0, 1]`
    Sigmoid,
    /// Hyperbolic tangent, for frames normalised to `[-1, 1]`
    Tanh,
    /// Pass-through
    Identity,
}

impl Activation {
    /// Applies the activation to a tensor of any rank.
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Relu => activation::relu(x),
            Activation::Sigmoid => activation::sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Identity => x,
        }
    }
}
