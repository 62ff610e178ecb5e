//! # Sub-networks
//!
//! The prediction graphs in [`crate::graph`] only talk to their
//! sub-networks through the traits defined here, so any Burn module with a
//! matching call signature can be plugged in. Reference implementations are
//! provided for every role:
//!
//! | Role | Trait | Implementation |
//! |------|-------|----------------|
//! | context encoder `Ec`, "other" encoder `Eo` | [`FrameEncoder`] | [`ImageEncoder`] |
//! | action-only decoder `Da`, error decoder `Do` | [`FrameDecoder`] | [`ImageDecoder`] |
//! | action network `A` / `rA` | [`ActionEncoder`] | [`ActionNet`] |
//! | Gaussian prior `La` | [`GaussianRecurrence`] | [`LstmGaussian`] |
//! | "other" predictor `L` | [`Recurrence`] | [`Lstm`] |
//!
//! Frames and skip levels are channels-last, `[batch, time, height, width, channels]`.

pub mod action;
pub mod base_layer;
pub mod decoder;
pub mod encoder;
pub mod registry;
pub mod skips;

pub use action::{ActionNet, ActionNetConfig};
pub use base_layer::{BaseLayer, BaseLayerConfig};
pub use decoder::{ImageDecoder, ImageDecoderConfig};
pub use encoder::{ImageEncoder, ImageEncoderConfig};
pub use registry::{freeze, unfreeze, Checkpoint, SubModel, SubModelKind, SubModelSpec};
pub use skips::SkipBundle;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::rnn::{GaussianOutput, Lstm, LstmGaussian, LstmState};

/// `frames[b, t, h, w, c] -> (embedding[b, t, d], skips)`
pub trait FrameEncoder<B: Backend> {
    fn encode(&self, frames: Tensor<B, 5>) -> (Tensor<B, 3>, SkipBundle<B>);
}

/// `(latent[b, t, d], skips) -> frame_or_error_pair[b, t, h, w, c_out]`
pub trait FrameDecoder<B: Backend> {
    fn decode(&self, latent: Tensor<B, 3>, skips: &SkipBundle<B>) -> Tensor<B, 5>;
}

/// `action_state[b, t, f] -> embedding[b, t, a]`
pub trait ActionEncoder<B: Backend> {
    fn encode(&self, action_state: Tensor<B, 3>) -> Tensor<B, 3>;
}

/// `(input[b, t, d], initial_state) -> (sample, mean, logvar, final_state)`
pub trait GaussianRecurrence<B: Backend> {
    fn sample(&self, input: Tensor<B, 3>, state: LstmState<B>) -> GaussianOutput<B>;
}

/// `(input[b, t, d], state) -> (output[b, t, o], state)`
///
/// Calling this once per step while threading the state must match a
/// single call over the whole sequence.
pub trait Recurrence<B: Backend> {
    fn step_sequence(&self, input: Tensor<B, 3>, state: LstmState<B>) -> (Tensor<B, 3>, LstmState<B>);
}

impl<B: Backend> GaussianRecurrence<B> for LstmGaussian<B> {
    fn sample(&self, input: Tensor<B, 3>, state: LstmState<B>) -> GaussianOutput<B> {
        self.forward(input, Some(state))
    }
}

impl<B: Backend> Recurrence<B> for Lstm<B> {
    fn step_sequence(&self, input: Tensor<B, 3>, state: LstmState<B>) -> (Tensor<B, 3>, LstmState<B>) {
        self.forward(input, Some(state))
    }
}
