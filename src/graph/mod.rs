//! # Graph Assembly
//!
//! Composes the sub-networks of [`crate::nets`] into the five prediction
//! graphs. Every assembly function is generic over the collaborator traits
//! and runs eagerly on the Burn backend, so the per-timestep loops are
//! unrolled on every forward pass and autodiff records one fixed-length
//! sequence of operations.
//!
//! | Function | Predicts | Recurrence |
//! |----------|----------|------------|
//! | [`adr_ao`] | the window (or one random frame) from context + actions | none |
//! | [`adr`] | action-only frame plus a residual error pair | none |
//! | [`adr_vp_teacher_forcing`] | frame `t+1` from ground truth up to `t` | teacher forced |
//! | [`adr_vp_feedback`] | frame `t+1`, own "other" embedding after the context | feedback |
//! | [`adr_vp_feedback_frames`] | frame `t+1`, own predicted frame after the context | feedback |
//!
//! Every function returns a [`GraphOutput`]: named output tensors, the
//! registered monitoring metrics and the scalar objective.

pub mod ao;
pub mod context;
pub mod feedback;
pub mod inputs;
pub mod loss;
pub mod residual;
pub mod synthesis;
pub mod teacher_forcing;

pub use ao::adr_ao;
pub use context::{encode_actions, encode_context, ActionLatent, Context, LatentChoice};
pub use feedback::{adr_vp_feedback, adr_vp_feedback_frames};
pub use inputs::{assemble_inputs, draw_window_start, GraphInputs, InputSpec, StateShape};
pub use loss::{kl_unit_normal, mse, Metrics};
pub use residual::adr;
pub use synthesis::ErrorPair;
pub use teacher_forcing::adr_vp_teacher_forcing;

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};

use crate::config::ObjectiveWeights;

/// Raw sample batch fed to a graph.
#[derive(Debug, Clone)]
pub struct VideoBatch<B: Backend> {
    /// `[batch, seq_len, height, width, channels]`
    pub frames: Tensor<B, 5>,
    /// `[batch, seq_len, action_dim]`
    pub actions: Option<Tensor<B, 3>>,
    /// `[batch, seq_len, state_dim]`
    pub states: Option<Tensor<B, 3>>,
}

impl<B: Backend> VideoBatch<B> {
    pub fn new(frames: Tensor<B, 5>) -> Self {
        Self {
            frames,
            actions: None,
            states: None,
        }
    }

    pub fn with_actions(mut self, actions: Tensor<B, 3>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn with_states(mut self, states: Tensor<B, 3>) -> Self {
        self.states = Some(states);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.frames.dims()[0]
    }

    pub fn seq_len(&self) -> usize {
        self.frames.dims()[1]
    }

    /// Actions and states concatenated on the feature axis, actions first.
    pub fn action_state(&self) -> Option<Tensor<B, 3>> {
        match (&self.actions, &self.states) {
            (Some(a), Some(s)) => Some(Tensor::cat(vec![a.clone(), s.clone()], 2)),
            (Some(a), None) => Some(a.clone()),
            (None, Some(s)) => Some(s.clone()),
            (None, None) => None,
        }
    }
}

/// Named inputs a built graph expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputName {
    Images,
    Actions,
    States,
    /// Zero state of the Gaussian action prior
    InitialStateA,
    /// Zero state of the "other" predictor
    InitialState,
}

impl InputName {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputName::Images => "images",
            InputName::Actions => "actions",
            InputName::States => "states",
            InputName::InitialStateA => "initial_state_a",
            InputName::InitialState => "initial_state",
        }
    }
}

/// An output tensor of a graph.
#[derive(Debug, Clone)]
pub enum OutputTensor<B: Backend> {
    /// `[batch, time, height, width, channels]`
    Frames(Tensor<B, 5>),
    /// `[batch, time, features]`
    Sequence(Tensor<B, 3>),
}

impl<B: Backend> OutputTensor<B> {
    pub fn dims(&self) -> Vec<usize> {
        match self {
            OutputTensor::Frames(t) => t.dims().to_vec(),
            OutputTensor::Sequence(t) => t.dims().to_vec(),
        }
    }

    pub fn frames(&self) -> Option<&Tensor<B, 5>> {
        match self {
            OutputTensor::Frames(t) => Some(t),
            OutputTensor::Sequence(_) => None,
        }
    }

    pub fn sequence(&self) -> Option<&Tensor<B, 3>> {
        match self {
            OutputTensor::Sequence(t) => Some(t),
            OutputTensor::Frames(_) => None,
        }
    }
}

/// Result of one forward pass through a prediction graph.
#[derive(Debug, Clone)]
pub struct GraphOutput<B: Backend> {
    /// Output tensors in declaration order.
    pub outputs: Vec<(&'static str, OutputTensor<B>)>,
    pub metrics: Metrics<B>,
    /// Scalar training objective, shape `[1]`.
    pub loss: Tensor<B, 1>,
}

impl<B: Backend> GraphOutput<B> {
    pub fn output(&self, name: &str) -> Option<&OutputTensor<B>> {
        self.outputs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
    }

    pub fn frames(&self, name: &str) -> Option<&Tensor<B, 5>> {
        self.output(name).and_then(OutputTensor::frames)
    }

    pub fn output_names(&self) -> Vec<&'static str> {
        self.outputs.iter().map(|(n, _)| *n).collect()
    }

    pub fn loss_value(&self) -> f32 {
        self.loss.clone().into_scalar().elem::<f32>()
    }
}

/// Per-call knobs shared by the assembly functions.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub context_frames: usize,
    /// Decode one randomly chosen frame instead of the full window
    pub reconstruct_random_frame: bool,
    /// Sample the Gaussian latent; the mean is used otherwise
    pub training: bool,
    pub kl_weight: f64,
    pub objective: ObjectiveWeights,
}

/// Sub-networks shared by the residual and recurrent graphs.
///
/// `eo`/`do_` are the "other" encoder and error-pair decoder, `da` the
/// action-only decoder.
pub struct PredictionNets<'a, Ec, Eo, A, Da, Do, La> {
    pub ec: &'a Ec,
    pub eo: &'a Eo,
    pub a: &'a A,
    pub da: &'a Da,
    pub do_: &'a Do,
    pub la: Option<&'a La>,
}

/// Drops the last step of a batch-first sequence.
pub(crate) fn remove_last_step<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let steps = x.dims()[1];
    x.narrow(1, 0, steps - 1)
}

/// Drops the first step of a batch-first sequence.
pub(crate) fn remove_first_step<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let steps = x.dims()[1];
    x.narrow(1, 1, steps - 1)
}

pub(crate) fn last_step<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let steps = x.dims()[1];
    x.narrow(1, steps - 1, 1)
}

pub(crate) fn step<B: Backend, const D: usize>(x: &Tensor<B, D>, index: usize) -> Tensor<B, D> {
    x.clone().narrow(1, index, 1)
}

impl<Ec, Eo, A, Da, Do, La> Clone for PredictionNets<'_, Ec, Eo, A, Da, Do, La> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Ec, Eo, A, Da, Do, La> Copy for PredictionNets<'_, Ec, Eo, A, Da, Do, La> {}
