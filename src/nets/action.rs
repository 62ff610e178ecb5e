//! Action/state network

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{AdrError, AdrResult};
use crate::nets::ActionEncoder;
use crate::rnn::Lstm;

/// Configuration for an [`ActionNet`].
#[derive(Config, Debug)]
pub struct ActionNetConfig {
    /// Features per step of the concatenated action/state stream.
    pub input_size: usize,
    /// Embedding size per step.
    pub h_dim: usize,
    /// Hidden layer widths of the per-step MLP.
    #[config(default = "vec![32]")]
    pub hidden: Vec<usize>,
    /// Layers of the trailing LSTM; 0 for the plain (non-recurrent) network.
    #[config(default = 0)]
    pub recurrent_layers: usize,
}

impl ActionNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AdrResult<ActionNet<B>> {
        if self.input_size == 0 {
            return Err(AdrError::MissingActionState);
        }

        let mut dense = Vec::with_capacity(self.hidden.len() + 1);
        let mut width = self.input_size;
        for &units in &self.hidden {
            dense.push(LinearConfig::new(width, units).init(device));
            width = units;
        }

        let (out, lstm) = if self.recurrent_layers > 0 {
            (
                None,
                Some(Lstm::new(width, self.h_dim, self.recurrent_layers, device)),
            )
        } else {
            (Some(LinearConfig::new(width, self.h_dim).init(device)), None)
        };

        Ok(ActionNet {
            dense,
            out,
            lstm,
            input_size: self.input_size,
            h_dim: self.h_dim,
        })
    }
}

/// Per-step MLP over the action/state stream, optionally followed by an LSTM.
#[derive(Module, Debug)]
pub struct ActionNet<B: Backend> {
    dense: Vec<Linear<B>>,
    out: Option<Linear<B>>,
    lstm: Option<Lstm<B>>,
    #[module(skip)]
    input_size: usize,
    #[module(skip)]
    h_dim: usize,
}

impl<B: Backend> ActionNet<B> {
    pub fn h_dim(&self) -> usize {
        self.h_dim
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn is_recurrent(&self) -> bool {
        self.lstm.is_some()
    }

    /// `[b, t, input_size]` -> `[b, t, h_dim]`
    pub fn forward(&self, action_state: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = action_state;
        for layer in &self.dense {
            x = activation::relu(layer.forward(x));
        }
        match (&self.out, &self.lstm) {
            (Some(out), _) => out.forward(x),
            (None, Some(lstm)) => lstm.forward(x, None).0,
            (None, None) => x,
        }
    }
}

impl<B: Backend> ActionEncoder<B> for ActionNet<B> {
    fn encode(&self, action_state: Tensor<B, 3>) -> Tensor<B, 3> {
        self.forward(action_state)
    }
}
