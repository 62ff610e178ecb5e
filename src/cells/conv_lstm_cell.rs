//! Convolutional LSTM cell
//!
//! Same gating as [`LSTMCell`](super::LSTMCell) but the input and recurrent
//! maps are 2D convolutions, so the state keeps its spatial layout.

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::activation::Activation;

/// Single-timestep ConvLSTM cell operating on `[batch, channels, height, width]`.
#[derive(Module, Debug)]
pub struct ConvLSTMCell<B: Backend> {
    #[module(skip)]
    input_channels: usize,
    #[module(skip)]
    filters: usize,
    activation: Ignored<Activation>,
    input_map: Conv2d<B>,
    recurrent_map: Conv2d<B>,
}

impl<B: Backend> ConvLSTMCell<B> {
    /// Create a new ConvLSTM cell with "same" padding and unit stride.
    pub fn new(input_channels: usize, filters: usize, kernel_size: usize, device: &B::Device) -> Self {
        let pad = kernel_size / 2;
        let input_map = Conv2dConfig::new([input_channels, 4 * filters], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_bias(true)
            .init(device);
        let recurrent_map = Conv2dConfig::new([filters, 4 * filters], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_bias(false)
            .init(device);

        Self {
            input_channels,
            filters,
            activation: Ignored(Activation::Tanh),
            input_map,
            recurrent_map,
        }
    }

    /// Activation for the candidate and the output (default tanh).
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Ignored(activation);
        self
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    /// One step. `states` is `(hidden, cell)`, each `[batch, filters, height, width]`.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        states: (Tensor<B, 4>, Tensor<B, 4>),
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let (hidden_state, cell_state) = states;

        let z = self.input_map.forward(input) + self.recurrent_map.forward(hidden_state);

        let chunks = z.chunk(4, 1);
        let input_gate = activation::sigmoid(chunks[0].clone());
        let forget_gate = activation::sigmoid(chunks[1].clone() + 1.0);
        let candidate = self.activation.0.apply(chunks[2].clone());
        let output_gate = activation::sigmoid(chunks[3].clone());

        let new_cell = cell_state * forget_gate + candidate * input_gate;
        let new_hidden = self.activation.0.apply(new_cell.clone()) * output_gate;

        (new_hidden, new_cell)
    }

    /// Runs the cell over `[batch, time, channels, height, width]` from a zero
    /// state and returns every step's hidden output.
    pub fn forward_sequence(&self, input: Tensor<B, 5>) -> Tensor<B, 5> {
        let [batch, steps, _, height, width] = input.dims();
        let device = input.device();

        let mut h = Tensor::<B, 4>::zeros([batch, self.filters, height, width], &device);
        let mut c = h.clone();
        let mut outputs = Vec::with_capacity(steps);

        for t in 0..steps {
            let x_t: Tensor<B, 4> = input.clone().narrow(1, t, 1).squeeze(1);
            (h, c) = self.forward(x_t, (h, c));
            outputs.push(h.clone());
        }

        Tensor::stack(outputs, 1)
    }
}
