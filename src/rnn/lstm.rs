//! Stacked LSTM layer
//!
//! Full sequence layer over [`LSTMCell`]s: steps through time, threads an
//! explicit [`LstmState`] and optionally projects every output.

use crate::cells::LSTMCell;
use crate::rnn::LstmState;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Configuration for an [`Lstm`] with an optional output projection.
#[derive(Config, Debug)]
pub struct LstmConfig {
    pub input_size: usize,
    #[config(default = 256)]
    pub units: usize,
    #[config(default = 2)]
    pub num_layers: usize,
    pub proj_size: Option<usize>,
}

impl LstmConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Lstm<B> {
        let lstm = Lstm::new(self.input_size, self.units, self.num_layers, device);
        match self.proj_size {
            Some(size) => lstm.with_proj_size(size, device),
            None => lstm,
        }
    }
}

/// Stacked LSTM RNN layer
///
/// Input is batch-first `[batch, seq, features]`; every layer returns full
/// sequences so the output is `[batch, seq, output_size]`.
///
/// # Type Parameters
/// * `B` - The backend type
#[derive(Module, Debug)]
pub struct Lstm<B: Backend> {
    /// One cell per layer, bottom first
    cells: Vec<LSTMCell<B>>,
    /// Optional projection applied to the top layer's output
    proj: Option<Linear<B>>,
    #[module(skip)]
    input_size: usize,
    #[module(skip)]
    units: usize,
    #[module(skip)]
    output_size: usize,
}

impl<B: Backend> Lstm<B> {
    /// Create a stacked LSTM
    ///
    /// # Arguments
    /// * `input_size` - Number of input features
    /// * `units` - Hidden units per layer
    /// * `num_layers` - Number of stacked layers (at least one)
    /// * `device` - Device to create the module on
    pub fn new(input_size: usize, units: usize, num_layers: usize, device: &B::Device) -> Self {
        assert!(num_layers > 0, "Lstm needs at least one layer");
        let cells = (0..num_layers)
            .map(|l| {
                let in_size = if l == 0 { input_size } else { units };
                LSTMCell::new(in_size, units, device)
            })
            .collect();

        Self {
            cells,
            proj: None,
            input_size,
            units,
            output_size: units,
        }
    }

    /// Project each output step to `proj_size` features.
    pub fn with_proj_size(mut self, proj_size: usize, device: &B::Device) -> Self {
        self.proj = Some(
            LinearConfig::new(self.units, proj_size)
                .with_bias(true)
                .init(device),
        );
        self.output_size = proj_size;
        self
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn num_layers(&self) -> usize {
        self.cells.len()
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Zero state matching this layer.
    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> LstmState<B> {
        LstmState::zeros(self.num_layers(), batch_size, self.units, device)
    }

    /// Raw top-layer hidden outputs `[batch, seq, units]` and the final state.
    pub fn forward_hidden(
        &self,
        input: Tensor<B, 3>,
        state: Option<LstmState<B>>,
    ) -> (Tensor<B, 3>, LstmState<B>) {
        let device = input.device();
        let [batch_size, seq_len, _] = input.dims();

        let state = state.unwrap_or_else(|| self.zero_state(batch_size, &device));
        assert_eq!(
            state.num_layers(),
            self.num_layers(),
            "state has {} layers, Lstm has {}",
            state.num_layers(),
            self.num_layers()
        );
        let mut layers = state.into_layers();

        let mut outputs: Vec<Tensor<B, 2>> = Vec::with_capacity(seq_len);

        for t in 0..seq_len {
            // input[batch, t, features] -> [batch, features]
            let mut x: Tensor<B, 2> = input.clone().narrow(1, t, 1).squeeze(1);

            for (cell, layer_state) in self.cells.iter().zip(layers.iter_mut()) {
                let (h, c) = cell.forward(x, layer_state.clone());
                x = h.clone();
                *layer_state = (h, c);
            }

            outputs.push(x);
        }

        let output = Tensor::stack(outputs, 1); // [batch, seq, units]
        (output, LstmState::from_layers(layers))
    }

    /// Forward pass through every layer and the optional projection.
    ///
    /// # Returns
    /// Tuple of (output `[batch, seq, output_size]`, final state)
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        state: Option<LstmState<B>>,
    ) -> (Tensor<B, 3>, LstmState<B>) {
        let (hidden, state) = self.forward_hidden(input, state);
        let output = match self.proj {
            Some(ref proj) => proj.forward(hidden),
            None => hidden,
        };
        (output, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_lstm_creation() {
        let device = Default::default();
        let lstm = Lstm::<TestBackend>::new(20, 32, 2, &device);

        assert_eq!(lstm.input_size(), 20);
        assert_eq!(lstm.units(), 32);
        assert_eq!(lstm.num_layers(), 2);
        assert_eq!(lstm.output_size(), 32);
    }

    #[test]
    fn test_lstm_forward_shapes() {
        let device = Default::default();
        let lstm = Lstm::<TestBackend>::new(20, 32, 2, &device);

        let input = Tensor::<TestBackend, 3>::zeros([4, 10, 20], &device);
        let (output, state) = lstm.forward(input, None);

        assert_eq!(output.dims(), [4, 10, 32]);
        assert_eq!(state.hidden.dims(), [2, 4, 32]);
        assert_eq!(state.cell.dims(), [2, 4, 32]);
    }

    #[test]
    fn test_lstm_with_projection() {
        let device = Default::default();
        let lstm = Lstm::<TestBackend>::new(20, 32, 1, &device).with_proj_size(7, &device);

        let input = Tensor::<TestBackend, 3>::zeros([2, 5, 20], &device);
        let (output, _) = lstm.forward(input, None);

        assert_eq!(output.dims(), [2, 5, 7]);
        assert_eq!(lstm.output_size(), 7);
    }

    #[test]
    fn test_stepwise_matches_sequence() {
        let device = Default::default();
        let lstm = Lstm::<TestBackend>::new(6, 8, 2, &device).with_proj_size(3, &device);

        let input = Tensor::<TestBackend, 3>::random(
            [2, 4, 6],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let (full, _) = lstm.forward(input.clone(), None);

        let mut state = lstm.zero_state(2, &device);
        let mut steps = Vec::new();
        for t in 0..4 {
            let (out, next) = lstm.forward(input.clone().narrow(1, t, 1), Some(state));
            steps.push(out);
            state = next;
        }
        let stepped = Tensor::cat(steps, 1);

        let diff = (full - stepped).abs().max().into_scalar();
        assert!(diff < 1e-5, "stepwise rollout diverged by {}", diff);
    }
}
