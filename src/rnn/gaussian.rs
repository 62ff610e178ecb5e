//! Gaussian recurrent prior
//!
//! A stacked LSTM whose top outputs parameterise a diagonal Gaussian per
//! timestep. During training the latent is drawn with the
//! reparameterisation trick; callers that need a deterministic latent use
//! the mean.

use crate::rnn::{Lstm, LstmState};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

/// Per-step latent sample with its distribution parameters.
#[derive(Debug, Clone)]
pub struct GaussianOutput<B: Backend> {
    /// Sample `mu + exp(logvar / 2) * eps`, `[batch, seq, z]`
    pub z: Tensor<B, 3>,
    /// Mean, `[batch, seq, z]`
    pub mu: Tensor<B, 3>,
    /// Log-variance, `[batch, seq, z]`
    pub logvar: Tensor<B, 3>,
    /// Final recurrent state
    pub state: LstmState<B>,
}

/// Configuration for an [`LstmGaussian`].
#[derive(Config, Debug)]
pub struct LstmGaussianConfig {
    pub input_size: usize,
    pub latent_size: usize,
    #[config(default = 256)]
    pub units: usize,
    #[config(default = 1)]
    pub num_layers: usize,
}

impl LstmGaussianConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LstmGaussian<B> {
        LstmGaussian::new(
            self.input_size,
            self.units,
            self.num_layers,
            self.latent_size,
            device,
        )
    }
}

/// LSTM with Gaussian output heads.
#[derive(Module, Debug)]
pub struct LstmGaussian<B: Backend> {
    lstm: Lstm<B>,
    mu: Linear<B>,
    logvar: Linear<B>,
    #[module(skip)]
    latent_size: usize,
}

impl<B: Backend> LstmGaussian<B> {
    /// # Arguments
    /// * `input_size` - Features per step
    /// * `units` - LSTM units per layer
    /// * `num_layers` - Number of stacked LSTM layers
    /// * `latent_size` - Dimension of the sampled latent
    pub fn new(
        input_size: usize,
        units: usize,
        num_layers: usize,
        latent_size: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            lstm: Lstm::new(input_size, units, num_layers, device),
            mu: LinearConfig::new(units, latent_size).init(device),
            logvar: LinearConfig::new(units, latent_size).init(device),
            latent_size,
        }
    }

    pub fn latent_size(&self) -> usize {
        self.latent_size
    }

    pub fn units(&self) -> usize {
        self.lstm.units()
    }

    pub fn num_layers(&self) -> usize {
        self.lstm.num_layers()
    }

    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> LstmState<B> {
        self.lstm.zero_state(batch_size, device)
    }

    /// Runs the prior over `[batch, seq, input_size]`.
    pub fn forward(&self, input: Tensor<B, 3>, state: Option<LstmState<B>>) -> GaussianOutput<B> {
        let (hidden, state) = self.lstm.forward(input, state);

        let mu = self.mu.forward(hidden.clone());
        let logvar = self.logvar.forward(hidden);

        let eps = Tensor::random(mu.dims(), Distribution::Normal(0.0, 1.0), &mu.device());
        let z = mu.clone() + (logvar.clone() * 0.5).exp() * eps;

        GaussianOutput {
            z,
            mu,
            logvar,
            state,
        }
    }
}
