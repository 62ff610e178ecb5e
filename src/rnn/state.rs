//! Recurrent state threaded through stacked LSTMs

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Hidden and cell state of a stacked LSTM.
///
/// Both tensors are shaped `[n_layers, batch, units]`. A state is created
/// zeroed once per forward pass, threaded from step to step and dropped at
/// the end of the pass.
#[derive(Debug, Clone)]
pub struct LstmState<B: Backend> {
    pub hidden: Tensor<B, 3>,
    pub cell: Tensor<B, 3>,
}

impl<B: Backend> LstmState<B> {
    /// Zero state for `n_layers` layers of `units` units.
    pub fn zeros(n_layers: usize, batch_size: usize, units: usize, device: &B::Device) -> Self {
        Self {
            hidden: Tensor::zeros([n_layers, batch_size, units], device),
            cell: Tensor::zeros([n_layers, batch_size, units], device),
        }
    }

    /// Reassembles a state from per-layer `(hidden, cell)` pairs.
    pub fn from_layers(layers: Vec<(Tensor<B, 2>, Tensor<B, 2>)>) -> Self {
        let (hidden, cell): (Vec<_>, Vec<_>) = layers.into_iter().unzip();
        Self {
            hidden: Tensor::stack(hidden, 0),
            cell: Tensor::stack(cell, 0),
        }
    }

    pub fn num_layers(&self) -> usize {
        self.hidden.dims()[0]
    }

    pub fn batch_size(&self) -> usize {
        self.hidden.dims()[1]
    }

    pub fn units(&self) -> usize {
        self.hidden.dims()[2]
    }

    /// `(hidden, cell)` of one layer, each `[batch, units]`.
    pub fn layer(&self, index: usize) -> (Tensor<B, 2>, Tensor<B, 2>) {
        (
            self.hidden.clone().narrow(0, index, 1).squeeze(0),
            self.cell.clone().narrow(0, index, 1).squeeze(0),
        )
    }

    /// Splits into per-layer pairs.
    pub fn into_layers(self) -> Vec<(Tensor<B, 2>, Tensor<B, 2>)> {
        (0..self.num_layers()).map(|l| self.layer(l)).collect()
    }
}
