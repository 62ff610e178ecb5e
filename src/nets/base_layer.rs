//! Time-distributed convolution block shared by the image encoders
//!
//! A block is a strided 2D convolution applied independently to every
//! frame, optionally followed (or replaced) by a ConvLSTM pass over time,
//! then batch normalisation and an activation.

use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::activation::Activation;
use crate::cells::ConvLSTMCell;
use crate::error::{AdrError, AdrResult};

/// `[batch, time, height, width, channels]` -> `[batch * time, channels, height, width]`
pub fn fold_time<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 4> {
    let [batch, steps, height, width, channels] = x.dims();
    x.reshape([batch * steps, height, width, channels])
        .permute([0, 3, 1, 2])
}

/// Inverse of [`fold_time`].
pub fn unfold_time<B: Backend>(x: Tensor<B, 4>, batch: usize, steps: usize) -> Tensor<B, 5> {
    let [_, channels, height, width] = x.dims();
    x.permute([0, 2, 3, 1])
        .reshape([batch, steps, height, width, channels])
}

/// Configuration for a [`BaseLayer`].
#[derive(Config, Debug)]
pub struct BaseLayerConfig {
    /// Channels of the incoming feature map.
    pub in_channels: usize,
    /// Output channels.
    pub filters: usize,
    #[config(default = 5)]
    pub kernel_size: usize,
    /// Stride of the convolution; the ConvLSTM pass always uses stride 1.
    #[config(default = 2)]
    pub strides: usize,
    #[config(default = "Activation::Relu")]
    pub activation: Activation,
    #[config(default = true)]
    pub convolutional: bool,
    #[config(default = false)]
    pub recurrent: bool,
}

impl BaseLayerConfig {
    /// Builds the block. At least one of `convolutional` and `recurrent`
    /// must be set.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AdrResult<BaseLayer<B>> {
        if !self.convolutional && !self.recurrent {
            return Err(AdrError::config(
                "at least one of 'convolutional' and 'recurrent' must be true",
            ));
        }
        if self.kernel_size % 2 == 0 {
            return Err(AdrError::config(format!(
                "kernel_size must be odd for same padding, got {}",
                self.kernel_size
            )));
        }

        let pad = self.kernel_size / 2;
        let conv = self.convolutional.then(|| {
            Conv2dConfig::new(
                [self.in_channels, self.filters],
                [self.kernel_size, self.kernel_size],
            )
            .with_stride([self.strides, self.strides])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .init(device)
        });

        let lstm_in = if self.convolutional {
            self.filters
        } else {
            self.in_channels
        };
        let conv_lstm = self.recurrent.then(|| {
            ConvLSTMCell::new(lstm_in, self.filters, self.kernel_size, device)
                .with_activation(Activation::Identity)
        });

        Ok(BaseLayer {
            conv,
            conv_lstm,
            norm: BatchNormConfig::new(self.filters).init(device),
            activation: Ignored(self.activation),
            filters: self.filters,
        })
    }
}

/// Convolution (+ ConvLSTM) + batch norm + activation over a frame sequence.
#[derive(Module, Debug)]
pub struct BaseLayer<B: Backend> {
    conv: Option<Conv2d<B>>,
    conv_lstm: Option<ConvLSTMCell<B>>,
    norm: BatchNorm<B, 2>,
    activation: Ignored<Activation>,
    #[module(skip)]
    filters: usize,
}

impl<B: Backend> BaseLayer<B> {
    pub fn filters(&self) -> usize {
        self.filters
    }

    /// `[batch, time, h, w, c]` -> `[batch, time, h', w', filters]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let [batch, steps, _, _, _] = x.dims();

        let mut y = fold_time(x);
        if let Some(ref conv) = self.conv {
            y = conv.forward(y);
        }
        if let Some(ref cell) = self.conv_lstm {
            // ConvLSTM wants [batch, time, c, h, w]
            let [_, c, h, w] = y.dims();
            let seq = cell.forward_sequence(y.reshape([batch, steps, c, h, w]));
            y = seq.reshape([batch * steps, self.filters, h, w]);
        }

        let y = self.activation.0.apply(self.norm.forward(y));
        unfold_time(y, batch, steps)
    }
}
