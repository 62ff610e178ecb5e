//! Image encoder producing a per-frame embedding and its skip connections

use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::activation::Activation;
use crate::error::{AdrError, AdrResult};
use crate::nets::{BaseLayer, BaseLayerConfig, FrameEncoder, SkipBundle};

/// Configuration for an [`ImageEncoder`].
#[derive(Config, Debug)]
pub struct ImageEncoderConfig {
    /// `[height, width]` of the frames.
    pub image_size: [usize; 2],
    /// Channels per frame (3 for RGB, 6 for stacked pairs).
    pub in_channels: usize,
    /// Embedding size per frame.
    pub h_dim: usize,
    /// Filters per level; each level halves the resolution.
    #[config(default = "vec![32, 64]")]
    pub filters: Vec<usize>,
    #[config(default = 5)]
    pub kernel_size: usize,
    /// Add a ConvLSTM pass at every level.
    #[config(default = false)]
    pub recurrent: bool,
    #[config(default = "Activation::Identity")]
    pub output_activation: Activation,
}

impl ImageEncoderConfig {
    /// Spatial size of the deepest feature map.
    pub fn bottleneck_size(&self) -> [usize; 2] {
        let scale = 1 << self.filters.len();
        [self.image_size[0] / scale, self.image_size[1] / scale]
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AdrResult<ImageEncoder<B>> {
        if self.filters.is_empty() {
            return Err(AdrError::config("encoder needs at least one level"));
        }
        let scale = 1 << self.filters.len();
        if self.image_size[0] % scale != 0 || self.image_size[1] % scale != 0 {
            return Err(AdrError::config(format!(
                "image size {:?} is not divisible by 2^{}",
                self.image_size,
                self.filters.len()
            )));
        }

        let mut layers = Vec::with_capacity(self.filters.len());
        let mut in_channels = self.in_channels;
        for &filters in &self.filters {
            layers.push(
                BaseLayerConfig::new(in_channels, filters)
                    .with_kernel_size(self.kernel_size)
                    .with_recurrent(self.recurrent)
                    .init(device)?,
            );
            in_channels = filters;
        }

        let [bh, bw] = self.bottleneck_size();
        let flat = bh * bw * in_channels;

        Ok(ImageEncoder {
            layers,
            embed: LinearConfig::new(flat, self.h_dim).init(device),
            in_channels: self.in_channels,
            h_dim: self.h_dim,
            output_activation: Ignored(self.output_activation),
        })
    }
}

/// Stack of [`BaseLayer`]s with a linear embedding head.
///
/// The output of every level is kept as a skip connection, shallowest first.
#[derive(Module, Debug)]
pub struct ImageEncoder<B: Backend> {
    layers: Vec<BaseLayer<B>>,
    embed: Linear<B>,
    #[module(skip)]
    in_channels: usize,
    #[module(skip)]
    h_dim: usize,
    output_activation: Ignored<Activation>,
}

impl<B: Backend> ImageEncoder<B> {
    pub fn h_dim(&self) -> usize {
        self.h_dim
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn num_levels(&self) -> usize {
        self.layers.len()
    }

    /// `[b, t, h, w, c]` -> (`[b, t, h_dim]`, skips)
    pub fn forward(&self, frames: Tensor<B, 5>) -> (Tensor<B, 3>, SkipBundle<B>) {
        let [batch, steps, _, _, channels] = frames.dims();
        assert_eq!(
            channels, self.in_channels,
            "encoder expects {} channels, got {}",
            self.in_channels, channels
        );

        let mut x = frames;
        let mut skips = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            x = layer.forward(x);
            skips.push(x.clone());
        }

        let [_, _, h, w, c] = x.dims();
        let flat = x.reshape([batch, steps, h * w * c]);
        let embedding = self.output_activation.0.apply(self.embed.forward(flat));

        (embedding, SkipBundle::new(skips))
    }
}

impl<B: Backend> FrameEncoder<B> for ImageEncoder<B> {
    fn encode(&self, frames: Tensor<B, 5>) -> (Tensor<B, 3>, SkipBundle<B>) {
        self.forward(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_encoder_shapes() {
        let device = Default::default();
        let encoder = ImageEncoderConfig::new([8, 8], 3, 10)
            .with_filters(vec![4, 6])
            .init::<Backend>(&device)
            .unwrap();

        let frames = Tensor::<Backend, 5>::zeros([2, 5, 8, 8, 3], &device);
        let (h, skips) = encoder.forward(frames);

        assert_eq!(h.dims(), [2, 5, 10]);
        assert_eq!(skips.num_levels(), 2);
        assert_eq!(skips.levels()[0].dims(), [2, 5, 4, 4, 4]);
        assert_eq!(skips.levels()[1].dims(), [2, 5, 2, 2, 6]);
    }

    #[test]
    fn test_recurrent_encoder_shapes() {
        let device = Default::default();
        let encoder = ImageEncoderConfig::new([8, 8], 6, 4)
            .with_filters(vec![2])
            .with_kernel_size(3)
            .with_recurrent(true)
            .init::<Backend>(&device)
            .unwrap();

        let frames = Tensor::<Backend, 5>::zeros([1, 3, 8, 8, 6], &device);
        let (h, skips) = encoder.forward(frames);

        assert_eq!(h.dims(), [1, 3, 4]);
        assert_eq!(skips.levels()[0].dims(), [1, 3, 4, 4, 2]);
    }

    #[test]
    fn test_rejects_indivisible_size() {
        let device = Default::default();
        let result = ImageEncoderConfig::new([10, 8], 3, 4)
            .with_filters(vec![4, 4])
            .init::<Backend>(&device);
        assert!(result.is_err());
    }
}
