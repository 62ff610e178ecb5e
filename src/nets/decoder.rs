//! Image decoder consuming a latent sequence and encoder skip connections

use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::conv::{ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::activation::Activation;
use crate::error::{AdrError, AdrResult};
use crate::nets::base_layer::{fold_time, unfold_time};
use crate::nets::{FrameDecoder, SkipBundle};

/// Configuration for an [`ImageDecoder`].
#[derive(Config, Debug)]
pub struct ImageDecoderConfig {
    /// `[height, width]` of the produced frames.
    pub image_size: [usize; 2],
    /// Size of the latent fed at every step.
    pub latent_dim: usize,
    /// Output channels: 3 for a frame, 6 for a positive/negative error pair.
    pub out_channels: usize,
    /// Filters of the encoder whose skips are consumed, shallowest first.
    #[config(default = "vec![32, 64]")]
    pub skip_filters: Vec<usize>,
    #[config(default = 5)]
    pub kernel_size: usize,
    #[config(default = "Activation::Sigmoid")]
    pub output_activation: Activation,
}

impl ImageDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AdrResult<ImageDecoder<B>> {
        let levels = self.skip_filters.len();
        if levels == 0 {
            return Err(AdrError::config("decoder needs at least one skip level"));
        }
        let scale = 1 << levels;
        if self.image_size[0] % scale != 0 || self.image_size[1] % scale != 0 {
            return Err(AdrError::config(format!(
                "image size {:?} is not divisible by 2^{}",
                self.image_size, levels
            )));
        }
        if self.kernel_size % 2 == 0 {
            return Err(AdrError::config("decoder kernel_size must be odd"));
        }

        let bottleneck = [self.image_size[0] / scale, self.image_size[1] / scale];
        let deepest = self.skip_filters[levels - 1];
        let pad = self.kernel_size / 2;

        // deepest level first
        let mut ups = Vec::with_capacity(levels);
        let mut norms = Vec::with_capacity(levels - 1);
        for l in (0..levels).rev() {
            let out = if l == 0 {
                self.out_channels
            } else {
                self.skip_filters[l - 1]
            };
            ups.push(
                ConvTranspose2dConfig::new(
                    [2 * self.skip_filters[l], out],
                    [self.kernel_size, self.kernel_size],
                )
                .with_stride([2, 2])
                .with_padding([pad, pad])
                .with_padding_out([1, 1])
                .init(device),
            );
            if l > 0 {
                norms.push(BatchNormConfig::new(out).init(device));
            }
        }

        Ok(ImageDecoder {
            project: LinearConfig::new(self.latent_dim, bottleneck[0] * bottleneck[1] * deepest)
                .init(device),
            ups,
            norms,
            bottleneck,
            deepest,
            latent_dim: self.latent_dim,
            out_channels: self.out_channels,
            output_activation: Ignored(self.output_activation),
        })
    }
}

/// Projects a latent to the bottleneck, then upsamples through every skip
/// level back to full resolution.
#[derive(Module, Debug)]
pub struct ImageDecoder<B: Backend> {
    project: Linear<B>,
    ups: Vec<ConvTranspose2d<B>>,
    norms: Vec<BatchNorm<B, 2>>,
    #[module(skip)]
    bottleneck: [usize; 2],
    #[module(skip)]
    deepest: usize,
    #[module(skip)]
    latent_dim: usize,
    #[module(skip)]
    out_channels: usize,
    output_activation: Ignored<Activation>,
}

impl<B: Backend> ImageDecoder<B> {
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// (`[b, t, latent_dim]`, skips of length `t`) -> `[b, t, h, w, out_channels]`
    pub fn forward(&self, latent: Tensor<B, 3>, skips: &SkipBundle<B>) -> Tensor<B, 5> {
        let [batch, steps, _] = latent.dims();
        assert_eq!(
            skips.seq_len(),
            steps,
            "skip bundle covers {} steps, latent has {}",
            skips.seq_len(),
            steps
        );
        assert_eq!(skips.num_levels(), self.ups.len(), "skip depth mismatch");

        let [bh, bw] = self.bottleneck;
        let x = self
            .project
            .forward(latent)
            .reshape([batch, steps, bh, bw, self.deepest]);
        let mut x = fold_time(x);

        let levels = self.ups.len();
        for (i, up) in self.ups.iter().enumerate() {
            let skip = fold_time(skips.levels()[levels - 1 - i].clone());
            x = up.forward(Tensor::cat(vec![x, skip], 1));
            x = match self.norms.get(i) {
                Some(norm) => activation::relu(norm.forward(x)),
                None => self.output_activation.0.apply(x),
            };
        }

        unfold_time(x, batch, steps)
    }
}

impl<B: Backend> FrameDecoder<B> for ImageDecoder<B> {
    fn decode(&self, latent: Tensor<B, 3>, skips: &SkipBundle<B>) -> Tensor<B, 5> {
        self.forward(latent, skips)
    }
}
