//! Context and action/state encoding

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::nets::{ActionEncoder, FrameEncoder, GaussianRecurrence, SkipBundle};
use crate::rnn::{GaussianOutput, LstmState};

/// Summary of the context window taken at its last step.
#[derive(Debug, Clone)]
pub struct Context<B: Backend> {
    /// `[batch, 1, h_dim]`
    pub hc: Tensor<B, 3>,
    /// Single-step skip bundle
    pub skips: SkipBundle<B>,
}

impl<B: Backend> Context<B> {
    /// `hc` broadcast to `n` steps.
    pub fn hc_repeat(&self, n: usize) -> Tensor<B, 3> {
        self.hc.clone().repeat_dim(1, n)
    }

    /// Skip bundle broadcast to `n` steps.
    pub fn skips_repeat(&self, n: usize) -> SkipBundle<B> {
        self.skips.repeat(n)
    }
}

/// Encodes `context_frames` frames starting at `start` and keeps the last
/// step's embedding and skips.
pub fn encode_context<B, E>(ec: &E, frames: &Tensor<B, 5>, start: usize, context_frames: usize) -> Context<B>
where
    B: Backend,
    E: FrameEncoder<B>,
{
    assert!(context_frames > 0, "context needs at least one frame");
    let xc = frames.clone().narrow(1, start, context_frames);
    let (hc, skips) = ec.encode(xc);

    Context {
        hc: hc.narrow(1, context_frames - 1, 1),
        skips: skips.slice(context_frames - 1, 1),
    }
}

/// How the Gaussian prior's latent enters the decoder input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatentChoice {
    /// Reparameterised sample
    Sample,
    /// Distribution mean
    Mean,
}

/// Action embedding and the decoder input built from it.
#[derive(Debug, Clone)]
pub struct ActionLatent<B: Backend> {
    /// `[batch, t, a]`
    pub ha: Tensor<B, 3>,
    /// `[hc_repeat, ha]`, extended with the prior latent when enabled
    pub decoder_input: Tensor<B, 3>,
    pub prior: Option<GaussianOutput<B>>,
}

/// Runs the action network and, when present, the Gaussian prior over
/// `[hc_repeat, ha]`.
///
/// # Panics
/// If a prior is given without its initial state.
pub fn encode_actions<B, A, L>(
    a: &A,
    la: Option<&L>,
    action_state: Tensor<B, 3>,
    hc_repeat: Tensor<B, 3>,
    initial_state_a: Option<LstmState<B>>,
    choice: LatentChoice,
) -> ActionLatent<B>
where
    B: Backend,
    A: ActionEncoder<B>,
    L: GaussianRecurrence<B>,
{
    let ha = a.encode(action_state);
    assert_eq!(
        ha.dims()[1],
        hc_repeat.dims()[1],
        "context embedding must cover every action step"
    );
    let hc_ha = Tensor::cat(vec![hc_repeat.clone(), ha.clone()], 2);

    let Some(la) = la else {
        return ActionLatent {
            ha,
            decoder_input: hc_ha,
            prior: None,
        };
    };

    let state = match initial_state_a {
        Some(state) => state,
        None => panic!("Gaussian prior needs an initial state"),
    };
    let prior = la.sample(hc_ha, state);
    let z = match choice {
        LatentChoice::Sample => prior.z.clone(),
        LatentChoice::Mean => prior.mu.clone(),
    };

    ActionLatent {
        decoder_input: Tensor::cat(vec![hc_repeat, ha.clone(), z], 2),
        ha,
        prior: Some(prior),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nets::{ActionNetConfig, ImageEncoderConfig};
    use crate::rnn::LstmGaussian;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type Backend = NdArray<f32>;

    #[test]
    fn test_context_keeps_last_step() {
        let device = Default::default();
        let ec = ImageEncoderConfig::new([8, 8], 3, 10)
            .with_filters(vec![4, 4])
            .init::<Backend>(&device)
            .unwrap();
        let frames = Tensor::<Backend, 5>::random([2, 6, 8, 8, 3], Distribution::Uniform(0.0, 1.0), &device);

        let ctx = encode_context(&ec, &frames, 0, 3);
        assert_eq!(ctx.hc.dims(), [2, 1, 10]);
        assert_eq!(ctx.skips.seq_len(), 1);

        let (full, _) = ec.forward(frames.narrow(1, 0, 3));
        let diff = (full.narrow(1, 2, 1) - ctx.hc.clone()).abs().max().into_scalar();
        assert!(diff < 1e-6);

        assert_eq!(ctx.hc_repeat(5).dims(), [2, 5, 10]);
        assert_eq!(ctx.skips_repeat(5).seq_len(), 5);
    }

    #[test]
    fn test_actions_without_prior() {
        let device = Default::default();
        let a = ActionNetConfig::new(4, 6).init::<Backend>(&device).unwrap();
        let hc = Tensor::<Backend, 3>::zeros([2, 5, 10], &device);
        let action_state = Tensor::<Backend, 3>::ones([2, 5, 4], &device);

        let latent = encode_actions(&a, None::<&LstmGaussian<Backend>>, action_state, hc, None, LatentChoice::Mean);
        assert_eq!(latent.ha.dims(), [2, 5, 6]);
        assert_eq!(latent.decoder_input.dims(), [2, 5, 16]);
        assert!(latent.prior.is_none());
    }

    #[test]
    fn test_prior_mean_enters_decoder_input() {
        let device = Default::default();
        let a = ActionNetConfig::new(4, 6).init::<Backend>(&device).unwrap();
        let la = LstmGaussian::<Backend>::new(16, 8, 1, 3, &device);
        let hc = Tensor::<Backend, 3>::zeros([2, 5, 10], &device);
        let action_state = Tensor::<Backend, 3>::ones([2, 5, 4], &device);
        let state = la.zero_state(2, &device);

        let latent = encode_actions(&a, Some(&la), action_state, hc, Some(state), LatentChoice::Mean);
        assert_eq!(latent.decoder_input.dims(), [2, 5, 19]);

        let prior = latent.prior.unwrap();
        let z_part = latent.decoder_input.narrow(2, 16, 3);
        let diff = (z_part - prior.mu).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }
}
