//! Autoencoder-only graph

use burn::tensor::backend::Backend;
use rand::Rng;

use crate::graph::context::{encode_actions, encode_context, LatentChoice};
use crate::graph::inputs::GraphInputs;
use crate::graph::loss::{kl_unit_normal, mse, Metrics};
use crate::graph::{last_step, GraphOutput, GraphSettings, OutputTensor};
use crate::nets::{ActionEncoder, FrameDecoder, FrameEncoder, GaussianRecurrence};

/// Sub-networks of [`adr_ao`].
pub struct AoNets<'a, Ec, A, D, L> {
    pub ec: &'a Ec,
    pub a: &'a A,
    pub d: &'a D,
    pub prior: Option<&'a L>,
}

/// Reconstructs the window from the context summary and the actions.
///
/// The decoded context comes from a randomly placed context window while a
/// second, start-aligned encoding only feeds `sim_loss`, which pulls the two
/// embeddings together. With `reconstruct_random_frame` a single target step
/// `r2` is decoded from actions `0..=r2`.
///
/// Outputs: `x_recovered`, `x_to_recover` (+ `mu`, `logvar` with a prior).
/// Objective: `rec_loss + sim_loss (+ kl_weight * kl_loss)`.
pub fn adr_ao<B, Ec, A, D, L, R>(
    nets: AoNets<'_, Ec, A, D, L>,
    inputs: GraphInputs<B>,
    settings: &GraphSettings,
    rng: &mut R,
) -> GraphOutput<B>
where
    B: Backend,
    Ec: FrameEncoder<B>,
    A: ActionEncoder<B>,
    D: FrameDecoder<B>,
    L: GaussianRecurrence<B>,
    R: Rng + ?Sized,
{
    let _span = tracing::debug_span!("adr_ao").entered();

    let use_seq_len = inputs.use_seq_len();
    let context_frames = settings.context_frames;
    assert!(
        context_frames <= use_seq_len,
        "context of {} frames does not fit a window of {}",
        context_frames,
        use_seq_len
    );

    let context_start = rng.gen_range(0..=use_seq_len - context_frames);
    let ctx_0 = encode_context(nets.ec, &inputs.frames, context_start, context_frames);
    let ctx_1 = encode_context(nets.ec, &inputs.frames, 0, context_frames);

    let (action_state, x_to_recover, n_frames, skips) = if settings.reconstruct_random_frame {
        let target = rng.gen_range(0..use_seq_len);
        tracing::debug!(context_start, target, "random context and target");
        (
            inputs.action_state.narrow(1, 0, target + 1),
            inputs.frames.narrow(1, target, 1),
            target + 1,
            ctx_0.skips.clone(),
        )
    } else {
        tracing::debug!(context_start, "random context");
        (
            inputs.action_state,
            inputs.frames,
            use_seq_len,
            ctx_0.skips_repeat(use_seq_len),
        )
    };

    let choice = if settings.training {
        LatentChoice::Sample
    } else {
        LatentChoice::Mean
    };
    let latent = encode_actions(
        nets.a,
        nets.prior,
        action_state,
        ctx_0.hc_repeat(n_frames),
        inputs.initial_state_a,
        choice,
    );

    let mut decoder_input = latent.decoder_input;
    let mut posterior = latent.prior.map(|p| (p.mu, p.logvar));
    if settings.reconstruct_random_frame {
        decoder_input = last_step(decoder_input);
        posterior = posterior.map(|(mu, logvar)| (last_step(mu), last_step(logvar)));
    }

    let x_recovered = nets.d.decode(decoder_input, &skips);

    let rec_loss = mse(x_to_recover.clone(), x_recovered.clone());
    let sim_loss = mse(ctx_1.hc, ctx_0.hc);

    let mut metrics = Metrics::new();
    metrics.add("rec_loss", rec_loss.clone());
    metrics.add("sim_loss", sim_loss.clone());

    let mut outputs = vec![
        ("x_recovered", OutputTensor::Frames(x_recovered)),
        ("x_to_recover", OutputTensor::Frames(x_to_recover)),
    ];
    let mut loss = rec_loss + sim_loss;

    if let Some((mu, logvar)) = posterior {
        let kl_loss = kl_unit_normal(mu.clone(), logvar.clone());
        metrics.add("kl_loss", kl_loss.clone());
        loss = loss + kl_loss.mean().mul_scalar(settings.kl_weight);
        outputs.push(("mu", OutputTensor::Sequence(mu)));
        outputs.push(("logvar", OutputTensor::Sequence(logvar)));
    }

    GraphOutput {
        outputs,
        metrics,
        loss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObjectiveWeights;
    use crate::nets::{ActionNet, ActionNetConfig, ImageDecoder, ImageDecoderConfig, ImageEncoderConfig};
    use crate::rnn::LstmGaussian;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, Tensor};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type Backend = NdArray<f32>;

    const USE_SEQ_LEN: usize = 6;
    const CONTEXT: usize = 2;

    fn settings() -> GraphSettings {
        GraphSettings {
            context_frames: CONTEXT,
            reconstruct_random_frame: false,
            training: false,
            kl_weight: 1.0,
            objective: ObjectiveWeights::new(),
        }
    }

    #[test]
    fn test_sim_loss_compares_shifted_and_leading_context() {
        let device = Default::default();
        let ec = ImageEncoderConfig::new([8, 8], 3, 5)
            .with_filters(vec![4, 4])
            .init::<Backend>(&device)
            .unwrap();
        let a: ActionNet<Backend> = ActionNetConfig::new(2, 3).init(&device).unwrap();
        let d: ImageDecoder<Backend> = ImageDecoderConfig::new([8, 8], 8, 3)
            .with_skip_filters(vec![4, 4])
            .init(&device)
            .unwrap();
        let nets = || AoNets {
            ec: &ec,
            a: &a,
            d: &d,
            prior: None::<&LstmGaussian<Backend>>,
        };

        let frames =
            Tensor::<Backend, 5>::random([2, USE_SEQ_LEN, 8, 8, 3], Distribution::Uniform(0.0, 1.0), &device);
        let action_state =
            Tensor::<Backend, 3>::random([2, USE_SEQ_LEN, 2], Distribution::Uniform(-1.0, 1.0), &device);
        let inputs = || GraphInputs {
            frames: frames.clone(),
            action_state: action_state.clone(),
            start: 0,
            initial_state_a: None,
            initial_state: None,
        };
        let leading = encode_context(&ec, &frames, 0, CONTEXT).hc;

        let mut shifted_seen = false;
        for seed in 0..20 {
            // The context offset is the graph's first draw.
            let offset = StdRng::seed_from_u64(seed).gen_range(0..=USE_SEQ_LEN - CONTEXT);
            assert!(offset <= USE_SEQ_LEN - CONTEXT);

            let output = adr_ao(nets(), inputs(), &settings(), &mut StdRng::seed_from_u64(seed));
            let sim_loss: f32 = output.metrics.get("sim_loss").unwrap().clone().into_scalar();

            let shifted = encode_context(&ec, &frames, offset, CONTEXT).hc;
            let expected: f32 = (shifted - leading.clone()).powf_scalar(2.0).mean().into_scalar();
            assert!(
                (sim_loss - expected).abs() <= 1e-6 * expected.max(1.0),
                "offset {}: sim_loss {} expected {}",
                offset,
                sim_loss,
                expected
            );

            if offset == 0 {
                assert_eq!(sim_loss, 0.0);
            } else {
                shifted_seen = true;
                assert!(sim_loss > 0.0);
            }
        }
        assert!(shifted_seen);
    }
}
