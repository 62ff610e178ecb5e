//! Action-only prediction with a residual error pair

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::Rng;

use crate::graph::context::{encode_actions, encode_context, LatentChoice};
use crate::graph::inputs::GraphInputs;
use crate::graph::loss::{mse, Metrics};
use crate::graph::synthesis::ErrorPair;
use crate::graph::{last_step, GraphOutput, GraphSettings, OutputTensor, PredictionNets};
use crate::nets::{ActionEncoder, FrameDecoder, FrameEncoder, GaussianRecurrence};

/// Decodes an action-only frame `x_rec_a`, then explains what it misses
/// with an error pair decoded from `[hc, ha, ho]`, where `ho` encodes the
/// actual frame next to `x_rec_a`.
///
/// The Gaussian prior, when present, contributes its mean.
///
/// Outputs: `x_recovered` (`pos - neg`), `x_rec_a`, `x_pred`
/// (`x_rec_a + pos - neg`), `x_target`.
/// Objective: `rec_loss + rec_loss_pos + rec_loss_neg`; `rec_A` is
/// monitored only.
pub fn adr<B, Ec, Eo, A, Da, Do, La, R>(
    nets: PredictionNets<'_, Ec, Eo, A, Da, Do, La>,
    inputs: GraphInputs<B>,
    settings: &GraphSettings,
    rng: &mut R,
) -> GraphOutput<B>
where
    B: Backend,
    Ec: FrameEncoder<B>,
    Eo: FrameEncoder<B>,
    A: ActionEncoder<B>,
    Da: FrameDecoder<B>,
    Do: FrameDecoder<B>,
    La: GaussianRecurrence<B>,
    R: Rng + ?Sized,
{
    let _span = tracing::debug_span!("adr").entered();

    let use_seq_len = inputs.use_seq_len();
    let ctx = encode_context(nets.ec, &inputs.frames, 0, settings.context_frames);

    let (action_state, x_to_recover, n_frames, skips) = if settings.reconstruct_random_frame {
        let target = rng.gen_range(0..use_seq_len);
        tracing::debug!(target, "random target frame");
        (
            inputs.action_state.narrow(1, 0, target + 1),
            inputs.frames.narrow(1, target, 1),
            target + 1,
            ctx.skips.clone(),
        )
    } else {
        (
            inputs.action_state,
            inputs.frames,
            use_seq_len,
            ctx.skips_repeat(use_seq_len),
        )
    };

    let latent = encode_actions(
        nets.a,
        nets.la,
        action_state,
        ctx.hc_repeat(n_frames),
        inputs.initial_state_a,
        LatentChoice::Mean,
    );

    let (hc_ha, ha, hc) = if settings.reconstruct_random_frame {
        (last_step(latent.decoder_input), last_step(latent.ha), ctx.hc.clone())
    } else {
        (latent.decoder_input, latent.ha, ctx.hc_repeat(n_frames))
    };

    let x_rec_a = nets.da.decode(hc_ha, &skips);
    let target = ErrorPair::from_target(x_to_recover.clone(), x_rec_a.clone());

    let (ho, _) = nets
        .eo
        .encode(Tensor::cat(vec![x_to_recover.clone(), x_rec_a.clone()], 4));
    let h = Tensor::cat(vec![hc, ha, ho], 2);
    let x_err = ErrorPair::split(nets.do_.decode(h, &skips));

    let x_recovered = x_err.residual();
    let x_target = x_to_recover.clone() - x_rec_a.clone();

    let rec_loss = mse(x_target, x_recovered.clone());
    let rec_loss_pos = mse(target.pos, x_err.pos.clone());
    let rec_loss_neg = mse(target.neg, x_err.neg.clone());
    let rec_a = mse(x_to_recover.clone(), x_rec_a.clone());

    let mut metrics = Metrics::new();
    metrics.add("rec_loss", rec_loss.clone());
    metrics.add("rec_loss_pos", rec_loss_pos.clone());
    metrics.add("rec_loss_neg", rec_loss_neg.clone());
    metrics.add("rec_A", rec_a);

    let x_pred = x_err.apply(x_rec_a.clone());

    GraphOutput {
        outputs: vec![
            ("x_recovered", OutputTensor::Frames(x_recovered)),
            ("x_rec_a", OutputTensor::Frames(x_rec_a)),
            ("x_pred", OutputTensor::Frames(x_pred)),
            ("x_target", OutputTensor::Frames(x_to_recover)),
        ],
        metrics,
        loss: rec_loss + (rec_loss_pos + rec_loss_neg),
    }
}
