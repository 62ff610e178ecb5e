//! One-step-ahead prediction driven by ground truth

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::ObjectiveWeights;
use crate::graph::context::{encode_actions, encode_context, LatentChoice};
use crate::graph::inputs::GraphInputs;
use crate::graph::loss::{mse, Metrics};
use crate::graph::synthesis::ErrorPair;
use crate::graph::{remove_first_step, remove_last_step, GraphOutput, GraphSettings, OutputTensor, PredictionNets};
use crate::nets::{ActionEncoder, FrameDecoder, FrameEncoder, GaussianRecurrence, Recurrence, SkipBundle};
use crate::rnn::LstmState;

/// Action-only pass shared by the recurrent graphs.
pub(crate) struct ActionOnly<B: Backend> {
    /// `[batch, 1, hc_dim]`
    pub hc: Tensor<B, 3>,
    /// Single-step context skips
    pub skips: SkipBundle<B>,
    /// `[batch, n, ha_dim]`
    pub ha: Tensor<B, 3>,
    /// `[batch, n, h, w, 3]`
    pub x_rec_a: Tensor<B, 5>,
}

/// Encodes the leading context, the actions and decodes the action-only
/// frame for every step of the window. The prior contributes its mean.
pub(crate) fn action_only<B, Ec, Eo, A, Da, Do, La>(
    nets: PredictionNets<'_, Ec, Eo, A, Da, Do, La>,
    frames: &Tensor<B, 5>,
    action_state: Tensor<B, 3>,
    initial_state_a: Option<LstmState<B>>,
    context_frames: usize,
) -> ActionOnly<B>
where
    B: Backend,
    Ec: FrameEncoder<B>,
    A: ActionEncoder<B>,
    Da: FrameDecoder<B>,
    La: GaussianRecurrence<B>,
{
    let n_frames = frames.dims()[1];
    let ctx = encode_context(nets.ec, frames, 0, context_frames);
    let latent = encode_actions(
        nets.a,
        nets.la,
        action_state,
        ctx.hc_repeat(n_frames),
        initial_state_a,
        LatentChoice::Mean,
    );
    let x_rec_a = nets.da.decode(latent.decoder_input, &ctx.skips_repeat(n_frames));

    ActionOnly {
        hc: ctx.hc,
        skips: ctx.skips,
        ha: latent.ha,
        x_rec_a,
    }
}

/// Unwraps the "other" predictor's zero state.
pub(crate) fn recurrent_state<B: Backend>(inputs: &mut GraphInputs<B>) -> LstmState<B> {
    match inputs.initial_state.take() {
        Some(state) => state,
        None => panic!("recurrent graphs need an initial state for the predictor"),
    }
}

/// Terms of the teacher-forced objective, each `[1]`.
struct Terms<B: Backend> {
    ho_mse: Tensor<B, 1>,
    rec_curr: Tensor<B, 1>,
    rec_pred: Tensor<B, 1>,
    rec_pos: Tensor<B, 1>,
    rec_neg: Tensor<B, 1>,
}

fn weighted_objective<B: Backend>(weights: &ObjectiveWeights, terms: Terms<B>) -> Tensor<B, 1> {
    let weighted = [
        (weights.ho_mse, terms.ho_mse),
        (weights.rec_curr, terms.rec_curr),
        (weights.rec_pred, terms.rec_pred),
        (weights.rec_pos, terms.rec_pos),
        (weights.rec_neg, terms.rec_neg),
    ];
    let device = weighted[0].1.device();

    weighted
        .into_iter()
        .filter(|(w, _)| *w != 0.0)
        .fold(Tensor::zeros([1], &device), |acc, (w, t)| acc + t.mul_scalar(w))
}

/// Predicts every step `t+1` from ground truth up to `t`.
///
/// Ground-truth "other" embeddings come from `Eo([relu(x - x_rec_a),
/// relu(x_rec_a - x)])`. The predictor `L` reads `[hc, ha_t, ha_{t+1}, ho_t]`
/// for every step and its outputs `ho_pred` drive the error pair for
/// `t+1`; the current step is also reconstructed from `ho_t`.
///
/// Outputs: `ho_pred`, `x_curr`, `x_pred`, `x_rec_a`, `x_target_pred`.
/// Metrics: `ho_mse`, `rec_curr`, `rec_pred`, `rec_A`, `rec_pos`, `rec_neg`.
/// Objective: weighted by [`ObjectiveWeights`], by default
/// `rec_pred + rec_pos + rec_neg`.
pub fn adr_vp_teacher_forcing<B, Ec, Eo, A, Da, Do, La, L>(
    nets: PredictionNets<'_, Ec, Eo, A, Da, Do, La>,
    l: &L,
    mut inputs: GraphInputs<B>,
    settings: &GraphSettings,
) -> GraphOutput<B>
where
    B: Backend,
    Ec: FrameEncoder<B>,
    Eo: FrameEncoder<B>,
    A: ActionEncoder<B>,
    Da: FrameDecoder<B>,
    Do: FrameDecoder<B>,
    La: GaussianRecurrence<B>,
    L: Recurrence<B>,
{
    let _span = tracing::debug_span!("adr_vp_teacher_forcing").entered();

    let n_frames = inputs.use_seq_len();
    assert!(n_frames >= 2, "teacher forcing needs at least two frames");
    let initial_state = recurrent_state(&mut inputs);
    let frames = inputs.frames;

    let prefix = action_only(
        nets,
        &frames,
        inputs.action_state,
        inputs.initial_state_a,
        settings.context_frames,
    );
    let x_rec_a = prefix.x_rec_a;

    let x_err = ErrorPair::from_target(frames.clone(), x_rec_a.clone());
    let (ho, _) = nets.eo.encode(x_err.concat());

    let hc = prefix.hc.repeat_dim(1, n_frames - 1);
    let skips = prefix.skips.repeat(n_frames - 1);

    let ha_t = remove_last_step(prefix.ha.clone());
    let ha_tp1 = remove_first_step(prefix.ha);
    let ho_t = remove_last_step(ho.clone());
    let ho_tp1 = remove_first_step(ho);

    let h = Tensor::cat(vec![hc.clone(), ha_t.clone(), ha_tp1.clone(), ho_t.clone()], 2);
    let (ho_pred, _) = l.step_sequence(h, initial_state);

    // current step, from the ground-truth embedding
    let h = Tensor::cat(vec![hc.clone(), ha_t, ho_t], 2);
    let x_err_curr = ErrorPair::split(nets.do_.decode(h, &skips));
    let x_curr = x_err_curr.apply(remove_last_step(x_rec_a.clone()));
    let x_target_curr = remove_last_step(frames.clone());

    // next step, from the predicted embedding
    let h = Tensor::cat(vec![hc, ha_tp1, ho_pred.clone()], 2);
    let x_err_pred = ErrorPair::split(nets.do_.decode(h, &skips));
    let x_pred = x_err_pred.apply(remove_first_step(x_rec_a.clone()));
    let x_target_pred = remove_first_step(frames.clone());
    let x_err_target = x_err.narrow_time(1, n_frames - 1);

    let terms = Terms {
        ho_mse: mse(ho_tp1, ho_pred.clone()),
        rec_curr: mse(x_target_curr, x_curr.clone()),
        rec_pred: mse(x_target_pred.clone(), x_pred.clone()),
        rec_pos: mse(x_err_target.pos, x_err_pred.pos),
        rec_neg: mse(x_err_target.neg, x_err_pred.neg),
    };

    let mut metrics = Metrics::new();
    metrics.add("ho_mse", terms.ho_mse.clone());
    metrics.add("rec_curr", terms.rec_curr.clone());
    metrics.add("rec_pred", terms.rec_pred.clone());
    metrics.add("rec_A", mse(frames, x_rec_a.clone()));
    metrics.add("rec_pos", terms.rec_pos.clone());
    metrics.add("rec_neg", terms.rec_neg.clone());

    GraphOutput {
        outputs: vec![
            ("ho_pred", OutputTensor::Sequence(ho_pred)),
            ("x_curr", OutputTensor::Frames(x_curr)),
            ("x_pred", OutputTensor::Frames(x_pred)),
            ("x_rec_a", OutputTensor::Frames(x_rec_a)),
            ("x_target_pred", OutputTensor::Frames(x_target_pred)),
        ],
        metrics,
        loss: weighted_objective(&settings.objective, terms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type Backend = NdArray<f32>;

    fn terms(device: &<Backend as burn::tensor::backend::Backend>::Device) -> Terms<Backend> {
        let scalar = |v: f32| Tensor::<Backend, 1>::from_data(TensorData::from([v]), device);
        Terms {
            ho_mse: scalar(1.0),
            rec_curr: scalar(2.0),
            rec_pred: scalar(4.0),
            rec_pos: scalar(8.0),
            rec_neg: scalar(16.0),
        }
    }

    #[test]
    fn test_default_objective_skips_ho_and_curr() {
        let device = Default::default();
        let loss: f32 = weighted_objective(&ObjectiveWeights::new(), terms(&device)).into_scalar();
        assert_eq!(loss, 28.0);
    }

    #[test]
    fn test_custom_objective_weights() {
        let device = Default::default();
        let weights = ObjectiveWeights::new()
            .with_ho_mse(0.5)
            .with_rec_curr(0.125)
            .with_rec_pred(0.125)
            .with_rec_pos(0.0)
            .with_rec_neg(0.0);
        let loss: f32 = weighted_objective(&weights, terms(&device)).into_scalar();
        assert!((loss - 1.25).abs() < 1e-6);
    }
}
