//! Rollouts that feed the model's own predictions back in
//!
//! Both graphs step the predictor one timestep at a time. For steps
//! `i < context_frames` the step input comes from ground truth; from
//! `i = context_frames` on it is replaced by what the previous step
//! predicted, so no step reads ground truth past the context.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::graph::inputs::GraphInputs;
use crate::graph::loss::{mse, Metrics};
use crate::graph::synthesis::ErrorPair;
use crate::graph::teacher_forcing::{action_only, recurrent_state};
use crate::graph::{remove_first_step, step, GraphOutput, GraphSettings, OutputTensor, PredictionNets};
use crate::nets::{ActionEncoder, FrameDecoder, FrameEncoder, GaussianRecurrence, Recurrence};

/// Outputs laid out like the teacher-forced graph's, with the prediction
/// in the `ho_pred`, `x_curr` and `x_pred` slots. Objective: `rec_pred`.
fn rollout_output<B: Backend>(x_pred: Tensor<B, 5>, x_rec_a: Tensor<B, 5>, frames: Tensor<B, 5>) -> GraphOutput<B> {
    let x_target = remove_first_step(frames.clone());
    let rec_pred = mse(x_target.clone(), x_pred.clone());

    let mut metrics = Metrics::new();
    metrics.add("rec_pred", rec_pred.clone());
    metrics.add("rec_A", mse(frames, x_rec_a.clone()));

    GraphOutput {
        outputs: vec![
            ("ho_pred", OutputTensor::Frames(x_pred.clone())),
            ("x_curr", OutputTensor::Frames(x_pred.clone())),
            ("x_pred", OutputTensor::Frames(x_pred)),
            ("x_rec_a", OutputTensor::Frames(x_rec_a)),
            ("x_target", OutputTensor::Frames(x_target)),
        ],
        metrics,
        loss: rec_pred,
    }
}

/// Feedback rollout in embedding space.
///
/// Ground-truth "other" embeddings are encoded as in
/// [`adr_vp_teacher_forcing`](crate::graph::adr_vp_teacher_forcing); once
/// `i >= context_frames` the predictor is fed its own previous `ho_pred`.
/// The per-step decoder inputs `[hc, ha_{t+1}, ho_pred]` are decoded in one
/// call at the end.
pub fn adr_vp_feedback<B, Ec, Eo, A, Da, Do, La, L>(
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
    let _span = tracing::debug_span!("adr_vp_feedback").entered();

    let n_frames = inputs.use_seq_len();
    assert!(n_frames >= 2, "feedback rollout needs at least two frames");
    let context_frames = settings.context_frames;
    let mut state = recurrent_state(&mut inputs);
    let frames = inputs.frames;

    let prefix = action_only(
        nets,
        &frames,
        inputs.action_state,
        inputs.initial_state_a,
        context_frames,
    );
    let x_rec_a = prefix.x_rec_a;
    let hc = prefix.hc;
    let ha = prefix.ha;

    let x_err = ErrorPair::from_target(frames.clone(), x_rec_a.clone());
    let (ho, _) = nets.eo.encode(x_err.concat());

    let mut h_pred = Vec::with_capacity(n_frames - 1);
    let mut ho_prev: Option<Tensor<B, 3>> = None;

    for i in 0..n_frames - 1 {
        let _step = tracing::trace_span!("step", i).entered();

        let ho_t = match ho_prev.take() {
            Some(ho_pred) if i >= context_frames => ho_pred,
            _ => step(&ho, i),
        };
        if i == context_frames {
            tracing::debug!(step = i, "feeding back predicted embeddings");
        }

        let ha_tp1 = step(&ha, i + 1);
        let h = Tensor::cat(vec![hc.clone(), step(&ha, i), ha_tp1.clone(), ho_t], 2);
        let (ho_pred, next) = l.step_sequence(h, state);
        state = next;

        h_pred.push(Tensor::cat(vec![hc.clone(), ha_tp1, ho_pred.clone()], 2));
        ho_prev = Some(ho_pred);
    }

    let h_pred = Tensor::cat(h_pred, 1);
    let x_err_pred = ErrorPair::split(nets.do_.decode(h_pred, &prefix.skips.repeat(n_frames - 1)));
    let x_pred = x_err_pred.apply(remove_first_step(x_rec_a.clone()));

    rollout_output(x_pred, x_rec_a, frames)
}

/// Feedback rollout in frame space.
///
/// Every step re-encodes `Eo([x_t, xa_t])`, where `x_t` is the ground-truth
/// frame before the context cutoff and the previous step's predicted frame
/// after it. Each step is decoded immediately with the single-step context
/// skips.
pub fn adr_vp_feedback_frames<B, Ec, Eo, A, Da, Do, La, L>(
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
    let _span = tracing::debug_span!("adr_vp_feedback_frames").entered();

    let n_frames = inputs.use_seq_len();
    assert!(n_frames >= 2, "feedback rollout needs at least two frames");
    let context_frames = settings.context_frames;
    let mut state = recurrent_state(&mut inputs);
    let frames = inputs.frames;

    let prefix = action_only(
        nets,
        &frames,
        inputs.action_state,
        inputs.initial_state_a,
        context_frames,
    );
    let x_rec_a = prefix.x_rec_a;
    let hc = prefix.hc;
    let ha = prefix.ha;

    let mut x_pred = Vec::with_capacity(n_frames - 1);
    let mut x_prev: Option<Tensor<B, 5>> = None;

    for i in 0..n_frames - 1 {
        let _step = tracing::trace_span!("step", i).entered();

        let x_t = match x_prev.take() {
            Some(x_pred_t) if i >= context_frames => x_pred_t,
            _ => step(&frames, i),
        };
        if i == context_frames {
            tracing::debug!(step = i, "feeding back predicted frames");
        }

        let (ho_t, _) = nets.eo.encode(Tensor::cat(vec![x_t, step(&x_rec_a, i)], 4));

        let ha_tp1 = step(&ha, i + 1);
        let h = Tensor::cat(vec![hc.clone(), step(&ha, i), ha_tp1.clone(), ho_t], 2);
        let (ho_pred, next) = l.step_sequence(h, state);
        state = next;

        let h_pred = Tensor::cat(vec![hc.clone(), ha_tp1, ho_pred], 2);
        let x_err_pred = ErrorPair::split(nets.do_.decode(h_pred, &prefix.skips));
        let x_pred_t = x_err_pred.apply(step(&x_rec_a, i + 1));

        x_pred.push(x_pred_t.clone());
        x_prev = Some(x_pred_t);
    }

    let x_pred = Tensor::cat(x_pred, 1);
    rollout_output(x_pred, x_rec_a, frames)
}
