//! Training Example
//!
//! A few Adam steps of the teacher-forced graph on synthetic moving-square
//! videos, then feedback rollouts with the trained networks: one switched
//! in place, one restored from checkpoints.

use adr::prelude::*;
use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

type TrainBackend = Autodiff<NdArray<f32>>;
type InferBackend = NdArray<f32>;

const SIZE: usize = 16;
const SEQ_LEN: usize = 8;

/// A bright square moving by the per-step action `(dx, dy)`.
fn moving_squares<B: Backend>(batch_size: usize, rng: &mut StdRng, device: &B::Device) -> VideoBatch<B> {
    let mut frames = vec![0.0f32; batch_size * SEQ_LEN * SIZE * SIZE * 3];
    let mut actions = vec![0.0f32; batch_size * SEQ_LEN * 2];

    for b in 0..batch_size {
        let (mut x, mut y) = (rng.gen_range(2..10) as i32, rng.gen_range(2..10) as i32);
        for t in 0..SEQ_LEN {
            let (dx, dy) = (rng.gen_range(-1..=1), rng.gen_range(-1..=1));
            actions[(b * SEQ_LEN + t) * 2] = dx as f32;
            actions[(b * SEQ_LEN + t) * 2 + 1] = dy as f32;

            for row in y..y + 4 {
                for col in x..x + 4 {
                    let pixel = ((b * SEQ_LEN + t) * SIZE + row as usize) * SIZE + col as usize;
                    frames[pixel * 3..pixel * 3 + 3].fill(1.0);
                }
            }
            x = (x + dx).clamp(0, SIZE as i32 - 4);
            y = (y + dy).clamp(0, SIZE as i32 - 4);
        }
    }

    let frames = Tensor::<B, 1>::from_floats(frames.as_slice(), device).reshape([batch_size, SEQ_LEN, SIZE, SIZE, 3]);
    let actions = Tensor::<B, 1>::from_floats(actions.as_slice(), device).reshape([batch_size, SEQ_LEN, 2]);
    VideoBatch::new(frames).with_actions(actions)
}

fn main() -> AdrResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("adr=info".parse().map_err(|e| {
            AdrError::InvalidConfig {
                detail: format!("log directive: {e}"),
            }
        })?))
        .init();

    println!("=== ADR Training Example ===\n");

    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(7);

    let nets = NetsConfig::new([SIZE, SIZE])
        .with_filters(vec![8, 16])
        .with_hc_dim(32)
        .with_ho_dim(32)
        .with_lstm_units(64);
    let config = AdrConfig::new(Variant::TeacherForcing, 2, SEQ_LEN, nets)
        .with_window(WindowConfig::new().with_use_seq_len(SEQ_LEN))
        .with_action_dim(2);

    let mut model: AdrModel<TrainBackend> = config.init(&device)?;
    let mut optim = AdamConfig::new().init();

    for step in 0..20 {
        let batch = moving_squares::<TrainBackend>(4, &mut rng, &device);
        let (next, report) = train_step(model, &mut optim, &batch, config.learning_rate);
        model = next;

        if step % 5 == 0 {
            println!("step {:>3}  loss {:.5}  {:?}", step, report.loss, report.metrics);
        }
    }

    let trained = model.valid().with_training(false);

    // Same networks, predicted frames fed back after the context.
    let frames_rollout = trained.clone().with_variant(Variant::FeedbackFrames, &device)?;

    // Round trip every network through checkpoints, then roll out in
    // embedding space with all of them frozen.
    let ckpt_dir = std::env::temp_dir().join("adr-train-demo");
    std::fs::create_dir_all(&ckpt_dir).map_err(|e| AdrError::InvalidConfig {
        detail: format!("cannot create {}: {e}", ckpt_dir.display()),
    })?;
    for (kind, part) in trained.into_sub_models() {
        let checkpoint = Checkpoint::new(&ckpt_dir, format!("{kind:?}"), false);
        part.save(&checkpoint).map_err(|e| AdrError::Checkpoint {
            kind,
            path: checkpoint.path().display().to_string(),
            reason: format!("{e:?}"),
        })?;
    }

    let mut feedback = config.clone();
    feedback.variant = Variant::Feedback;
    let parts = feedback
        .required_sub_models()
        .into_iter()
        .map(|kind| {
            let checkpoint = Checkpoint::new(&ckpt_dir, format!("{kind:?}"), false);
            Ok((kind, kind.load::<InferBackend>(&feedback.sub_model_spec(kind), &checkpoint, &device)?))
        })
        .collect::<AdrResult<Vec<_>>>()?;
    let rollout = AdrModel::<InferBackend>::from_sub_models(feedback, parts, &device)?;

    let batch = moving_squares::<InferBackend>(2, &mut rng, &device);
    println!("\nfeedback rollout:        {:?}", rollout.forward(&batch).metrics.to_scalars());
    println!("feedback-frames rollout: {:?}", frames_rollout.forward(&batch).metrics.to_scalars());

    Ok(())
}
