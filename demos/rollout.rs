//! Rollout Example
//!
//! Builds every prediction graph on a synthetic batch and prints the
//! declared inputs, output shapes and metrics.
//!
//! Run with `RUST_LOG=adr=debug` to see window offsets and the feedback
//! switch-over.

use adr::prelude::*;
use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

type Backend = NdArray<f32>;

fn main() -> AdrResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== ADR Rollout Example ===\n");

    let device = Default::default();
    let (batch_size, seq_len) = (2, 12);

    let frames = Tensor::<Backend, 5>::random(
        [batch_size, seq_len, 16, 16, 3],
        Distribution::Uniform(0.0, 1.0),
        &device,
    );
    let actions = Tensor::<Backend, 3>::random([batch_size, seq_len, 4], Distribution::Uniform(-1.0, 1.0), &device);
    let states = Tensor::<Backend, 3>::random([batch_size, seq_len, 3], Distribution::Uniform(-1.0, 1.0), &device);
    let batch = VideoBatch::new(frames).with_actions(actions).with_states(states);

    let nets = NetsConfig::new([16, 16])
        .with_filters(vec![8, 16])
        .with_hc_dim(32)
        .with_ho_dim(32)
        .with_lstm_a_units(32)
        .with_lstm_units(32);

    let mut rng = StdRng::seed_from_u64(42);

    for variant in [
        Variant::AutoencoderOnly,
        Variant::ActionResidual,
        Variant::TeacherForcing,
        Variant::Feedback,
        Variant::FeedbackFrames,
    ] {
        let model: AdrModel<Backend> = AdrConfig::new(variant, 2, seq_len, nets.clone())
            .with_gaussian(true)
            .with_training(false)
            .with_action_dim(4)
            .with_state_dim(3)
            .init(&device)?;

        println!("{}", variant.name());
        let inputs: Vec<&str> = model.required_inputs().iter().map(InputName::as_str).collect();
        println!("  inputs:  {:?}", inputs);

        let output = model.forward_with_rng(&batch, &mut rng);
        for (name, tensor) in &output.outputs {
            println!("  {:<14} {:?}", name, tensor.dims());
        }
        for (name, value) in output.metrics.to_scalars() {
            println!("  {:<14} {:.5}", name, value);
        }
        println!("  {:<14} {:.5}\n", "loss", output.loss_value());
    }

    Ok(())
}
