//! # ADR - Action-conditioned Disentangled video prediction (Rust)
//!
//! Video prediction graphs that split visual change into an agent-caused
//! part, decoded from actions and states, and an "other" part explained by
//! a positive/negative error image, built on the Burn framework.
//!
//! ## Features
//!
//! - **Windowing**: fixed or per-pass random sub-windows, time-aligned across frames and actions
//! - **Action-only decoding**: context summary + action embedding (+ optional Gaussian prior)
//! - **Error pairs**: `prediction = action_only + pos - neg` with non-negative halves
//! - **Recurrence**: teacher-forced, embedding-feedback and frame-feedback rollouts
//! - **Losses**: per-variant MSE terms, KL to a unit Gaussian, configurable objective weights
//! - **Registry**: typed sub-model constructors, checkpoint loading and freezing
//!
//! ## Quick Start
//!
//! ```rust
//! use adr::prelude::*;
//! use burn::backend::NdArray;
//!
//! let config = AdrConfig::new(
//!     Variant::TeacherForcing,
//!     2,
//!     12,
//!     NetsConfig::new([8, 8]).with_filters(vec![4, 4]),
//! )
//! .with_action_dim(4);
//!
//! let model = config.init::<NdArray<f32>>(&Default::default()).unwrap();
//! assert_eq!(
//!     model.required_inputs(),
//!     vec![InputName::Images, InputName::Actions, InputName::InitialState]
//! );
//! ```
//!
//! ## Graph-level Usage
//!
//! The assembly functions in [`graph`] accept any sub-networks implementing
//! the traits in [`nets`]:
//!
//! ```ignore
//! use adr::graph::{adr_vp_feedback, assemble_inputs, PredictionNets};
//!
//! let inputs = assemble_inputs(&batch, &spec, &mut rng);
//! let output = adr_vp_feedback(nets, &predictor, inputs, &settings);
//! let x_pred = output.frames("x_pred");
//! ```

pub mod activation;
pub mod cells;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod nets;
pub mod rnn;

pub mod prelude {
    pub use crate::activation::Activation;
    pub use crate::config::{AdrConfig, NetsConfig, ObjectiveWeights, Variant, WindowConfig};
    pub use crate::error::{AdrError, AdrResult};
    pub use crate::graph::{GraphOutput, InputName, Metrics, OutputTensor, VideoBatch};
    pub use crate::model::{train_step, AdrModel, StepReport};
    pub use crate::nets::{Checkpoint, SubModel, SubModelKind, SubModelSpec};
}
