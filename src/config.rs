//! Graph configuration
//!
//! All configs derive Burn's [`Config`], so they carry `with_*` builders and
//! can be saved to and loaded from JSON.

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::error::{AdrError, AdrResult};

/// Which prediction graph to assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// Context + action autoencoder, no residual
    AutoencoderOnly,
    /// Action-only frame plus a residual error pair
    ActionResidual,
    /// One-step-ahead prediction driven by ground truth
    TeacherForcing,
    /// Rollout feeding back the predicted "other" embedding
    Feedback,
    /// Rollout feeding back the predicted frame
    FeedbackFrames,
}

impl Variant {
    pub fn name(&self) -> &'static str {
        match self {
            Variant::AutoencoderOnly => "adr_ao",
            Variant::ActionResidual => "adr",
            Variant::TeacherForcing => "adr_vp_teacher_forcing",
            Variant::Feedback => "adr_vp_feedback",
            Variant::FeedbackFrames => "adr_vp_feedback_frames",
        }
    }

    /// Steps the "other" predictor through time.
    pub fn is_recurrent(&self) -> bool {
        matches!(
            self,
            Variant::TeacherForcing | Variant::Feedback | Variant::FeedbackFrames
        )
    }

    /// Needs the "other" encoder and the error-pair decoder.
    pub fn has_residual(&self) -> bool {
        !matches!(self, Variant::AutoencoderOnly)
    }
}

/// Temporal window cut from every sample.
#[derive(Config, Debug)]
pub struct WindowConfig {
    #[config(default = 12)]
    pub use_seq_len: usize,
    /// Draw a fresh window start on every forward pass
    #[config(default = false)]
    pub random_window: bool,
}

/// Weights of the teacher-forced objective.
///
/// Every term is computed and logged; only non-zero weights reach the loss.
#[derive(Config, Debug)]
pub struct ObjectiveWeights {
    #[config(default = 0.0)]
    pub ho_mse: f64,
    #[config(default = 0.0)]
    pub rec_curr: f64,
    #[config(default = 1.0)]
    pub rec_pred: f64,
    #[config(default = 1.0)]
    pub rec_pos: f64,
    #[config(default = 1.0)]
    pub rec_neg: f64,
}

/// Sizes of the reference sub-networks.
#[derive(Config, Debug)]
pub struct NetsConfig {
    /// `[height, width]` of every frame
    pub image_size: [usize; 2],
    #[config(default = 3)]
    pub channels: usize,
    /// Encoder filters per level, shallowest first; the decoders mirror them
    #[config(default = "vec![32, 64]")]
    pub filters: Vec<usize>,
    #[config(default = 5)]
    pub kernel_size: usize,
    /// Use ConvLSTM levels in the context encoder
    #[config(default = false)]
    pub recurrent_encoder: bool,
    /// Context embedding `hc`
    #[config(default = 128)]
    pub hc_dim: usize,
    /// "Other" embedding `ho`
    #[config(default = 128)]
    pub ho_dim: usize,
    /// Action embedding `ha`
    #[config(default = 16)]
    pub ha_dim: usize,
    #[config(default = "vec![32]")]
    pub action_hidden: Vec<usize>,
    /// LSTM layers appended to the action network (0 for a plain MLP)
    #[config(default = 0)]
    pub action_recurrent_layers: usize,
    /// Latent size of the Gaussian prior
    #[config(default = 10)]
    pub z_dim: usize,
    #[config(default = 256)]
    pub lstm_a_units: usize,
    #[config(default = 1)]
    pub lstm_a_layers: usize,
    #[config(default = 256)]
    pub lstm_units: usize,
    #[config(default = 2)]
    pub lstm_layers: usize,
}

/// Full configuration of an [`AdrModel`](crate::model::AdrModel).
#[derive(Config, Debug)]
pub struct AdrConfig {
    pub variant: Variant,
    /// Leading frames that form the context window
    pub context_frames: usize,
    /// Frames per raw sample
    pub seq_len: usize,
    pub nets: NetsConfig,
    #[config(default = "WindowConfig::new()")]
    pub window: WindowConfig,
    /// Enable the Gaussian action prior
    #[config(default = false)]
    pub gaussian: bool,
    #[config(default = 1.0)]
    pub kl_weight: f64,
    /// Sample the prior latent; inference uses its mean
    #[config(default = true)]
    pub training: bool,
    #[config(default = false)]
    pub reconstruct_random_frame: bool,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    #[config(default = "ObjectiveWeights::new()")]
    pub objective: ObjectiveWeights,
    /// Action features per step (0 when the batch has no actions)
    #[config(default = 0)]
    pub action_dim: usize,
    /// State features per step (0 when the batch has no states)
    #[config(default = 0)]
    pub state_dim: usize,
}

impl AdrConfig {
    /// Checks every value that can be checked before a batch is seen.
    pub fn validate(&self) -> AdrResult<()> {
        if self.action_dim + self.state_dim == 0 {
            return Err(AdrError::MissingActionState);
        }

        let use_seq_len = self.window.use_seq_len;
        if use_seq_len > self.seq_len {
            return Err(AdrError::WindowTooLong {
                use_seq_len,
                seq_len: self.seq_len,
            });
        }
        if self.context_frames == 0 || self.context_frames > use_seq_len {
            return Err(AdrError::ContextOutOfRange {
                context_frames: self.context_frames,
                use_seq_len,
            });
        }
        if self.variant.is_recurrent() && use_seq_len < 2 {
            return Err(AdrError::config(format!(
                "{} pairs steps t and t+1 and needs use_seq_len >= 2",
                self.variant.name()
            )));
        }
        if self.variant.is_recurrent() && self.reconstruct_random_frame {
            return Err(AdrError::config(format!(
                "{} predicts every step and cannot reconstruct a random frame",
                self.variant.name()
            )));
        }
        if self.kl_weight.is_nan() || self.kl_weight < 0.0 {
            return Err(AdrError::config(format!(
                "kl_weight must be non-negative, got {}",
                self.kl_weight
            )));
        }
        if self.variant.has_residual() && self.nets.channels != 3 {
            return Err(AdrError::config(format!(
                "error images are split into two 3-channel halves, frames have {} channels",
                self.nets.channels
            )));
        }
        Ok(())
    }

    /// Features per step of the concatenated action/state stream.
    pub fn action_state_dim(&self) -> usize {
        self.action_dim + self.state_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(variant: Variant) -> AdrConfig {
        with_context(variant, 2)
    }

    fn with_context(variant: Variant, context_frames: usize) -> AdrConfig {
        AdrConfig::new(variant, context_frames, 12, NetsConfig::new([8, 8])).with_action_dim(4)
    }

    #[test]
    fn test_defaults() {
        let c = config(Variant::TeacherForcing);
        assert_eq!(c.window.use_seq_len, 12);
        assert!(!c.window.random_window);
        assert!(!c.gaussian);
        assert!(c.training);
        assert_eq!(c.objective.rec_pred, 1.0);
        assert_eq!(c.objective.rec_curr, 0.0);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_missing_action_state() {
        let c = config(Variant::ActionResidual).with_action_dim(0);
        assert!(matches!(c.validate(), Err(AdrError::MissingActionState)));
        assert!(c.with_state_dim(3).validate().is_ok());
    }

    #[test]
    fn test_window_too_long() {
        let c = config(Variant::AutoencoderOnly).with_window(WindowConfig::new().with_use_seq_len(13));
        assert!(matches!(
            c.validate(),
            Err(AdrError::WindowTooLong {
                use_seq_len: 13,
                seq_len: 12
            })
        ));
    }

    #[test]
    fn test_context_out_of_range() {
        let c = with_context(Variant::Feedback, 0);
        assert!(matches!(c.validate(), Err(AdrError::ContextOutOfRange { .. })));

        let c = with_context(Variant::Feedback, 13);
        assert!(matches!(c.validate(), Err(AdrError::ContextOutOfRange { .. })));

        // The whole window may serve as context.
        assert!(with_context(Variant::Feedback, 12).validate().is_ok());
    }

    #[test]
    fn test_recurrent_rejects_random_frame() {
        let c = config(Variant::TeacherForcing).with_reconstruct_random_frame(true);
        assert!(matches!(c.validate(), Err(AdrError::InvalidConfig { .. })));
        assert!(config(Variant::ActionResidual)
            .with_reconstruct_random_frame(true)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_variant_flags() {
        assert!(!Variant::AutoencoderOnly.has_residual());
        assert!(!Variant::ActionResidual.is_recurrent());
        assert!(Variant::FeedbackFrames.is_recurrent());
        assert_eq!(Variant::Feedback.name(), "adr_vp_feedback");
    }
}
