//! Error types for graph construction and sub-model loading.
//!
//! Every configuration problem is surfaced when a model is built, never
//! deferred to a forward pass. Shape violations that can only be seen once
//! a batch arrives are hard assertions inside the graph functions.

use burn::record::RecorderError;
use thiserror::Error;

use crate::nets::SubModelKind;

/// Errors raised while assembling a prediction graph.
#[derive(Debug, Error)]
pub enum AdrError {
    /// A configuration value is out of range or inconsistent with another.
    #[error("Configuration error: {detail}")]
    InvalidConfig {
        /// Description of the configuration issue.
        detail: String,
    },

    /// Neither an action nor a state stream was declared as input.
    #[error("At least one of actions or states must be supplied to the action network")]
    MissingActionState,

    /// The requested window is longer than the available sequence.
    #[error("Requested window of {use_seq_len} steps exceeds sequence length {seq_len}")]
    WindowTooLong {
        /// Window length asked for.
        use_seq_len: usize,
        /// Frames available per sample.
        seq_len: usize,
    },

    /// `context_frames` does not fit inside the window.
    #[error("context_frames={context_frames} must be in 1..={use_seq_len}")]
    ContextOutOfRange {
        /// Number of context frames requested.
        context_frames: usize,
        /// Window length the context has to fit in.
        use_seq_len: usize,
    },

    /// A variant needs a sub-network that was not provided.
    #[error("Variant {variant} requires sub-model {kind:?}")]
    MissingSubModel {
        /// Name of the variant being built.
        variant: &'static str,
        /// The absent sub-model.
        kind: SubModelKind,
    },

    /// Checkpoint loading failed.
    #[error("Failed to load {kind:?} from {path}: {reason}")]
    Checkpoint {
        /// Sub-model being loaded or saved.
        kind: SubModelKind,
        /// File the recorder tried to read or write.
        path: String,
        /// Recorder failure, rendered.
        reason: String,
    },
}

/// Result alias used across the crate.
pub type AdrResult<T> = Result<T, AdrError>;

impl AdrError {
    pub(crate) fn config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    pub(crate) fn checkpoint(kind: SubModelKind, path: String, err: RecorderError) -> Self {
        Self::Checkpoint {
            kind,
            path,
            reason: format!("{err:?}"),
        }
    }
}
