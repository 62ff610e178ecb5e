//! # Sequence Layers
//!
//! Sequence-level recurrent layers built from the cells in [`crate::cells`].
//!
//! | Layer | Role in the prediction graphs |
//! |-------|-------------------------------|
//! | [`Lstm`] | predicts the next "other" embedding from `[hc, ha_t, ha_{t+1}, ho_t]` |
//! | [`LstmGaussian`] | stochastic action prior producing `(z, mu, logvar)` |
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | input | `[batch, seq_len, features]` (batch-first) |
//! | output | `[batch, seq_len, output_size]` |
//! | [`LstmState`] | hidden and cell, each `[n_layers, batch, units]` |
//!
//! ## Stepping
//!
//! Feeding a sequence one step at a time while carrying the returned state
//! gives the same outputs as feeding it whole:
//!
//! ```ignore
//! let mut state = lstm.zero_state(batch, &device);
//! for t in 0..seq_len {
//!     let (out_t, next) = lstm.forward(input.clone().narrow(1, t, 1), Some(state));
//!     state = next;
//! }
//! ```

pub mod gaussian;
pub mod lstm;
pub mod state;

pub use gaussian::{GaussianOutput, LstmGaussian, LstmGaussianConfig};
pub use lstm::{Lstm, LstmConfig};
pub use state::LstmState;
