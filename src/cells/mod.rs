//! # Recurrent Cells
//!
//! Single-timestep cells. They are wrapped by the sequence layers in
//! [`crate::rnn`] and by the ConvLSTM pass of [`crate::nets::BaseLayer`].
//!
//! | Cell | State | Used by |
//! |------|-------|---------|
//! | [`LSTMCell`] | `([batch, units], [batch, units])` | [`Lstm`](crate::rnn::Lstm), [`LstmGaussian`](crate::rnn::LstmGaussian) |
//! | [`ConvLSTMCell`] | `([batch, filters, h, w], [batch, filters, h, w])` | recurrent encoder levels |
//!
//! Both cells use the input/forget/candidate/output gate order with a unit
//! forget bias:
//!
//! ```text
//! c' = σ(f + 1) * c + σ(i) * act(g)
//! h' = σ(o) * act(c')
//! ```

pub mod conv_lstm_cell;
pub mod lstm_cell;

pub use conv_lstm_cell::ConvLSTMCell;
pub use lstm_cell::LSTMCell;
