//! Windowing and input assembly

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::Rng;

use crate::graph::VideoBatch;
use crate::rnn::LstmState;

/// Layer count and width of a recurrent state to zero-initialise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateShape {
    pub units: usize,
    pub layers: usize,
}

/// What [`assemble_inputs`] has to produce.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub use_seq_len: usize,
    /// Draw the window start uniformly instead of starting at 0
    pub random_window: bool,
    /// State of the Gaussian action prior, when enabled
    pub prior_state: Option<StateShape>,
    /// State of the "other" predictor, for recurrent graphs
    pub recurrent_state: Option<StateShape>,
}

/// Windowed tensors plus zero initial states for one forward pass.
#[derive(Debug, Clone)]
pub struct GraphInputs<B: Backend> {
    /// `[batch, use_seq_len, h, w, c]`
    pub frames: Tensor<B, 5>,
    /// `[batch, use_seq_len, f]`, time-aligned with `frames`
    pub action_state: Tensor<B, 3>,
    /// Window start within the raw sequence
    pub start: usize,
    pub initial_state_a: Option<LstmState<B>>,
    pub initial_state: Option<LstmState<B>>,
}

impl<B: Backend> GraphInputs<B> {
    pub fn batch_size(&self) -> usize {
        self.frames.dims()[0]
    }

    pub fn use_seq_len(&self) -> usize {
        self.frames.dims()[1]
    }
}

/// Start index of a `use_seq_len` window inside `seq_len` steps.
///
/// A random start is uniform over `[0, seq_len - use_seq_len]`.
pub fn draw_window_start<R: Rng + ?Sized>(
    seq_len: usize,
    use_seq_len: usize,
    random_window: bool,
    rng: &mut R,
) -> usize {
    assert!(
        use_seq_len <= seq_len,
        "window of {} steps does not fit in {} frames",
        use_seq_len,
        seq_len
    );
    if random_window {
        rng.gen_range(0..=seq_len - use_seq_len)
    } else {
        0
    }
}

/// Windows frames and action/state with one shared offset and builds the
/// requested zero states.
///
/// # Panics
/// If the batch carries neither actions nor states, if the two streams
/// disagree with the frames on batch or time, or if the window does not fit.
pub fn assemble_inputs<B: Backend, R: Rng + ?Sized>(
    batch: &VideoBatch<B>,
    spec: &InputSpec,
    rng: &mut R,
) -> GraphInputs<B> {
    let [batch_size, seq_len, _, _, _] = batch.frames.dims();
    let action_state = match batch.action_state() {
        Some(action_state) => action_state,
        None => panic!("batch carries neither actions nor states"),
    };
    let [as_batch, as_len, _] = action_state.dims();
    assert_eq!(as_batch, batch_size, "action/state batch does not match frames");
    assert_eq!(as_len, seq_len, "action/state length does not match frames");

    let start = draw_window_start(seq_len, spec.use_seq_len, spec.random_window, rng);
    tracing::debug!(start, use_seq_len = spec.use_seq_len, seq_len, "window");

    let device = batch.frames.device();
    let zeros = |shape: StateShape| LstmState::zeros(shape.layers, batch_size, shape.units, &device);

    GraphInputs {
        frames: batch.frames.clone().narrow(1, start, spec.use_seq_len),
        action_state: action_state.narrow(1, start, spec.use_seq_len),
        start,
        initial_state_a: spec.prior_state.map(zeros),
        initial_state: spec.recurrent_state.map(zeros),
    }
}
