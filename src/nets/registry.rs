//! Typed registry of the named sub-models and checkpoint loading
//!
//! Each [`SubModelKind`] maps to exactly one constructor; asking a kind to
//! build from the wrong kind of spec is a configuration error rather than a
//! lookup miss.

use std::path::PathBuf;

use burn::module::{Module, ModuleMapper, ModuleVisitor, ParamId};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, RecorderError};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{AdrError, AdrResult};
use crate::nets::{ActionNet, ActionNetConfig, ImageDecoder, ImageDecoderConfig, ImageEncoder, ImageEncoderConfig};
use crate::rnn::{Lstm, LstmConfig, LstmGaussian, LstmGaussianConfig};

/// Named sub-models that can be built fresh or restored from a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubModelKind {
    /// Context image encoder
    Ec,
    /// Per-step action network
    A,
    /// Recurrent action network
    RA,
    /// Gaussian LSTM prior
    La,
    /// Action-only image decoder
    Da,
    /// Second image decoder, producing the error pair
    Da2,
    /// "Other" image encoder over error pairs or `[frame, action-only frame]`
    Eo,
    /// "Other" embedding predictor of the recurrent graphs
    L,
}

/// Architecture description for one sub-model.
#[derive(Debug, Clone)]
pub enum SubModelSpec {
    Encoder(ImageEncoderConfig),
    Action(ActionNetConfig),
    Gaussian(LstmGaussianConfig),
    Decoder(ImageDecoderConfig),
    Predictor(LstmConfig),
}

/// A built sub-model.
#[derive(Debug)]
pub enum SubModel<B: Backend> {
    Encoder(ImageEncoder<B>),
    Action(ActionNet<B>),
    Gaussian(LstmGaussian<B>),
    Decoder(ImageDecoder<B>),
    Predictor(Lstm<B>),
}

/// Where a sub-model's weights live and whether they stay trainable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub ckpt_dir: PathBuf,
    /// File stem; the recorder appends its own extension.
    pub filename: String,
    pub trainable: bool,
}

impl Checkpoint {
    pub fn new(ckpt_dir: impl Into<PathBuf>, filename: impl Into<String>, trainable: bool) -> Self {
        Self {
            ckpt_dir: ckpt_dir.into(),
            filename: filename.into(),
            trainable,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.ckpt_dir.join(&self.filename)
    }
}

type Constructor<B> = fn(&SubModelSpec, &<B as Backend>::Device) -> Option<AdrResult<SubModel<B>>>;

fn build_encoder<B: Backend>(spec: &SubModelSpec, device: &B::Device) -> Option<AdrResult<SubModel<B>>> {
    match spec {
        SubModelSpec::Encoder(c) => Some(c.init(device).map(SubModel::Encoder)),
        _ => None,
    }
}

fn build_action<B: Backend>(spec: &SubModelSpec, device: &B::Device) -> Option<AdrResult<SubModel<B>>> {
    match spec {
        SubModelSpec::Action(c) => Some(c.clone().with_recurrent_layers(0).init(device).map(SubModel::Action)),
        _ => None,
    }
}

fn build_recurrent_action<B: Backend>(
    spec: &SubModelSpec,
    device: &B::Device,
) -> Option<AdrResult<SubModel<B>>> {
    match spec {
        SubModelSpec::Action(c) => {
            let layers = c.recurrent_layers.max(1);
            Some(c.clone().with_recurrent_layers(layers).init(device).map(SubModel::Action))
        }
        _ => None,
    }
}

fn build_gaussian<B: Backend>(spec: &SubModelSpec, device: &B::Device) -> Option<AdrResult<SubModel<B>>> {
    match spec {
        SubModelSpec::Gaussian(c) => Some(Ok(SubModel::Gaussian(c.init(device)))),
        _ => None,
    }
}

fn build_decoder<B: Backend>(spec: &SubModelSpec, device: &B::Device) -> Option<AdrResult<SubModel<B>>> {
    match spec {
        SubModelSpec::Decoder(c) => Some(c.init(device).map(SubModel::Decoder)),
        _ => None,
    }
}

fn build_predictor<B: Backend>(spec: &SubModelSpec, device: &B::Device) -> Option<AdrResult<SubModel<B>>> {
    match spec {
        SubModelSpec::Predictor(c) => Some(Ok(SubModel::Predictor(c.init(device)))),
        _ => None,
    }
}

impl SubModelKind {
    fn constructor<B: Backend>(self) -> Constructor<B> {
        match self {
            SubModelKind::Ec | SubModelKind::Eo => build_encoder::<B>,
            SubModelKind::A => build_action::<B>,
            SubModelKind::RA => build_recurrent_action::<B>,
            SubModelKind::La => build_gaussian::<B>,
            SubModelKind::Da | SubModelKind::Da2 => build_decoder::<B>,
            SubModelKind::L => build_predictor::<B>,
        }
    }

    /// Builds a freshly initialised sub-model, frozen unless `trainable`.
    pub fn instantiate<B: Backend>(
        self,
        spec: &SubModelSpec,
        trainable: bool,
        device: &B::Device,
    ) -> AdrResult<SubModel<B>> {
        let model = (self.constructor::<B>())(spec, device).ok_or_else(|| {
            AdrError::config(format!("{self:?} cannot be built from {spec:?}"))
        })??;
        Ok(if trainable { model } else { model.freeze() })
    }

    /// Builds the architecture from `spec` and restores its weights from
    /// `checkpoint`.
    pub fn load<B: Backend>(
        self,
        spec: &SubModelSpec,
        checkpoint: &Checkpoint,
        device: &B::Device,
    ) -> AdrResult<SubModel<B>> {
        let path = checkpoint.path();
        let model = self
            .instantiate::<B>(spec, true, device)?
            .load_file(path.clone(), device)
            .map_err(|e| AdrError::checkpoint(self, path.display().to_string(), e))?;

        tracing::debug!(kind = ?self, path = %path.display(), "loaded sub-model");
        if checkpoint.trainable {
            Ok(model)
        } else {
            tracing::warn!(kind = ?self, "sub-model loaded frozen");
            Ok(model.freeze())
        }
    }
}

impl<B: Backend> SubModel<B> {
    fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
        NamedMpkFileRecorder::<FullPrecisionSettings>::new()
    }

    fn load_file(self, path: PathBuf, device: &B::Device) -> Result<Self, RecorderError> {
        let recorder = Self::recorder();
        Ok(match self {
            SubModel::Encoder(m) => SubModel::Encoder(m.load_file(path, &recorder, device)?),
            SubModel::Action(m) => SubModel::Action(m.load_file(path, &recorder, device)?),
            SubModel::Gaussian(m) => SubModel::Gaussian(m.load_file(path, &recorder, device)?),
            SubModel::Decoder(m) => SubModel::Decoder(m.load_file(path, &recorder, device)?),
            SubModel::Predictor(m) => SubModel::Predictor(m.load_file(path, &recorder, device)?),
        })
    }

    /// Writes the weights to `checkpoint.path()`.
    pub fn save(self, checkpoint: &Checkpoint) -> Result<(), RecorderError> {
        let recorder = Self::recorder();
        let path = checkpoint.path();
        match self {
            SubModel::Encoder(m) => m.save_file(path, &recorder),
            SubModel::Action(m) => m.save_file(path, &recorder),
            SubModel::Gaussian(m) => m.save_file(path, &recorder),
            SubModel::Decoder(m) => m.save_file(path, &recorder),
            SubModel::Predictor(m) => m.save_file(path, &recorder),
        }
    }

    fn freeze(self) -> Self {
        match self {
            SubModel::Encoder(m) => SubModel::Encoder(freeze(m)),
            SubModel::Action(m) => SubModel::Action(freeze(m)),
            SubModel::Gaussian(m) => SubModel::Gaussian(freeze(m)),
            SubModel::Decoder(m) => SubModel::Decoder(freeze(m)),
            SubModel::Predictor(m) => SubModel::Predictor(freeze(m)),
        }
    }

    pub fn into_encoder(self) -> Option<ImageEncoder<B>> {
        match self {
            SubModel::Encoder(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_action(self) -> Option<ActionNet<B>> {
        match self {
            SubModel::Action(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_gaussian(self) -> Option<LstmGaussian<B>> {
        match self {
            SubModel::Gaussian(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_decoder(self) -> Option<ImageDecoder<B>> {
        match self {
            SubModel::Decoder(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_predictor(self) -> Option<Lstm<B>> {
        match self {
            SubModel::Predictor(m) => Some(m),
            _ => None,
        }
    }
}

/// Turns gradient tracking back on for every float parameter.
struct RequireGrad {
    visited: usize,
}

impl<B: Backend> ModuleMapper<B> for RequireGrad {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        self.visited += 1;
        tensor.set_require_grad(true)
    }
}

/// Stops gradient tracking for every parameter of `module`.
pub fn freeze<B: Backend, M: Module<B>>(module: M) -> M {
    tracing::trace!("freezing module");
    module.no_grad()
}

/// Re-enables gradient tracking for every parameter of `module`.
pub fn unfreeze<B: Backend, M: Module<B>>(module: M) -> M {
    let mut mapper = RequireGrad { visited: 0 };
    let module = module.map(&mut mapper);
    tracing::trace!(params = mapper.visited, "unfroze module");
    module
}

/// Counts float parameters and how many of them track gradients.
pub fn trainable_params<B: Backend, M: Module<B>>(module: &M) -> (usize, usize) {
    struct Counter {
        total: usize,
        trainable: usize,
    }

    impl<B: Backend> ModuleVisitor<B> for Counter {
        fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
            self.total += 1;
            if tensor.is_require_grad() {
                self.trainable += 1;
            }
        }
    }

    let mut counter = Counter {
        total: 0,
        trainable: 0,
    };
    module.visit(&mut counter);
    (counter.total, counter.trainable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type Backend = NdArray<f32>;
    type AdBackend = Autodiff<NdArray<f32>>;

    fn encoder_spec() -> SubModelSpec {
        SubModelSpec::Encoder(ImageEncoderConfig::new([8, 8], 3, 6).with_filters(vec![2, 4]))
    }

    #[test]
    fn test_kind_builds_matching_spec() {
        let device = Default::default();
        let model = SubModelKind::Ec
            .instantiate::<Backend>(&encoder_spec(), true, &device)
            .unwrap();
        assert_eq!(model.into_encoder().unwrap().h_dim(), 6);
    }

    #[test]
    fn test_kind_rejects_wrong_spec() {
        let device = Default::default();
        let result = SubModelKind::La.instantiate::<Backend>(&encoder_spec(), true, &device);
        assert!(matches!(result, Err(AdrError::InvalidConfig { .. })));
    }

    #[test]
    fn test_recurrent_action_kind() {
        let device = Default::default();
        let spec = SubModelSpec::Action(ActionNetConfig::new(4, 8));

        let plain = SubModelKind::A.instantiate::<Backend>(&spec, true, &device).unwrap();
        let recurrent = SubModelKind::RA.instantiate::<Backend>(&spec, true, &device).unwrap();

        assert!(!plain.into_action().unwrap().is_recurrent());
        assert!(recurrent.into_action().unwrap().is_recurrent());
    }

    #[test]
    fn test_predictor_kind_saves_and_loads() {
        let device = Default::default();
        let dir = std::env::temp_dir().join(format!("adr-registry-l-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let spec = SubModelSpec::Predictor(LstmConfig::new(5).with_units(6).with_proj_size(Some(3)));
        let checkpoint = Checkpoint::new(&dir, "L", false);

        let original = SubModelKind::L
            .instantiate::<Backend>(&spec, true, &device)
            .unwrap()
            .into_predictor()
            .unwrap();
        let input = Tensor::<Backend, 3>::random([2, 4, 5], burn::tensor::Distribution::Default, &device);
        let (expected, _) = original.forward(input.clone(), None);
        SubModel::Predictor(original).save(&checkpoint).unwrap();

        let restored = SubModelKind::L
            .load::<Backend>(&spec, &checkpoint, &device)
            .unwrap()
            .into_predictor()
            .unwrap();
        let (actual, _) = restored.forward(input, None);
        assert!((expected - actual).abs().max().into_scalar() < 1e-6);

        assert!(SubModelKind::Eo
            .instantiate::<Backend>(&spec, true, &device)
            .is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_freeze_and_unfreeze_walk_every_param() {
        let device = Default::default();
        let spec = SubModelSpec::Action(ActionNetConfig::new(4, 8).with_recurrent_layers(2));
        let net = SubModelKind::RA
            .instantiate::<AdBackend>(&spec, true, &device)
            .unwrap()
            .into_action()
            .unwrap();

        let (total, trainable) = trainable_params(&net);
        assert!(total > 0);
        assert_eq!(trainable, total);

        let net = freeze(net);
        assert_eq!(trainable_params(&net), (total, 0));

        let net = unfreeze(net);
        assert_eq!(trainable_params(&net), (total, total));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let device = Default::default();
        let dir = std::env::temp_dir().join(format!("adr-registry-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let checkpoint = Checkpoint::new(&dir, "Ec", false);

        let original = SubModelKind::Ec
            .instantiate::<Backend>(&encoder_spec(), true, &device)
            .unwrap()
            .into_encoder()
            .unwrap();
        let frames = Tensor::<Backend, 5>::random(
            [1, 2, 8, 8, 3],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let (expected, _) = original.forward(frames.clone());
        SubModel::Encoder(original).save(&checkpoint).unwrap();

        let restored = SubModelKind::Ec
            .load::<Backend>(&encoder_spec(), &checkpoint, &device)
            .unwrap()
            .into_encoder()
            .unwrap();
        let (actual, _) = restored.forward(frames);

        let diff = (expected - actual).abs().max().into_scalar();
        assert!(diff < 1e-6);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_error() {
        let device = Default::default();
        let checkpoint = Checkpoint::new("/nonexistent/adr", "Ec", true);
        let result = SubModelKind::Ec.load::<Backend>(&encoder_spec(), &checkpoint, &device);
        assert!(matches!(result, Err(AdrError::Checkpoint { .. })));
    }
}
