//! Trainable prediction model
//!
//! [`AdrModel`] owns every sub-network a [`Variant`] needs and dispatches a
//! forward pass to the matching graph in [`crate::graph`].
//!
//! ```ignore
//! let config = AdrConfig::new(Variant::TeacherForcing, 2, 12, NetsConfig::new([64, 64]))
//!     .with_action_dim(4);
//! let model = config.init::<Backend>(&device)?;
//! let output = model.forward(&batch);
//! println!("{:?}", output.metrics.to_scalars());
//! ```

use burn::module::{AutodiffModule, Ignored, Module};
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use rand::Rng;

use crate::config::{AdrConfig, Variant};
use crate::error::{AdrError, AdrResult};
use crate::graph::ao::AoNets;
use crate::graph::{
    adr, adr_ao, adr_vp_feedback, adr_vp_feedback_frames, adr_vp_teacher_forcing, assemble_inputs, GraphOutput,
    GraphSettings, InputName, InputSpec, PredictionNets, StateShape, VideoBatch,
};
use crate::nets::{
    ActionNet, ActionNetConfig, ImageDecoder, ImageDecoderConfig, ImageEncoder, ImageEncoderConfig, SubModel,
    SubModelKind, SubModelSpec,
};
use crate::rnn::{Lstm, LstmConfig, LstmGaussian, LstmGaussianConfig};

/// Action-conditioned video prediction model.
#[derive(Module, Debug)]
pub struct AdrModel<B: Backend> {
    /// Context encoder `Ec`
    ec: ImageEncoder<B>,
    /// Action network `A` / `rA`
    a: ActionNet<B>,
    /// Action-only decoder `Da` (the only decoder of the autoencoder graph)
    da: ImageDecoder<B>,
    /// Gaussian action prior `La`
    la: Option<LstmGaussian<B>>,
    /// "Other" encoder `Eo`
    eo: Option<ImageEncoder<B>>,
    /// Error-pair decoder `Do`
    do_: Option<ImageDecoder<B>>,
    /// "Other" predictor `L`
    l: Option<Lstm<B>>,
    config: Ignored<AdrConfig>,
}

impl AdrConfig {
    /// Every registry sub-model this configuration's variant runs.
    pub fn required_sub_models(&self) -> Vec<SubModelKind> {
        let mut kinds = vec![SubModelKind::Ec, self.action_kind(), SubModelKind::Da];
        if self.gaussian {
            kinds.push(SubModelKind::La);
        }
        if self.variant.has_residual() {
            kinds.extend([SubModelKind::Eo, SubModelKind::Da2]);
        }
        if self.variant.is_recurrent() {
            kinds.push(SubModelKind::L);
        }
        kinds
    }

    fn action_kind(&self) -> SubModelKind {
        if self.nets.action_recurrent_layers > 0 {
            SubModelKind::RA
        } else {
            SubModelKind::A
        }
    }

    fn decoder_input_dim(&self) -> usize {
        let z_dim = if self.gaussian { self.nets.z_dim } else { 0 };
        self.nets.hc_dim + self.nets.ha_dim + z_dim
    }

    fn other_encoder(&self) -> ImageEncoderConfig {
        ImageEncoderConfig::new(self.nets.image_size, 2 * self.nets.channels, self.nets.ho_dim)
            .with_filters(self.nets.filters.clone())
            .with_kernel_size(self.nets.kernel_size)
    }

    fn predictor(&self) -> LstmConfig {
        let nets = &self.nets;
        LstmConfig::new(nets.hc_dim + 2 * nets.ha_dim + nets.ho_dim)
            .with_units(nets.lstm_units)
            .with_num_layers(nets.lstm_layers)
            .with_proj_size(Some(nets.ho_dim))
    }

    /// Architecture of a registry sub-model under this configuration.
    ///
    /// `Da2` is the error-pair decoder, which shares `Da`'s architecture
    /// apart from its input and output widths. `Eo` and `L` are the "other"
    /// encoder and predictor of the residual and recurrent graphs.
    pub fn sub_model_spec(&self, kind: SubModelKind) -> SubModelSpec {
        let nets = &self.nets;
        match kind {
            SubModelKind::Ec => SubModelSpec::Encoder(
                ImageEncoderConfig::new(nets.image_size, nets.channels, nets.hc_dim)
                    .with_filters(nets.filters.clone())
                    .with_kernel_size(nets.kernel_size)
                    .with_recurrent(nets.recurrent_encoder),
            ),
            SubModelKind::A | SubModelKind::RA => SubModelSpec::Action(
                ActionNetConfig::new(self.action_state_dim(), nets.ha_dim)
                    .with_hidden(nets.action_hidden.clone())
                    .with_recurrent_layers(nets.action_recurrent_layers),
            ),
            SubModelKind::La => SubModelSpec::Gaussian(
                LstmGaussianConfig::new(nets.hc_dim + nets.ha_dim, nets.z_dim)
                    .with_units(nets.lstm_a_units)
                    .with_num_layers(nets.lstm_a_layers),
            ),
            SubModelKind::Da => SubModelSpec::Decoder(
                ImageDecoderConfig::new(nets.image_size, self.decoder_input_dim(), nets.channels)
                    .with_skip_filters(nets.filters.clone())
                    .with_kernel_size(nets.kernel_size),
            ),
            SubModelKind::Da2 => SubModelSpec::Decoder(
                ImageDecoderConfig::new(
                    nets.image_size,
                    nets.hc_dim + nets.ha_dim + nets.ho_dim,
                    2 * nets.channels,
                )
                .with_skip_filters(nets.filters.clone())
                .with_kernel_size(nets.kernel_size),
            ),
            SubModelKind::Eo => SubModelSpec::Encoder(self.other_encoder()),
            SubModelKind::L => SubModelSpec::Predictor(self.predictor()),
        }
    }

    /// Builds a model with freshly initialised sub-networks.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AdrResult<AdrModel<B>> {
        self.validate()?;
        let parts = self
            .required_sub_models()
            .into_iter()
            .map(|kind| {
                let part = kind.instantiate(&self.sub_model_spec(kind), true, device)?;
                Ok((kind, part))
            })
            .collect::<AdrResult<Vec<_>>>()?;
        AdrModel::from_sub_models(self.clone(), parts, device)
    }
}

type ReferenceNets<'a, B> = PredictionNets<
    'a,
    ImageEncoder<B>,
    ImageEncoder<B>,
    ActionNet<B>,
    ImageDecoder<B>,
    ImageDecoder<B>,
    LstmGaussian<B>,
>;

fn wrong_type(kind: SubModelKind) -> AdrError {
    AdrError::config(format!("sub-model passed as {kind:?} has the wrong type"))
}

impl<B: Backend> AdrModel<B> {
    /// Assembles a model from sub-models built or loaded through the
    /// registry. `Eo`, `Da2` and `L` are initialised fresh when the variant
    /// needs them and they are not given; every other required part must be
    /// present. Parts the variant does not run are rejected.
    pub fn from_sub_models(
        config: AdrConfig,
        parts: Vec<(SubModelKind, SubModel<B>)>,
        device: &B::Device,
    ) -> AdrResult<Self> {
        config.validate()?;
        let variant = config.variant.name();
        let required = config.required_sub_models();

        let (mut ec, mut a, mut la, mut da) = (None, None, None, None);
        let (mut eo, mut do_, mut l) = (None, None, None);
        for (kind, part) in parts {
            if !required.contains(&kind) {
                return Err(AdrError::config(format!("{variant} does not use a {kind:?} sub-model")));
            }
            match kind {
                SubModelKind::Ec => ec = Some(part.into_encoder().ok_or_else(|| wrong_type(kind))?),
                SubModelKind::A | SubModelKind::RA => {
                    a = Some(part.into_action().ok_or_else(|| wrong_type(kind))?)
                }
                SubModelKind::La => la = Some(part.into_gaussian().ok_or_else(|| wrong_type(kind))?),
                SubModelKind::Da => da = Some(part.into_decoder().ok_or_else(|| wrong_type(kind))?),
                SubModelKind::Da2 => do_ = Some(part.into_decoder().ok_or_else(|| wrong_type(kind))?),
                SubModelKind::Eo => eo = Some(part.into_encoder().ok_or_else(|| wrong_type(kind))?),
                SubModelKind::L => l = Some(part.into_predictor().ok_or_else(|| wrong_type(kind))?),
            }
        }

        let missing = |kind| AdrError::MissingSubModel { variant, kind };
        let ec = ec.ok_or_else(|| missing(SubModelKind::Ec))?;
        let a = a.ok_or_else(|| missing(config.action_kind()))?;
        let da = da.ok_or_else(|| missing(SubModelKind::Da))?;
        if config.gaussian && la.is_none() {
            return Err(missing(SubModelKind::La));
        }
        if a.input_size() != config.action_state_dim() {
            return Err(AdrError::config(format!(
                "action network takes {} features, batches carry {}",
                a.input_size(),
                config.action_state_dim()
            )));
        }

        let fresh = |kind: SubModelKind| -> AdrResult<SubModel<B>> {
            tracing::debug!(variant, kind = ?kind, "initialising missing sub-model");
            kind.instantiate(&config.sub_model_spec(kind), true, device)
        };
        if config.variant.has_residual() {
            if eo.is_none() {
                eo = fresh(SubModelKind::Eo)?.into_encoder();
            }
            if do_.is_none() {
                do_ = fresh(SubModelKind::Da2)?.into_decoder();
            }
        }
        if config.variant.is_recurrent() && l.is_none() {
            l = fresh(SubModelKind::L)?.into_predictor();
        }
        if let Some(eo) = &eo {
            if eo.in_channels() != 2 * config.nets.channels {
                return Err(AdrError::config(format!(
                    "Eo takes {} channels, error pairs carry {}",
                    eo.in_channels(),
                    2 * config.nets.channels
                )));
            }
        }

        tracing::debug!(variant, "assembled model");
        Ok(Self {
            ec,
            a,
            da,
            la,
            eo,
            do_,
            l,
            config: Ignored(config),
        })
    }

    /// Splits the model back into its registry sub-models, the inverse of
    /// [`AdrModel::from_sub_models`].
    pub fn into_sub_models(self) -> Vec<(SubModelKind, SubModel<B>)> {
        let mut parts = vec![
            (SubModelKind::Ec, SubModel::Encoder(self.ec)),
            (self.config.0.action_kind(), SubModel::Action(self.a)),
            (SubModelKind::Da, SubModel::Decoder(self.da)),
        ];
        if let Some(la) = self.la {
            parts.push((SubModelKind::La, SubModel::Gaussian(la)));
        }
        if let Some(eo) = self.eo {
            parts.push((SubModelKind::Eo, SubModel::Encoder(eo)));
        }
        if let Some(do_) = self.do_ {
            parts.push((SubModelKind::Da2, SubModel::Decoder(do_)));
        }
        if let Some(l) = self.l {
            parts.push((SubModelKind::L, SubModel::Predictor(l)));
        }
        parts
    }

    /// Rebuilds the model for another graph, keeping every trained network
    /// the new variant runs.
    ///
    /// Typical use is training [`Variant::TeacherForcing`] and rolling out
    /// with [`Variant::Feedback`] or [`Variant::FeedbackFrames`]. Networks
    /// the new variant does not run are dropped; ones it needs but this
    /// model lacks are initialised fresh.
    pub fn with_variant(self, variant: Variant, device: &B::Device) -> AdrResult<Self> {
        let mut config = self.config.0.clone();
        config.variant = variant;
        let required = config.required_sub_models();
        let parts = self
            .into_sub_models()
            .into_iter()
            .filter(|(kind, _)| required.contains(kind))
            .collect();
        Self::from_sub_models(config, parts, device)
    }

    /// Switches the autoencoder graph's Gaussian latent between sampling
    /// (`true`) and the mean (`false`).
    ///
    /// The flag lives in the configuration, not the backend: a model built
    /// with `training = true` keeps sampling after [`AutodiffModule::valid`]
    /// until this is called with `false`.
    pub fn with_training(mut self, training: bool) -> Self {
        self.config.0.training = training;
        self
    }

    pub fn config(&self) -> &AdrConfig {
        &self.config.0
    }

    pub fn variant(&self) -> Variant {
        self.config.0.variant
    }

    /// Named inputs the graph consumes, in feed order.
    pub fn required_inputs(&self) -> Vec<InputName> {
        let mut names = vec![InputName::Images];
        if self.config.0.action_dim > 0 {
            names.push(InputName::Actions);
        }
        if self.config.0.state_dim > 0 {
            names.push(InputName::States);
        }
        if self.config.0.gaussian {
            names.push(InputName::InitialStateA);
        }
        if self.config.0.variant.is_recurrent() {
            names.push(InputName::InitialState);
        }
        names
    }

    fn input_spec(&self) -> InputSpec {
        let nets = &self.config.0.nets;
        InputSpec {
            use_seq_len: self.config.0.window.use_seq_len,
            random_window: self.config.0.window.random_window,
            prior_state: self.config.0.gaussian.then_some(StateShape {
                units: nets.lstm_a_units,
                layers: nets.lstm_a_layers,
            }),
            recurrent_state: self.config.0.variant.is_recurrent().then_some(StateShape {
                units: nets.lstm_units,
                layers: nets.lstm_layers,
            }),
        }
    }

    fn settings(&self) -> GraphSettings {
        GraphSettings {
            context_frames: self.config.0.context_frames,
            reconstruct_random_frame: self.config.0.reconstruct_random_frame,
            training: self.config.0.training,
            kl_weight: self.config.0.kl_weight,
            objective: self.config.0.objective.clone(),
        }
    }

    fn prediction_nets(&self) -> ReferenceNets<'_, B> {
        match (&self.eo, &self.do_) {
            (Some(eo), Some(do_)) => PredictionNets {
                ec: &self.ec,
                eo,
                a: &self.a,
                da: &self.da,
                do_,
                la: self.la.as_ref(),
            },
            _ => unreachable!("residual sub-networks are built with every residual variant"),
        }
    }

    fn predictor(&self) -> &Lstm<B> {
        match &self.l {
            Some(l) => l,
            None => unreachable!("the predictor is built with every recurrent variant"),
        }
    }

    fn check_batch(&self, batch: &VideoBatch<B>) {
        let [_, seq_len, height, width, channels] = batch.frames.dims();
        let nets = &self.config.0.nets;
        assert_eq!(seq_len, self.config.0.seq_len, "batch sequence length differs from the configured one");
        assert_eq!([height, width], nets.image_size, "batch frame size differs from the configured one");
        assert_eq!(channels, nets.channels, "batch channel count differs from the configured one");
        assert_eq!(
            batch.actions.as_ref().map_or(0, |a| a.dims()[2]),
            self.config.0.action_dim,
            "batch action features differ from the configured ones"
        );
        assert_eq!(
            batch.states.as_ref().map_or(0, |s| s.dims()[2]),
            self.config.0.state_dim,
            "batch state features differ from the configured ones"
        );
    }

    /// Forward pass with the thread-local RNG.
    pub fn forward(&self, batch: &VideoBatch<B>) -> GraphOutput<B> {
        self.forward_with_rng(batch, &mut rand::thread_rng())
    }

    /// Forward pass drawing window offsets and random targets from `rng`.
    ///
    /// # Panics
    /// If the batch contradicts the configuration (sequence length, frame
    /// size, or action/state widths).
    pub fn forward_with_rng<R: Rng + ?Sized>(&self, batch: &VideoBatch<B>, rng: &mut R) -> GraphOutput<B> {
        self.check_batch(batch);
        let inputs = assemble_inputs(batch, &self.input_spec(), rng);
        let settings = self.settings();

        match self.config.0.variant {
            Variant::AutoencoderOnly => {
                let nets = AoNets {
                    ec: &self.ec,
                    a: &self.a,
                    d: &self.da,
                    prior: self.la.as_ref(),
                };
                adr_ao(nets, inputs, &settings, rng)
            }
            Variant::ActionResidual => adr(self.prediction_nets(), inputs, &settings, rng),
            Variant::TeacherForcing => {
                adr_vp_teacher_forcing(self.prediction_nets(), self.predictor(), inputs, &settings)
            }
            Variant::Feedback => adr_vp_feedback(self.prediction_nets(), self.predictor(), inputs, &settings),
            Variant::FeedbackFrames => {
                adr_vp_feedback_frames(self.prediction_nets(), self.predictor(), inputs, &settings)
            }
        }
    }
}

/// Host-side values of one optimisation step.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub loss: f32,
    pub metrics: Vec<(&'static str, f32)>,
}

/// Runs one forward/backward pass and applies an optimiser step.
pub fn train_step<B, O>(
    model: AdrModel<B>,
    optim: &mut O,
    batch: &VideoBatch<B>,
    learning_rate: f64,
) -> (AdrModel<B>, StepReport)
where
    B: AutodiffBackend,
    AdrModel<B>: AutodiffModule<B>,
    O: Optimizer<AdrModel<B>, B>,
{
    let output = model.forward(batch);

    let grads = output.loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);

    let report = StepReport {
        loss: output.loss_value(),
        metrics: output.metrics.to_scalars(),
    };
    tracing::debug!(loss = report.loss, "train step");

    (optim.step(learning_rate, model, grads), report)
}
