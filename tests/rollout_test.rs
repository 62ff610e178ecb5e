#[cfg(test)]
mod tests {
    use adr::config::ObjectiveWeights;
    use adr::graph::{
        adr_vp_feedback, adr_vp_feedback_frames, adr_vp_teacher_forcing, assemble_inputs, GraphInputs,
        GraphOutput, GraphSettings, InputSpec, PredictionNets, StateShape, VideoBatch,
    };
    use adr::nets::{
        ActionNet, ActionNetConfig, ImageDecoder, ImageDecoderConfig, ImageEncoder, ImageEncoderConfig,
    };
    use adr::rnn::{Lstm, LstmConfig, LstmGaussian, LstmGaussianConfig};
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, Tensor};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type Backend = NdArray<f32>;

    const HC: usize = 8;
    const HO: usize = 8;
    const HA: usize = 4;
    const Z: usize = 3;

    struct Nets {
        ec: ImageEncoder<Backend>,
        eo: ImageEncoder<Backend>,
        a: ActionNet<Backend>,
        da: ImageDecoder<Backend>,
        do_: ImageDecoder<Backend>,
        la: Option<LstmGaussian<Backend>>,
        l: Lstm<Backend>,
    }

    impl Nets {
        fn build(gaussian: bool) -> Self {
            let device = Default::default();
            let z = if gaussian { Z } else { 0 };
            Self {
                ec: ImageEncoderConfig::new([8, 8], 3, HC)
                    .with_filters(vec![4, 4])
                    .init(&device)
                    .unwrap(),
                eo: ImageEncoderConfig::new([8, 8], 6, HO)
                    .with_filters(vec![4, 4])
                    .init(&device)
                    .unwrap(),
                a: ActionNetConfig::new(2, HA)
                    .with_hidden(vec![8])
                    .init(&device)
                    .unwrap(),
                da: ImageDecoderConfig::new([8, 8], HC + HA + z, 3)
                    .with_skip_filters(vec![4, 4])
                    .init(&device)
                    .unwrap(),
                do_: ImageDecoderConfig::new([8, 8], HC + HA + HO, 6)
                    .with_skip_filters(vec![4, 4])
                    .init(&device)
                    .unwrap(),
                la: gaussian.then(|| LstmGaussianConfig::new(HC + HA, Z).with_units(8).init(&device)),
                l: LstmConfig::new(HC + 2 * HA + HO)
                    .with_units(8)
                    .with_num_layers(2)
                    .with_proj_size(Some(HO))
                    .init(&device),
            }
        }

        fn prediction(
            &self,
        ) -> PredictionNets<
            '_,
            ImageEncoder<Backend>,
            ImageEncoder<Backend>,
            ActionNet<Backend>,
            ImageDecoder<Backend>,
            ImageDecoder<Backend>,
            LstmGaussian<Backend>,
        > {
            PredictionNets {
                ec: &self.ec,
                eo: &self.eo,
                a: &self.a,
                da: &self.da,
                do_: &self.do_,
                la: self.la.as_ref(),
            }
        }
    }

    fn batch(batch_size: usize, seq_len: usize) -> VideoBatch<Backend> {
        let device = Default::default();
        let frames =
            Tensor::<Backend, 5>::random([batch_size, seq_len, 8, 8, 3], Distribution::Uniform(0.0, 1.0), &device);
        let actions =
            Tensor::<Backend, 3>::random([batch_size, seq_len, 2], Distribution::Uniform(-1.0, 1.0), &device);
        VideoBatch::new(frames).with_actions(actions)
    }

    fn inputs(batch: &VideoBatch<Backend>, gaussian: bool) -> GraphInputs<Backend> {
        let spec = InputSpec {
            use_seq_len: batch.seq_len(),
            random_window: false,
            prior_state: gaussian.then_some(StateShape { units: 8, layers: 1 }),
            recurrent_state: Some(StateShape { units: 8, layers: 2 }),
        };
        assemble_inputs(batch, &spec, &mut StdRng::seed_from_u64(0))
    }

    fn settings(context_frames: usize) -> GraphSettings {
        GraphSettings {
            context_frames,
            reconstruct_random_frame: false,
            training: false,
            kl_weight: 1.0,
            objective: ObjectiveWeights::new(),
        }
    }

    fn x_pred(output: &GraphOutput<Backend>) -> Tensor<Backend, 5> {
        output.frames("x_pred").unwrap().clone()
    }

    fn max_abs_diff(a: Tensor<Backend, 5>, b: Tensor<Backend, 5>) -> f32 {
        (a - b).abs().max().into_scalar()
    }

    #[test]
    fn test_recurrent_variants_predict_one_step_fewer() {
        let nets = Nets::build(false);
        let batch = batch(2, 12);

        let tf = adr_vp_teacher_forcing(nets.prediction(), &nets.l, inputs(&batch, false), &settings(2));
        let fb = adr_vp_feedback(nets.prediction(), &nets.l, inputs(&batch, false), &settings(2));
        let ff = adr_vp_feedback_frames(nets.prediction(), &nets.l, inputs(&batch, false), &settings(2));

        for output in [&tf, &fb, &ff] {
            assert_eq!(x_pred(output).dims(), [2, 11, 8, 8, 3]);
            assert_eq!(output.frames("x_rec_a").unwrap().dims(), [2, 12, 8, 8, 3]);
        }
        assert_eq!(tf.output("ho_pred").unwrap().dims(), vec![2, 11, HO]);
        assert_eq!(tf.frames("x_curr").unwrap().dims(), [2, 11, 8, 8, 3]);
        assert_eq!(fb.frames("x_target").unwrap().dims(), [2, 11, 8, 8, 3]);
    }

    #[test]
    fn test_output_and_metric_layout() {
        let nets = Nets::build(false);
        let batch = batch(1, 5);

        let tf = adr_vp_teacher_forcing(nets.prediction(), &nets.l, inputs(&batch, false), &settings(2));
        assert_eq!(
            tf.output_names(),
            vec!["ho_pred", "x_curr", "x_pred", "x_rec_a", "x_target_pred"]
        );
        assert_eq!(
            tf.metrics.names(),
            vec!["ho_mse", "rec_curr", "rec_pred", "rec_A", "rec_pos", "rec_neg"]
        );

        let fb = adr_vp_feedback(nets.prediction(), &nets.l, inputs(&batch, false), &settings(2));
        assert_eq!(fb.output_names(), vec!["ho_pred", "x_curr", "x_pred", "x_rec_a", "x_target"]);
        assert_eq!(fb.metrics.names(), vec!["rec_pred", "rec_A"]);

        // Feedback graphs repeat the prediction in the teacher-forced slots.
        assert_eq!(max_abs_diff(fb.frames("ho_pred").unwrap().clone(), x_pred(&fb)), 0.0);
        assert_eq!(max_abs_diff(fb.frames("x_curr").unwrap().clone(), x_pred(&fb)), 0.0);
    }

    #[test]
    fn test_feedback_without_hallucination_matches_teacher_forcing() {
        for gaussian in [false, true] {
            let nets = Nets::build(gaussian);
            let batch = batch(2, 6);

            let tf = adr_vp_teacher_forcing(nets.prediction(), &nets.l, inputs(&batch, gaussian), &settings(6));
            let fb = adr_vp_feedback(nets.prediction(), &nets.l, inputs(&batch, gaussian), &settings(6));

            let diff = max_abs_diff(x_pred(&tf), x_pred(&fb));
            assert!(diff < 1e-5, "feedback diverged from teacher forcing by {}", diff);
        }
    }

    #[test]
    fn test_feedback_never_reads_frames_past_the_context() {
        let nets = Nets::build(false);
        let context_frames = 2;
        let original = batch(2, 7);

        // Replace every frame from the context cutoff on.
        let mut perturbed = original.clone();
        let head = original.frames.clone().narrow(1, 0, context_frames);
        let tail = original.frames.clone().narrow(1, context_frames, 7 - context_frames);
        perturbed.frames = Tensor::cat(vec![head, tail.neg().add_scalar(1.0)], 1);

        let run_fb = |b: &VideoBatch<Backend>| {
            x_pred(&adr_vp_feedback(nets.prediction(), &nets.l, inputs(b, false), &settings(context_frames)))
        };
        let run_ff = |b: &VideoBatch<Backend>| {
            x_pred(&adr_vp_feedback_frames(nets.prediction(), &nets.l, inputs(b, false), &settings(context_frames)))
        };
        let run_tf = |b: &VideoBatch<Backend>| {
            x_pred(&adr_vp_teacher_forcing(nets.prediction(), &nets.l, inputs(b, false), &settings(context_frames)))
        };

        assert!(max_abs_diff(run_fb(&original), run_fb(&perturbed)) < 1e-6);
        assert!(max_abs_diff(run_ff(&original), run_ff(&perturbed)) < 1e-6);
        // Teacher forcing keeps reading ground truth.
        assert!(max_abs_diff(run_tf(&original), run_tf(&perturbed)) > 0.0);
    }

    #[test]
    fn test_losses_are_finite() {
        let nets = Nets::build(true);
        let batch = batch(2, 5);

        let outputs = [
            adr_vp_teacher_forcing(nets.prediction(), &nets.l, inputs(&batch, true), &settings(2)),
            adr_vp_feedback(nets.prediction(), &nets.l, inputs(&batch, true), &settings(2)),
            adr_vp_feedback_frames(nets.prediction(), &nets.l, inputs(&batch, true), &settings(2)),
        ];
        for output in outputs {
            assert!(output.loss_value().is_finite());
            for (name, value) in output.metrics.to_scalars() {
                assert!(value.is_finite() && value >= 0.0, "{} = {}", name, value);
            }
            assert!(!output.metrics.contains("kl_loss"));
        }
    }
}
