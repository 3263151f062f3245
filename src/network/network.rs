use std::path::Path;

use rand::Rng;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::{BatchNorm, Conv2d, ConvGradients, Dense, Dropout, MaxPool2d};
use crate::loss::SparseCrossEntropy;
use crate::math::{Matrix, Tensor3};
use crate::network::gradients::{accumulate, Gradients};
use crate::network::metadata::{InputType, ModelMetadata};
use crate::network::spec::ModelConfig;

/// One convolution followed by its pooling layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvBlock {
    pub conv: Conv2d,
    pub pool: MaxPool2d,
}

/// Intermediate values of one block kept for the backward pass.
struct BlockTrace {
    input: Tensor3,
    activated: Tensor3,
    switches: Vec<usize>,
}

/// Result of one optimisation step on a mini-batch.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Mean cross-entropy over the batch plus the L2 penalty.
    pub loss: f32,
    /// Samples whose argmax matched the label (dropout active).
    pub correct: usize,
    pub gradients: Gradients,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub config: ModelConfig,
    #[serde(default)]
    pub metadata: ModelMetadata,
    pub blocks: Vec<ConvBlock>,
    pub hidden: Dense,
    pub dropout: Dropout,
    pub norm: BatchNorm,
    pub projection: Dense,
    pub output: Dense,
}

impl Network {
    /// Builds a freshly initialised network for `config`.
    pub fn new<R: Rng + ?Sized>(config: ModelConfig, rng: &mut R) -> Result<Network> {
        config.validate()?;

        let mut blocks = Vec::with_capacity(config.conv_filters.len());
        let mut in_channels = config.channels;
        for &filters in &config.conv_filters {
            blocks.push(ConvBlock {
                conv: Conv2d::new(in_channels, filters, config.kernel_size, ActivationFunction::ReLU, rng),
                pool: MaxPool2d::new(config.pool_size),
            });
            in_channels = filters;
        }

        let units = config.dense_units;
        let hidden = Dense::new(units, config.feature_size(), ActivationFunction::ReLU, config.l2, rng);
        let projection = Dense::new(units, units, ActivationFunction::ReLU, config.l2, rng);
        let output = Dense::new(config.num_classes, units, ActivationFunction::Softmax, 0.0, rng);

        let metadata = ModelMetadata {
            description: None,
            input_type: Some(InputType::ImageRgb {
                width: config.input_width as u32,
                height: config.input_height as u32,
            }),
            output_labels: Some((0..config.num_classes).map(|c| c.to_string()).collect()),
            epochs_trained: None,
        };

        Ok(Network {
            dropout: Dropout::new(config.dropout),
            norm: BatchNorm::new(units, config.batch_norm_momentum, config.batch_norm_epsilon),
            config,
            metadata,
            blocks,
            hidden,
            projection,
            output,
        })
    }

    // -----------------------------------------------------------------------
    // Inference
    // -----------------------------------------------------------------------

    /// Runs the convolution stack and flattens the last feature map.
    pub fn features(&self, image: &Tensor3) -> Vec<f32> {
        let mut x = image.clone();
        for block in &self.blocks {
            let activated = block.conv.forward(&x);
            x = block.pool.forward(&activated).0;
        }
        x.into_vec()
    }

    /// Dense head in inference mode: dropout off, moving BN statistics.
    fn head_inference(&self, features: &Matrix) -> Matrix {
        let h = self.hidden.forward(features);
        let h = self.norm.forward_inference(&h);
        let h = self.projection.forward(&h);
        self.output.forward(&h)
    }

    /// Class probabilities for a batch of images, one row per image.
    pub fn probabilities(&self, images: &[Tensor3]) -> Matrix {
        let features: Vec<Vec<f32>> = images.par_iter().map(|img| self.features(img)).collect();
        self.head_inference(&Matrix::from_rows(&features))
    }

    /// Class probabilities for a single image (inference mode).
    /// Panics if the image does not have the configured shape; see `predict`.
    pub fn forward(&self, image: &Tensor3) -> Vec<f32> {
        let features = Matrix::from_vec(1, self.config.feature_size(), self.features(image));
        self.head_inference(&features).data
    }

    /// Like `forward`, but checks the image shape first.
    pub fn predict(&self, image: &Tensor3) -> Result<Vec<f32>> {
        let expected = self.config.input_shape();
        if image.shape() != expected {
            return Err(Error::ShapeMismatch { expected, actual: image.shape() });
        }
        Ok(self.forward(image))
    }

    /// Loss (with L2 penalty) and correct count of a batch in inference mode.
    pub fn evaluate(&self, images: &[Tensor3], labels: &[usize]) -> (f32, usize) {
        let probs = self.probabilities(images);
        let loss = SparseCrossEntropy::loss(&probs, labels) + self.penalty();
        (loss, SparseCrossEntropy::correct(&probs, labels))
    }

    /// Sum of the L2 terms of the regularised dense layers.
    pub fn penalty(&self) -> f32 {
        self.hidden.penalty() + self.projection.penalty() + self.output.penalty()
    }

    // -----------------------------------------------------------------------
    // Training
    // -----------------------------------------------------------------------

    /// Forward and backward pass over one mini-batch in training mode.
    ///
    /// Updates the batch-norm moving statistics but not the weights; hand
    /// `StepOutput::gradients` to the optimizer for that.
    ///
    /// Convolution activations are not kept for the whole batch: the stack is
    /// run once to produce the dense-head inputs and run again per sample,
    /// with its trace, during the backward pass.
    pub fn train_step<R: Rng + ?Sized>(
        &mut self,
        images: &[Tensor3],
        labels: &[usize],
        rng: &mut R,
    ) -> StepOutput {
        assert_eq!(images.len(), labels.len(), "one label per image");
        assert!(!images.is_empty(), "empty batch");

        let features: Vec<Vec<f32>> = images.par_iter().map(|img| self.features(img)).collect();
        let x = Matrix::from_rows(&features);

        // ── Dense head, training mode ─────────────────────────────────────
        let h1 = self.hidden.forward(&x);
        let (d1, mask) = self.dropout.forward_train(&h1, rng);
        let (n1, bn_cache) = self.norm.forward_train(&d1);
        let h2 = self.projection.forward(&n1);
        let probs = self.output.forward(&h2);

        let loss = SparseCrossEntropy::loss(&probs, labels) + self.penalty();
        let correct = SparseCrossEntropy::correct(&probs, labels);

        // ── Backward through the head ─────────────────────────────────────
        let delta = SparseCrossEntropy::derivative(&probs, labels);
        let (g_h2, output_grads) = self.output.backward(&h2, &probs, delta);
        let (g_n1, projection_grads) = self.projection.backward(&n1, &h2, g_h2);
        let (g_d1, norm_grads) = self.norm.backward(&bn_cache, &g_n1);
        let g_h1 = self.dropout.backward(&mask, g_d1);
        let (g_x, hidden_grads) = self.hidden.backward(&x, &h1, g_h1);

        // ── Backward through the convolution stack ────────────────────────
        let conv_grads = self.conv_gradients(images, &g_x);

        let mut slots = Vec::with_capacity(2 * self.blocks.len() + 8);
        for g in conv_grads {
            slots.push(g.weights);
            slots.push(g.biases);
        }
        slots.push(hidden_grads.weights.data);
        slots.push(hidden_grads.biases);
        slots.push(norm_grads.gamma);
        slots.push(norm_grads.beta);
        slots.push(projection_grads.weights.data);
        slots.push(projection_grads.biases);
        slots.push(output_grads.weights.data);
        slots.push(output_grads.biases);

        StepOutput { loss, correct, gradients: Gradients { slots } }
    }

    /// Every trainable parameter tensor, in the order `train_step` emits
    /// gradient slots.
    pub fn parameters_mut(&mut self) -> Vec<&mut [f32]> {
        let mut params: Vec<&mut [f32]> = Vec::with_capacity(2 * self.blocks.len() + 8);
        for block in &mut self.blocks {
            params.push(block.conv.weights.as_mut_slice());
            params.push(block.conv.biases.as_mut_slice());
        }
        params.push(self.hidden.weights.data.as_mut_slice());
        params.push(self.hidden.biases.as_mut_slice());
        params.push(self.norm.gamma.as_mut_slice());
        params.push(self.norm.beta.as_mut_slice());
        params.push(self.projection.weights.data.as_mut_slice());
        params.push(self.projection.biases.as_mut_slice());
        params.push(self.output.weights.data.as_mut_slice());
        params.push(self.output.biases.as_mut_slice());
        params
    }

    fn trace_features(&self, image: &Tensor3) -> Vec<BlockTrace> {
        let mut traces = Vec::with_capacity(self.blocks.len());
        let mut x = image.clone();
        for block in &self.blocks {
            let activated = block.conv.forward(&x);
            let (pooled, switches) = block.pool.forward(&activated);
            traces.push(BlockTrace { input: x, activated, switches });
            x = pooled;
        }
        traces
    }

    /// Backpropagates ∂L/∂features of one sample through the conv stack.
    fn backward_features(&self, traces: &[BlockTrace], grad_features: Vec<f32>) -> Vec<ConvGradients> {
        let (h, w, c) = self.config.feature_shape().unwrap_or((0, 0, 0));
        let mut grad = Tensor3::from_vec(h, w, c, grad_features);
        let mut grads = Vec::with_capacity(self.blocks.len());

        for (i, (block, trace)) in self.blocks.iter().zip(traces).enumerate().rev() {
            let grad_activated = block.pool.backward(trace.activated.shape(), &trace.switches, &grad);
            let (grad_input, block_grads) =
                block.conv.backward(&trace.input, &trace.activated, grad_activated, i > 0);
            grads.push(block_grads);
            if let Some(g) = grad_input {
                grad = g;
            }
        }

        grads.reverse();
        grads
    }

    /// Sums per-sample conv gradients. Samples are processed in parallel in
    /// chunks of the pool size and reduced in sample order, so the result
    /// does not depend on thread scheduling.
    fn conv_gradients(&self, images: &[Tensor3], grad_features: &Matrix) -> Vec<ConvGradients> {
        let mut total: Vec<ConvGradients> = self.blocks.iter()
            .map(|b| ConvGradients {
                weights: vec![0.0; b.conv.weights.len()],
                biases: vec![0.0; b.conv.biases.len()],
            })
            .collect();

        let chunk = rayon::current_num_threads().max(1);
        for start in (0..images.len()).step_by(chunk) {
            let end = (start + chunk).min(images.len());
            let per_sample: Vec<Vec<ConvGradients>> = (start..end)
                .into_par_iter()
                .map(|r| {
                    let traces = self.trace_features(&images[r]);
                    self.backward_features(&traces, grad_features.row(r).to_vec())
                })
                .collect();

            for sample in per_sample {
                for (acc, g) in total.iter_mut().zip(sample) {
                    accumulate(&mut acc.weights, &g.weights);
                    accumulate(&mut acc.biases, &g.biases);
                }
            }
        }

        total
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serializes the network (config, metadata, weights and moving
    /// statistics) to a JSON file, creating parent directories.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Deserializes a network previously written by `save_json` and checks
    /// that its layers agree with its config.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Network> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let network: Network = serde_json::from_reader(reader)?;
        network.check_consistency()?;
        Ok(network)
    }

    fn check_consistency(&self) -> Result<()> {
        self.config.validate()?;
        let c = &self.config;
        let mismatch = |what: &str| Err(Error::InvalidConfig(format!("saved model: {} does not match config", what)));

        if self.blocks.len() != c.conv_filters.len() {
            return mismatch("number of conv blocks");
        }
        let mut in_channels = c.channels;
        for (block, &filters) in self.blocks.iter().zip(&c.conv_filters) {
            let conv = &block.conv;
            if conv.in_channels != in_channels
                || conv.filters != filters
                || conv.kernel_size != c.kernel_size
                || conv.weights.len() != c.kernel_size * c.kernel_size * in_channels * filters
                || conv.biases.len() != filters
            {
                return mismatch("conv block shape");
            }
            in_channels = filters;
        }
        let dense_ok = |d: &Dense, inputs: usize, units: usize| {
            d.weights.rows == inputs
                && d.weights.cols == units
                && d.weights.data.len() == inputs * units
                && d.biases.len() == units
        };
        if !dense_ok(&self.hidden, c.feature_size(), c.dense_units)
            || !dense_ok(&self.projection, c.dense_units, c.dense_units)
            || !dense_ok(&self.output, c.dense_units, c.num_classes)
        {
            return mismatch("dense layer shape");
        }
        if self.hidden.activator != ActivationFunction::ReLU
            || self.projection.activator != ActivationFunction::ReLU
            || self.output.activator != ActivationFunction::Softmax
        {
            return mismatch("dense activation");
        }
        let norm = &self.norm;
        if norm.features != c.dense_units
            || [&norm.gamma, &norm.beta, &norm.moving_mean, &norm.moving_variance]
                .iter()
                .any(|v| v.len() != c.dense_units)
        {
            return mismatch("batch-norm size");
        }
        if !(0.0..1.0).contains(&self.dropout.rate) {
            return mismatch("dropout rate");
        }
        if self.blocks.iter().any(|b| b.pool.pool_size != c.pool_size || b.conv.activator != ActivationFunction::ReLU) {
            return mismatch("conv block layers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn small_config() -> ModelConfig {
        ModelConfig {
            input_height: 12,
            input_width: 12,
            conv_filters: vec![4, 6],
            dense_units: 8,
            ..ModelConfig::default()
        }
    }

    fn image(seed: u64, config: &ModelConfig) -> Tensor3 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (h, w, c) = config.input_shape();
        Tensor3::from_vec(h, w, c, (0..h * w * c).map(|_| rng.gen::<f32>()).collect())
    }

    #[test]
    fn small_network_outputs_a_distribution() {
        let config = small_config();
        let mut rng = StdRng::seed_from_u64(0);
        let network = Network::new(config.clone(), &mut rng).unwrap();

        assert_eq!(config.feature_shape(), Some((1, 1, 6)));
        let probs = network.predict(&image(1, &config)).unwrap();
        assert_eq!(probs.len(), 3);
        assert_abs_diff_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn predict_rejects_wrong_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let network = Network::new(small_config(), &mut rng).unwrap();
        let err = network.predict(&Tensor3::zeros(10, 12, 3)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn gradient_slots_line_up_with_parameters() {
        let config = small_config();
        let mut rng = StdRng::seed_from_u64(2);
        let mut network = Network::new(config.clone(), &mut rng).unwrap();
        let images: Vec<Tensor3> = (0..4).map(|s| image(s, &config)).collect();

        let step = network.train_step(&images, &[0, 1, 2, 0], &mut rng);
        assert!(step.loss.is_finite() && step.loss > 0.0);
        assert!(step.correct <= 4);

        let lens: Vec<usize> = network.parameters_mut().iter().map(|p| p.len()).collect();
        let slot_lens: Vec<usize> = step.gradients.slots.iter().map(|s| s.len()).collect();
        assert_eq!(lens, slot_lens);
        assert!(step.gradients.norm() > 0.0);
    }

    #[test]
    fn train_step_gradients_match_finite_differences() {
        let config = ModelConfig { dropout: 0.0, ..small_config() };
        let mut rng = StdRng::seed_from_u64(21);
        let network = Network::new(config.clone(), &mut rng).unwrap();
        let images: Vec<Tensor3> = (0..4).map(|s| image(10 + s, &config)).collect();
        let labels = [0, 1, 2, 1];

        let analytic = network.clone().train_step(&images, &labels, &mut rng).gradients;
        let loss_with = |slot: usize, idx: usize, delta: f32| {
            let mut shifted = network.clone();
            shifted.parameters_mut()[slot][idx] += delta;
            shifted.train_step(&images, &labels, &mut StdRng::seed_from_u64(0)).loss
        };

        // Small eps keeps most samples clear of ReLU and max-pool kinks;
        // a couple of kink hits are tolerated.
        let eps = 2e-3;
        let mut checked = 0;
        let mut mismatches = Vec::new();
        for (slot, grads) in analytic.slots.iter().enumerate() {
            let n = grads.len();
            for idx in [0, n / 3, n / 2, n - 1] {
                let numeric = (loss_with(slot, idx, eps) - loss_with(slot, idx, -eps)) / (2.0 * eps);
                checked += 1;
                if (grads[idx] - numeric).abs() > 1e-2 + 0.05 * numeric.abs() {
                    mismatches.push((slot, idx, grads[idx], numeric));
                }
            }
        }
        assert_eq!(checked, 4 * (2 * config.conv_filters.len() + 8));
        assert!(mismatches.len() <= 2, "gradient mismatches: {:?}", mismatches);
    }

    #[test]
    fn training_loss_includes_l2_penalty() {
        let config = ModelConfig { dropout: 0.0, ..small_config() };
        let mut rng = StdRng::seed_from_u64(9);
        let network = Network::new(config.clone(), &mut rng).unwrap();
        let images: Vec<Tensor3> = (0..3).map(|s| image(s, &config)).collect();
        let labels = [2, 0, 1];

        let mut with_l2 = network.clone();
        let mut without_l2 = network.clone();
        without_l2.hidden.l2 = 0.0;
        without_l2.projection.l2 = 0.0;

        let a = with_l2.train_step(&images, &labels, &mut StdRng::seed_from_u64(1)).loss;
        let b = without_l2.train_step(&images, &labels, &mut StdRng::seed_from_u64(1)).loss;
        assert_abs_diff_eq!(a - b, network.penalty(), epsilon = 1e-4);
    }

    #[test]
    fn save_and_load_preserve_predictions() {
        let config = small_config();
        let mut rng = StdRng::seed_from_u64(4);
        let mut network = Network::new(config.clone(), &mut rng).unwrap();
        let images: Vec<Tensor3> = (0..2).map(|s| image(s, &config)).collect();
        network.train_step(&images, &[1, 2], &mut rng);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        network.save_json(&path).unwrap();
        let restored = Network::load_json(&path).unwrap();

        assert_eq!(restored.forward(&images[0]), network.forward(&images[0]));
        assert_eq!(restored.norm.moving_mean, network.norm.moving_mean);
        assert_eq!(restored.metadata, network.metadata);
    }

    #[test]
    fn load_rejects_short_batch_norm_vectors() {
        let mut rng = StdRng::seed_from_u64(4);
        let network = Network::new(small_config(), &mut rng).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let corruptions: [fn(&mut Network); 5] = [
            |n| { n.norm.beta.pop(); },
            |n| { n.norm.moving_variance.pop(); },
            |n| { n.norm.moving_mean.push(0.0); },
            |n| n.norm.features += 1,
            |n| n.dropout.rate = 1.0,
        ];
        for (i, corrupt) in corruptions.iter().enumerate() {
            let mut broken = network.clone();
            corrupt(&mut broken);
            let path = dir.path().join(format!("broken_{}.json", i));
            broken.save_json(&path).unwrap();
            assert!(
                matches!(Network::load_json(&path), Err(Error::InvalidConfig(_))),
                "corruption {} loaded",
                i
            );
        }
    }

    #[test]
    fn load_rejects_layers_that_disagree_with_config() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut network = Network::new(small_config(), &mut rng).unwrap();
        network.config.dense_units = 9;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        network.save_json(&path).unwrap();
        assert!(matches!(Network::load_json(&path), Err(Error::InvalidConfig(_))));
    }
}
