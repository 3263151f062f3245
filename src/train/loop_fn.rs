use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::data::Pipeline;
use crate::math::init::stream_seed;
use crate::network::Network;
use crate::optim::Adam;
use crate::train::early_stopping::EarlyStopping;
use crate::train::epoch_stats::EpochStats;
use crate::train::history::History;
use crate::train::train_config::TrainConfig;

/// Stream id of the dropout RNG, kept apart from the per-epoch data streams.
const DROPOUT_STREAM: u64 = u64::MAX;

/// Trains `network` for `config.epochs` epochs and returns the history.
///
/// Every epoch runs one pass over `train` (one optimizer step per batch)
/// followed by an inference-mode pass over `val`. Uses `config.epochs`,
/// `config.seed` and `config.early_stopping`.
pub fn fit(
    network: &mut Network,
    train: &Pipeline<'_>,
    val: &Pipeline<'_>,
    optimizer: &mut Adam,
    config: &TrainConfig,
) -> History {
    fit_with_callback(network, train, val, optimizer, config, |_| {})
}

/// Like `fit`, calling `on_epoch` after every completed epoch.
pub fn fit_with_callback<F>(
    network: &mut Network,
    train: &Pipeline<'_>,
    val: &Pipeline<'_>,
    optimizer: &mut Adam,
    config: &TrainConfig,
    mut on_epoch: F,
) -> History
where
    F: FnMut(&EpochStats),
{
    let mut history = History::new();
    let mut stopper = config.early_stopping.map(EarlyStopping::new);
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(stream_seed(seed, DROPOUT_STREAM)),
        None => StdRng::from_entropy(),
    };
    let num_batches = train.num_batches();

    for epoch in 0..config.epochs {
        let t_start = Instant::now();

        // ── Training pass ─────────────────────────────────────────────────
        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;
        for (i, batch) in train.epoch(epoch, config.seed).enumerate() {
            let step = network.train_step(&batch.images, &batch.labels, &mut rng);
            optimizer.step(network.parameters_mut(), &step.gradients);

            loss_sum += step.loss as f64 * batch.len() as f64;
            correct += step.correct;
            seen += batch.len();
            debug!(
                "epoch {} batch {}/{} - loss: {:.4} - grad norm: {:.4}",
                epoch + 1,
                i + 1,
                num_batches,
                step.loss,
                step.gradients.norm()
            );
        }

        // ── Validation pass ───────────────────────────────────────────────
        let mut val_loss_sum = 0.0f64;
        let mut val_correct = 0usize;
        let mut val_seen = 0usize;
        for batch in val.epoch(epoch, config.seed) {
            let (loss, correct) = network.evaluate(&batch.images, &batch.labels);
            val_loss_sum += loss as f64 * batch.len() as f64;
            val_correct += correct;
            val_seen += batch.len();
        }

        let seen = seen.max(1) as f64;
        let val_seen = val_seen.max(1) as f64;
        let stats = EpochStats {
            epoch: epoch + 1,
            total_epochs: config.epochs,
            loss: loss_sum / seen,
            accuracy: correct as f64 / seen,
            val_loss: val_loss_sum / val_seen,
            val_accuracy: val_correct as f64 / val_seen,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };

        info!(
            "Epoch {}/{} - {:.1}s - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
            stats.epoch,
            stats.total_epochs,
            stats.elapsed_ms as f64 / 1000.0,
            stats.loss,
            stats.accuracy,
            stats.val_loss,
            stats.val_accuracy
        );
        history.push(&stats);
        on_epoch(&stats);

        if let Some(ref mut stopper) = stopper {
            if stopper.should_stop(stats.val_loss) {
                info!(
                    "Early stopping after epoch {}: val_loss has not improved on {:.4}",
                    stats.epoch,
                    stopper.best()
                );
                break;
            }
        }
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AugmentationPolicy, ImageRecord};
    use crate::network::ModelConfig;
    use crate::optim::AdamConfig;
    use crate::train::train_config::EarlyStoppingConfig;
    use image::{Rgb, RgbImage};

    fn small_model() -> ModelConfig {
        ModelConfig {
            input_height: 12,
            input_width: 12,
            conv_filters: vec![4, 6],
            dense_units: 8,
            ..ModelConfig::default()
        }
    }

    fn records(n: usize) -> Vec<ImageRecord> {
        (0..n)
            .map(|i| {
                let label = i % 3;
                let image = RgbImage::from_fn(12, 12, |x, y| {
                    let mut px = [20u8, 20, 20];
                    px[label] = (120 + 10 * ((x + y + i as u32) % 8)) as u8;
                    Rgb(px)
                });
                ImageRecord { image, label }
            })
            .collect()
    }

    fn config(epochs: usize) -> TrainConfig {
        TrainConfig {
            epochs,
            batch_size: 4,
            shuffle_buffer: 8,
            seed: Some(17),
            model: small_model(),
            ..TrainConfig::default()
        }
    }

    fn run(config: &TrainConfig, data: &[ImageRecord]) -> (History, Vec<EpochStats>) {
        let policy = AugmentationPolicy::default();
        let train = Pipeline::training(data, &policy, config.batch_size, config.shuffle_buffer).unwrap();
        let val = Pipeline::validation(data, config.batch_size).unwrap();
        let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(0));
        let mut network = Network::new(config.model.clone(), &mut rng).unwrap();
        let mut optimizer = Adam::new(AdamConfig::default());
        let mut seen = Vec::new();
        let history = fit_with_callback(&mut network, &train, &val, &mut optimizer, config, |s| seen.push(s.clone()));
        assert_eq!(optimizer.iterations(), (history.epochs() * train.num_batches()) as u64);
        (history, seen)
    }

    #[test]
    fn history_has_one_entry_per_epoch() {
        let data = records(10);
        let (history, stats) = run(&config(3), &data);
        assert_eq!(history.epochs(), 3);
        assert_eq!(history.val_accuracy.len(), 3);
        assert_eq!(stats.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(history.loss.iter().chain(&history.val_loss).all(|l| l.is_finite() && *l > 0.0));
        assert!(history.accuracy.iter().chain(&history.val_accuracy).all(|a| (0.0..=1.0).contains(a)));
    }

    #[test]
    fn same_seed_same_metrics() {
        let data = records(8);
        let (a, _) = run(&config(1), &data);
        let (b, _) = run(&config(1), &data);
        assert_eq!(a.loss[0], b.loss[0]);
        assert_eq!(a, b);
    }

    #[test]
    fn early_stopping_cuts_the_run_short() {
        let data = records(6);
        let config = TrainConfig {
            early_stopping: Some(EarlyStoppingConfig { patience: 0, min_delta: f64::INFINITY }),
            ..config(5)
        };
        let (history, _) = run(&config, &data);
        assert_eq!(history.epochs(), 1);
    }
}
