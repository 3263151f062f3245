use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::data::{load_dataset, Pipeline};
use crate::device::configure_devices;
use crate::error::Result;
use crate::network::Network;
use crate::optim::Adam;
use crate::train::history::History;
use crate::train::loop_fn::fit;
use crate::train::train_config::TrainConfig;

/// Runs a whole training job: device setup, data loading, pipeline and
/// model construction, fitting, then saving the model and its history.
pub fn run_training(config: &TrainConfig) -> Result<History> {
    config.validate()?;

    info!("Configuring devices");
    configure_devices(config.threads);

    info!("Loading datasets");
    let train_records = load_dataset(&config.train_records, &config.records, &config.model)?;
    let val_records = load_dataset(&config.val_records, &config.records, &config.model)?;

    info!("Building pipelines");
    let train = Pipeline::training(&train_records, &config.augmentation, config.batch_size, config.shuffle_buffer)?;
    let val = Pipeline::validation(&val_records, config.batch_size)?;
    info!(
        "{} training samples in {} batches, {} validation samples in {} batches",
        train.len(),
        train.num_batches(),
        val.len(),
        val.num_batches()
    );

    info!("Building model");
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut network = Network::new(config.model.clone(), &mut rng)?;
    network.metadata.description = Some(format!(
        "{}-class image classifier, {} conv blocks",
        config.model.num_classes,
        config.model.conv_filters.len()
    ));
    let mut optimizer = Adam::new(config.optimizer);

    info!("Training for up to {} epochs", config.epochs);
    let history = fit(&mut network, &train, &val, &mut optimizer, config);
    network.metadata.epochs_trained = Some(history.epochs());

    network.save_json(&config.model_path)?;
    info!("Model saved to {}", config.model_path.display());
    history.save(&config.history_path)?;
    info!("History saved to {}", config.history_path.display());
    if let Some(best) = history.best_epoch() {
        info!("Lowest val_loss {:.4} at epoch {}", history.val_loss[best - 1], best);
    }

    Ok(history)
}
