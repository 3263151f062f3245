use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ferrite_cnn::train::{EarlyStoppingConfig, TrainConfig};

/// Train the three-class image classifier on TFRecord data.
///
/// Without flags, trains for 100 epochs on `data/tfrecords/{train,val}.tfrecord`
/// and writes `data/saved_model/model.json` and
/// `data/training_history/history.pkl`.
#[derive(Parser, Debug)]
#[command(name = "train-model", version, about)]
pub struct Cli {
    /// JSON training config used as the base for the flags below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Training record file
    #[arg(long)]
    pub train: Option<PathBuf>,

    /// Validation record file
    #[arg(long)]
    pub val: Option<PathBuf>,

    /// Where to write the trained model
    #[arg(long)]
    pub model_out: Option<PathBuf>,

    /// Where to write the metric history
    #[arg(long)]
    pub history_out: Option<PathBuf>,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Shuffle buffer size, in batches
    #[arg(long)]
    pub shuffle_buffer: Option<usize>,

    /// Seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Enable early stopping on val_loss with this patience
    #[arg(long)]
    pub early_stopping_patience: Option<usize>,

    /// Worker threads (default: one per core)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Write the effective config to this file before training
    #[arg(long)]
    pub dump_config: Option<PathBuf>,
}

impl Cli {
    /// Resolves the effective training config: file first, then flags.
    pub fn train_config(&self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::load_json(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => TrainConfig::default(),
        };

        if let Some(path) = &self.train {
            config.train_records = path.clone();
        }
        if let Some(path) = &self.val {
            config.val_records = path.clone();
        }
        if let Some(path) = &self.model_out {
            config.model_path = path.clone();
        }
        if let Some(path) = &self.history_out {
            config.history_path = path.clone();
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(shuffle_buffer) = self.shuffle_buffer {
            config.shuffle_buffer = shuffle_buffer;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(patience) = self.early_stopping_patience {
            let base = config.early_stopping.unwrap_or_default();
            config.early_stopping = Some(EarlyStoppingConfig { patience, ..base });
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }

        Ok(config)
    }
}
