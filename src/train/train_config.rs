use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::data::{AugmentationPolicy, RecordConfig};
use crate::error::{Error, Result};
use crate::network::ModelConfig;
use crate::optim::AdamConfig;

/// Stops training once `val_loss` has not improved by more than
/// `min_delta` for `patience` consecutive epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    pub patience: usize,
    pub min_delta: f64,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        EarlyStoppingConfig { patience: 10, min_delta: 0.0 }
    }
}

/// Everything a training run needs: input/output paths, loop settings and
/// the configs of each stage.
///
/// The defaults train the three-class 256×256 classifier for 100 epochs on
/// `data/tfrecords/{train,val}.tfrecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub train_records: PathBuf,
    pub val_records: PathBuf,
    pub model_path: PathBuf,
    pub history_path: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    /// Number of batches held by the shuffle buffer.
    pub shuffle_buffer: usize,
    /// Makes initialisation, augmentation, shuffling and dropout reproducible.
    pub seed: Option<u64>,
    /// Off unless set.
    pub early_stopping: Option<EarlyStoppingConfig>,
    /// Worker threads; one per available core when unset.
    pub threads: Option<usize>,
    pub augmentation: AugmentationPolicy,
    pub model: ModelConfig,
    pub optimizer: AdamConfig,
    pub records: RecordConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            train_records: PathBuf::from("data/tfrecords/train.tfrecord"),
            val_records: PathBuf::from("data/tfrecords/val.tfrecord"),
            model_path: PathBuf::from("data/saved_model/model.json"),
            history_path: PathBuf::from("data/training_history/history.pkl"),
            epochs: 100,
            batch_size: 32,
            shuffle_buffer: 1000,
            seed: None,
            early_stopping: None,
            threads: None,
            augmentation: AugmentationPolicy::default(),
            model: ModelConfig::default(),
            optimizer: AdamConfig::default(),
            records: RecordConfig::default(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.shuffle_buffer == 0 {
            return Err(Error::InvalidConfig("shuffle_buffer must be at least 1".into()));
        }
        if self.threads == Some(0) {
            return Err(Error::InvalidConfig("threads must be at least 1".into()));
        }
        self.model.validate()
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<TrainConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
