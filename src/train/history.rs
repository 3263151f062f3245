use std::io::Write;
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::train::epoch_stats::EpochStats;

/// Per-epoch metrics of a run, one entry per completed epoch in each list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl History {
    pub fn new() -> History {
        History::default()
    }

    pub fn push(&mut self, stats: &EpochStats) {
        self.loss.push(stats.loss);
        self.accuracy.push(stats.accuracy);
        self.val_loss.push(stats.val_loss);
        self.val_accuracy.push(stats.val_accuracy);
    }

    /// Number of completed epochs.
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    /// 1-based epoch with the lowest validation loss.
    pub fn best_epoch(&self) -> Option<usize> {
        self.val_loss.iter()
            .enumerate()
            .filter(|(_, l)| !l.is_nan())
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i + 1)
    }

    /// Writes the history, as a pickled dict unless the extension is
    /// `.json`. Parent directories are created.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if is_json(path) {
            self.save_json(path)
        } else {
            self.save_pickle(path)
        }
    }

    /// Reads a history written by `save`, picking the format the same way.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<History> {
        let path = path.as_ref();
        if is_json(path) {
            History::load_json(path)
        } else {
            History::load_pickle(path)
        }
    }

    /// Writes the history as a pickled `{metric: [per-epoch values]}` dict.
    pub fn save_pickle<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = std::io::BufWriter::new(create_with_parents(path.as_ref())?);
        serde_pickle::to_writer(&mut writer, self, serde_pickle::SerOptions::new())?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_pickle<P: AsRef<Path>>(path: P) -> Result<History> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_pickle::from_reader(reader, serde_pickle::DeOptions::new())?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = std::io::BufWriter::new(create_with_parents(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<History> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

fn create_with_parents(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::File::create(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(epoch: usize, val_loss: f64) -> EpochStats {
        EpochStats {
            epoch,
            total_epochs: 3,
            loss: 1.0 / epoch as f64,
            accuracy: 0.5,
            val_loss,
            val_accuracy: 0.25,
            elapsed_ms: 10,
        }
    }

    #[test]
    fn saved_history_has_exactly_four_keys() {
        let mut history = History::new();
        history.push(&stats(1, 0.9));
        history.push(&stats(2, 0.7));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_history").join("history.json");
        history.save(&path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let mut keys: Vec<&String> = raw.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(keys, ["accuracy", "loss", "val_accuracy", "val_loss"]);
        assert_eq!(raw["val_loss"].as_array().unwrap().len(), 2);

        assert_eq!(History::load_json(&path).unwrap(), history);
    }

    #[test]
    fn best_epoch_tracks_lowest_val_loss() {
        let mut history = History::new();
        assert_eq!(history.best_epoch(), None);
        history.push(&stats(1, 0.9));
        history.push(&stats(2, 0.4));
        history.push(&stats(3, 0.6));
        assert_eq!(history.epochs(), 3);
        assert_eq!(history.best_epoch(), Some(2));
    }

    #[test]
    fn pickled_history_is_a_four_key_dict() {
        let mut history = History::new();
        history.push(&stats(1, 0.9));
        history.push(&stats(2, f64::NAN));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_history").join("history.pkl");
        history.save(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let dict: std::collections::BTreeMap<String, Vec<f64>> =
            serde_pickle::from_slice(&bytes, serde_pickle::DeOptions::new()).unwrap();
        assert_eq!(
            dict.keys().map(String::as_str).collect::<Vec<_>>(),
            ["accuracy", "loss", "val_accuracy", "val_loss"]
        );
        assert_eq!(dict["loss"], history.loss);
        assert!(dict["val_loss"][1].is_nan());

        let restored = History::load(&path).unwrap();
        assert_eq!(restored.accuracy, history.accuracy);
        assert_eq!(restored.epochs(), 2);
    }
}
