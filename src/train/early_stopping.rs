use crate::train::train_config::EarlyStoppingConfig;

/// Tracks the best validation loss seen so far.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    config: EarlyStoppingConfig,
    best: f64,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(config: EarlyStoppingConfig) -> EarlyStopping {
        EarlyStopping { config, best: f64::INFINITY, wait: 0 }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// Records one epoch's `val_loss`; returns `true` when training should stop.
    pub fn should_stop(&mut self, val_loss: f64) -> bool {
        if val_loss < self.best - self.config.min_delta {
            self.best = val_loss;
            self.wait = 0;
            return false;
        }
        self.wait += 1;
        self.wait >= self.config.patience
    }
}
