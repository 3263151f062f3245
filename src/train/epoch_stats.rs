use serde::{Serialize, Deserialize};

/// Metrics of one completed epoch, handed to the `fit` callback and folded
/// into the `History`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Sample-weighted mean of the training batch losses (L2 included).
    pub loss: f64,
    /// Fraction of training samples classified correctly, dropout active.
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Wall-clock duration of the epoch, validation included.
    pub elapsed_ms: u64,
}
