pub mod early_stopping;
pub mod epoch_stats;
pub mod history;
pub mod loop_fn;
pub mod train_config;
pub mod trainer;

pub use early_stopping::EarlyStopping;
pub use epoch_stats::EpochStats;
pub use history::History;
pub use loop_fn::{fit, fit_with_callback};
pub use train_config::{EarlyStoppingConfig, TrainConfig};
pub use trainer::run_training;
