pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod loss;
pub mod optim;
pub mod network;
pub mod data;
pub mod device;
pub mod train;

// Convenience re-exports
pub use error::{Error, Result};
pub use math::{Matrix, Tensor3};
pub use activation::ActivationFunction;
pub use network::{ModelConfig, Network};
pub use optim::{Adam, AdamConfig};
pub use data::{AugmentationPolicy, Batch, ImageRecord, Pipeline};
pub use device::{configure_devices, DeviceInfo};
pub use train::{fit, run_training, History, TrainConfig};
