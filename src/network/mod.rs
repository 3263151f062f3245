pub mod gradients;
pub mod metadata;
pub mod network;
pub mod spec;

pub use gradients::Gradients;
pub use metadata::{InputType, ModelMetadata};
pub use network::{ConvBlock, Network, StepOutput};
pub use spec::ModelConfig;
