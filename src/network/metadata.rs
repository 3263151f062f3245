use serde::{Deserialize, Serialize};

/// The kind of input a saved model expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputType {
    /// HWC RGB image scaled to `[0, 1]`.
    ImageRgb { width: u32, height: u32 },
}

/// Annotations saved next to the weights. Every field is optional so
/// hand-edited or older model files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_type: Option<InputType>,
    /// Class names, indexed like the softmax output.
    #[serde(default)]
    pub output_labels: Option<Vec<String>>,
    #[serde(default)]
    pub epochs_trained: Option<usize>,
}
