use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// A fully serializable description of the classifier topology:
///
/// ```text
/// input → [conv(f) → maxpool] for f in conv_filters → flatten
///       → dense(dense_units, ReLU, L2) → dropout → batch-norm
///       → dense(dense_units, ReLU, L2) → dense(num_classes, Softmax)
/// ```
///
/// The defaults describe the 256×256×3, three-class network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub input_height: usize,
    pub input_width: usize,
    pub channels: usize,
    /// Filter count of each convolution block, input → output.
    pub conv_filters: Vec<usize>,
    pub kernel_size: usize,
    pub pool_size: usize,
    pub dense_units: usize,
    pub dropout: f32,
    /// L2 factor applied to both hidden dense kernels.
    pub l2: f32,
    pub batch_norm_momentum: f32,
    pub batch_norm_epsilon: f32,
    pub num_classes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            input_height: 256,
            input_width: 256,
            channels: 3,
            conv_filters: vec![32, 64, 128, 256, 256],
            kernel_size: 3,
            pool_size: 2,
            dense_units: 512,
            dropout: 0.5,
            l2: 0.001,
            batch_norm_momentum: 0.99,
            batch_norm_epsilon: 1e-3,
            num_classes: 3,
        }
    }
}

impl ModelConfig {
    pub fn input_shape(&self) -> (usize, usize, usize) {
        (self.input_height, self.input_width, self.channels)
    }

    /// Shape of the last pooled feature map, or `None` if a block would
    /// shrink the spatial size to nothing.
    pub fn feature_shape(&self) -> Option<(usize, usize, usize)> {
        let (mut h, mut w) = (self.input_height, self.input_width);
        for _ in &self.conv_filters {
            if h < self.kernel_size || w < self.kernel_size {
                return None;
            }
            h = (h - self.kernel_size + 1) / self.pool_size;
            w = (w - self.kernel_size + 1) / self.pool_size;
            if h == 0 || w == 0 {
                return None;
            }
        }
        let c = self.conv_filters.last().copied().unwrap_or(self.channels);
        Some((h, w, c))
    }

    /// Length of the flattened feature vector fed to the first dense layer.
    pub fn feature_size(&self) -> usize {
        self.feature_shape().map(|(h, w, c)| h * w * c).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("input_height", self.input_height),
            ("input_width", self.input_width),
            ("channels", self.channels),
            ("kernel_size", self.kernel_size),
            ("pool_size", self.pool_size),
            ("dense_units", self.dense_units),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if self.num_classes < 2 {
            return Err(Error::InvalidConfig("num_classes must be at least 2".into()));
        }
        if self.conv_filters.iter().any(|&f| f == 0) {
            return Err(Error::InvalidConfig("conv_filters must all be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!("dropout {} not in [0, 1)", self.dropout)));
        }
        if self.l2 < 0.0 {
            return Err(Error::InvalidConfig("l2 must not be negative".into()));
        }
        if self.feature_shape().is_none() {
            return Err(Error::InvalidConfig(format!(
                "{}x{} input vanishes after {} conv/pool blocks",
                self.input_height,
                self.input_width,
                self.conv_filters.len()
            )));
        }
        Ok(())
    }

    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `ModelConfig` from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<ModelConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
