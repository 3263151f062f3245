pub mod augment;
pub mod dataset;
pub mod example;
pub mod pipeline;
pub mod record;

pub use augment::{Augment, AugmentationPolicy, FillMode, TransformParams};
pub use dataset::{load_dataset, ImageRecord, RecordConfig};
pub use example::Example;
pub use pipeline::{Batch, Pipeline, ShuffleBuffer};
pub use record::{RecordReader, RecordWriter};
