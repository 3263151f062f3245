pub mod batch_norm;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod pool;

pub use batch_norm::{BatchNorm, BatchNormCache, BatchNormGradients};
pub use conv2d::{Conv2d, ConvGradients};
pub use dense::{Dense, DenseGradients};
pub use dropout::Dropout;
pub use pool::MaxPool2d;
