use std::path::PathBuf;

/// Everything that can go wrong while loading data, building a network or
/// persisting training results.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pickle error: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("corrupt record at byte {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: &'static str },

    #[error("feature '{key}': {reason}")]
    Feature { key: String, reason: String },

    #[error("label {label} out of range for {num_classes} classes")]
    InvalidLabel { label: i64, num_classes: usize },

    #[error("expected image of shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("dataset '{}' contains no records", .0.display())]
    EmptyDataset(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
