use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Crop(#[from] CropError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Keypoint(#[from] KeypointError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Region detector cannot process a {width}x{height} image")]
    UnsupportedImage { width: u32, height: u32 },

    #[error("Invalid bounding box ({x1}, {y1}, {x2}, {y2})")]
    InvalidBox { x1: i32, y1: i32, x2: i32, y2: i32 },

    #[error("Invalid layout template for '{label}': {reason}")]
    InvalidTemplate { label: String, reason: String },

    #[error("Region detection failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CropError {
    #[error("Region '{label}' has zero area after clamping to a {width}x{height} image")]
    EmptyCrop { label: String, width: u32, height: u32 },
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Cannot embed a degenerate {width}x{height} crop")]
    DegenerateInput { width: u32, height: u32 },

    #[error("Embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Embedding weights not found at path: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("Failed to load embedding model: {reason}")]
    ModelLoadFailed { reason: String },

    #[error("Embedding inference failed: {reason}")]
    InferenceFailed { reason: String },
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        EmbeddingError::InferenceFailed {
            reason: err.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeypointError {
    #[error("Cannot extract keypoints from an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VerifyError>;
