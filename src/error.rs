use burn::{config::ConfigError, record::RecorderError};
use thiserror::Error;

/// Errors returned while training, checkpointing or sampling a GAN.
#[derive(Error, Debug)]
pub enum GanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0:?}")]
    Config(ConfigError),

    #[error("Record error: {0:?}")]
    Record(RecorderError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tensor data error: {0}")]
    Data(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No checkpoint found for epoch {0}")]
    MissingCheckpoint(usize),
}

impl From<ConfigError> for GanError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<RecorderError> for GanError {
    fn from(err: RecorderError) -> Self {
        Self::Record(err)
    }
}

pub type Result<T> = std::result::Result<T, GanError>;
