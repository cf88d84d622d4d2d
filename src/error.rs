use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MfsError {
    #[error("Manual override file {path} could not be used: {details}")]
    ManualOverride { path: PathBuf, details: String },

    #[error("Required column missing: {0}")]
    MissingColumn(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Seasonal decomposition failed: {0}")]
    Decomposition(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MfsError>;
