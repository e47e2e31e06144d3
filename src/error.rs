// src/error.rs

use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Every fatal condition an ingestion run can hit.
///
/// Per-field decode problems are not represented here: they become
/// `Value::Missing` in the data and never abort a batch.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("column mismatch appending to `{dataset}`: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        dataset: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("invalid dataset name: {0:?}")]
    InvalidDataset(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("ingestion cancelled after {records} records")]
    Cancelled { records: u64 },
}

impl IngestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ArrowError> for IngestError {
    fn from(e: ArrowError) -> Self {
        IngestError::Storage(e.to_string())
    }
}

impl From<ParquetError> for IngestError {
    fn from(e: ParquetError) -> Self {
        IngestError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Storage(format!("column metadata: {}", e))
    }
}
