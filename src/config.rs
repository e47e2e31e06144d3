// src/config.rs

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::decode::missing::DEFAULT_TOKENS;
use crate::decode::MissingTokens;
use crate::error::{IngestError, Result};
use crate::ingest::{IngestOptions, DEFAULT_BATCH_SIZE, DEFAULT_DATASET};
use crate::sink::validate_dataset_name;

/// Everything one ingestion run needs. Paths have no defaults; the rest
/// falls back to the layout's usual conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// SAS program holding the INPUT statement.
    pub layout_path: PathBuf,
    /// Fixed-width data file.
    pub source_path: PathBuf,
    /// Root directory of the dataset store.
    pub output_dir: PathBuf,
    pub dataset: String,
    pub batch_size: usize,
    pub missing_tokens: Vec<String>,
    pub blank_is_missing: bool,
    pub limit: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            layout_path: PathBuf::new(),
            source_path: PathBuf::new(),
            output_dir: PathBuf::new(),
            dataset: DEFAULT_DATASET.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            missing_tokens: DEFAULT_TOKENS.iter().map(|t| t.to_string()).collect(),
            blank_is_missing: false,
            limit: None,
        }
    }
}

impl IngestConfig {
    /// Read a JSON config file. Unset fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| IngestError::Config(format!("parsing {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("layout_path", &self.layout_path),
            ("source_path", &self.source_path),
            ("output_dir", &self.output_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(IngestError::Config(format!("`{}` is not set", name)));
            }
        }
        if self.batch_size == 0 {
            return Err(IngestError::Config("`batch_size` must be at least 1".into()));
        }
        validate_dataset_name(&self.dataset)
    }

    pub fn missing_tokens(&self) -> MissingTokens {
        let tokens = MissingTokens::new(&self.missing_tokens);
        let blank = tokens.blank_is_missing() || self.blank_is_missing;
        tokens.with_blank_is_missing(blank)
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            dataset: self.dataset.clone(),
            batch_size: self.batch_size,
            limit: self.limit,
            cancel: None,
        }
    }
}
