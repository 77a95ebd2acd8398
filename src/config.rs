//! JSON run configuration.
//!
//! ```json
//! {
//!   "sequences": [{ "table": "ORDERS", "column": "ORDER_ID", "sequence": "ORDERS_SEQ" }],
//!   "name_column": "ORDER_NO",
//!   "include_update": false,
//!   "constant_tables": ["COUNTRY"],
//!   "overlay_file": "virtual_fks.txt"
//! }
//! ```
//!
//! Every field is optional. Names are folded to upper case on use.

use crate::allocate::GeneratorMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid sequence mapping: {0}")]
    Mapping(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMapping {
    pub table: String,
    pub column: String,
    pub sequence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub sequences: Vec<SequenceMapping>,
    pub name_column: Option<String>,
    pub include_update: bool,
    pub constant_tables: Vec<String>,
    pub overlay_file: Option<PathBuf>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn generators(&self) -> Result<GeneratorMap, ConfigError> {
        let mut generators = GeneratorMap::new();
        for mapping in &self.sequences {
            if [&mapping.table, &mapping.column, &mapping.sequence]
                .iter()
                .any(|s| s.trim().is_empty())
            {
                return Err(ConfigError::Mapping(format!(
                    "{}.{}={}",
                    mapping.table, mapping.column, mapping.sequence
                )));
            }
            generators.insert(&mapping.table, &mapping.column, &mapping.sequence);
        }
        Ok(generators)
    }

    pub fn constant_tables(&self) -> Vec<String> {
        self.constant_tables
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}
