use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use crate::core::error::Result;
use crate::storage::wal::SyncMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,
    pub sync_mode: SyncMode,

    pub row_cache_capacity: usize,              // 0 disables the row cache

    pub max_store_rows: Option<u64>,            // Size limit reported through EngineHooks
    pub check_long_locks_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            sync_mode: SyncMode::Immediate,
            row_cache_capacity: 10_000,
            max_store_rows: None,
            check_long_locks_on_commit: true,
        }
    }
}

impl Config {
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }
}
