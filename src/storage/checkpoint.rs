use std::fs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::storage::layout::StorageLayout;
use crate::storage::tables::TableSet;
use crate::core::error::Result;

/// Full snapshot of the tables plus the WAL file replay resumes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub wal_sequence: u64,
    pub tables: TableSet,
    pub timestamp: DateTime<Utc>,
    pub row_count: u64,
}

impl Checkpoint {
    pub fn new(wal_sequence: u64, tables: TableSet) -> Self {
        let row_count = tables.total_rows();
        Checkpoint {
            wal_sequence,
            tables,
            timestamp: Utc::now(),
            row_count,
        }
    }

    /// Load checkpoint from disk
    pub fn load(storage: &StorageLayout) -> Result<Option<Self>> {
        let path = storage.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(path)?;
        let checkpoint = bincode::deserialize(&data)?;
        Ok(Some(checkpoint))
    }

    /// Save checkpoint to disk. Written to a temp file and renamed into place.
    pub fn save(&self, storage: &StorageLayout) -> Result<()> {
        let data = bincode::serialize(self)?;
        let tmp = storage.checkpoint_path().with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(tmp, storage.checkpoint_path())?;
        Ok(())
    }
}
