use std::fs::{File, OpenOptions};
use std::io::{Write, Read, Seek, SeekFrom};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::core::types::{Row, RowId, Value};
use crate::storage::layout::StorageLayout;
use crate::core::error::{Result, Error};

const MAX_ENTRY_SIZE: usize = 16 * 1024 * 1024;

/// Write-ahead log for durability
pub struct Wal {
    pub file: File,
    pub position: u64,
    pub sync_mode: SyncMode,
    pub sequence: u64,
    unsynced: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    Immediate,  // fsync after every commit
    Batch,      // fsync once a megabyte has accumulated
    None,       // Let OS handle it
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub sequence: u64,
    pub record: WalRecord,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalRecord {
    Op(WalOp),
    Commit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalOp {
    Insert { table: String, row: Row },
    Update { table: String, row: Row },
    Delete { table: String, id: RowId },
    SetColumn { table: String, id: RowId, column: String, value: Value },
}

impl Wal {
    pub fn open(storage: &StorageLayout, sequence: u64, sync_mode: SyncMode) -> Result<Self> {
        let path = storage.wal_path(sequence);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let position = file.metadata()?.len();

        Ok(Wal {
            file,
            position,
            sync_mode,
            sequence,
            unsynced: 0,
        })
    }

    /// Frame layout: `len: u32 | crc32: u32 | bincode(entry)`.
    pub fn append(&mut self, record: WalRecord) -> Result<()> {
        let entry = WalEntry {
            sequence: self.sequence,
            record,
            timestamp: Utc::now(),
        };

        let data = bincode::serialize(&entry)?;
        if data.len() > MAX_ENTRY_SIZE {
            return Err(Error::InvalidArgument(format!("WAL entry of {} bytes is too large", data.len())));
        }
        let len = data.len() as u32;
        let checksum = crc32fast::hash(&data);

        let mut frame = Vec::with_capacity(8 + data.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&checksum.to_le_bytes());
        frame.extend_from_slice(&data);
        self.file.write_all(&frame)?;

        self.sequence += 1;
        self.position += frame.len() as u64;
        self.unsynced += frame.len() as u64;
        Ok(())
    }

    /// Apply the sync policy at a commit boundary.
    pub fn commit_boundary(&mut self) -> Result<()> {
        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batch if self.unsynced >= 1024 * 1024 => self.sync()?,
            _ => {}
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Cut the log at `position`, dropping a partially written transaction.
    pub fn truncate(&mut self, position: u64) -> Result<()> {
        self.file.set_len(position)?;
        self.position = position;
        Ok(())
    }

    /// Read every intact entry with the file offset just past its frame.
    /// Reading stops at the first torn or corrupt frame.
    pub fn read_entries(&mut self) -> Result<Vec<(u64, WalEntry)>> {
        let mut entries = Vec::new();
        let mut offset = 0u64;
        self.file.seek(SeekFrom::Start(0))?;

        loop {
            let mut header = [0u8; 8];
            match self.file.read_exact(&mut header) {
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if len > MAX_ENTRY_SIZE {
                warn!(len, "WAL frame length out of range, ignoring the tail");
                break;
            }

            let mut data = vec![0u8; len];
            if self.file.read_exact(&mut data).is_err() {
                warn!(len, "torn WAL frame, ignoring the tail");
                break;
            }
            if crc32fast::hash(&data) != checksum {
                warn!(len, "WAL checksum mismatch, ignoring the tail");
                break;
            }

            offset += 8 + len as u64;
            entries.push((offset, bincode::deserialize::<WalEntry>(&data)?));
        }

        self.file.seek(SeekFrom::End(0))?;
        Ok(entries)
    }

    /// All WAL sequence numbers present on disk, ascending.
    pub fn find_wal_files(storage: &StorageLayout) -> Result<Vec<u64>> {
        let mut sequences = Vec::new();

        for entry in std::fs::read_dir(storage.wal_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("log") {
                continue;
            }
            // wal_00000000.log
            let seq = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("wal_"))
                .and_then(|s| s.parse::<u64>().ok());
            if let Some(seq) = seq {
                sequences.push(seq);
            }
        }

        sequences.sort_unstable();
        Ok(sequences)
    }
}
