use std::path::PathBuf;
use parking_lot::Mutex;
use tracing::{info, warn};
use crate::core::error::{Error, Result};
use crate::core::types::{Row, RowId, Value};
use crate::storage::checkpoint::Checkpoint;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::store::{MaxIdSource, RowStore};
use crate::storage::tables::TableSet;
use crate::storage::wal::{SyncMode, Wal, WalOp, WalRecord};

struct FileState {
    tables: TableSet,
    undo: Option<TableSet>,
    pending: Vec<WalOp>,
    wal: Wal,
}

impl FileState {
    fn in_transaction(&self) -> Result<()> {
        if self.undo.is_none() {
            return Err(Error::InvalidState("write outside a transaction".to_string()));
        }
        Ok(())
    }
}

/// Durable row store: tables live in memory, every committed transaction is
/// appended to the WAL, `checkpoint` snapshots the tables and starts a new
/// WAL file.
pub struct FileStore {
    layout: StorageLayout,
    state: Mutex<FileState>,
    _lock: FileLock,
}

impl FileStore {
    /// Open (or create) the store at `path`, replaying committed WAL transactions.
    pub fn open(path: impl Into<PathBuf>, sync_mode: SyncMode) -> Result<Self> {
        let layout = StorageLayout::new(path.into())?;
        let lock = FileLock::acquire(&layout)?;

        let (mut tables, start) = match Checkpoint::load(&layout)? {
            Some(checkpoint) => {
                info!(rows = checkpoint.row_count, at = %checkpoint.timestamp, "loaded checkpoint");
                (checkpoint.tables, checkpoint.wal_sequence)
            }
            None => (TableSet::new(), 0),
        };

        let sequences: Vec<u64> = Wal::find_wal_files(&layout)?
            .into_iter()
            .filter(|&s| s >= start)
            .collect();

        let mut active = None;
        let mut replayed = 0usize;
        for &seq in &sequences {
            let mut wal = Wal::open(&layout, seq, sync_mode)?;
            let mut pending = Vec::new();
            let mut committed_end = 0u64;
            let mut next_sequence = seq;

            for (end, entry) in wal.read_entries()? {
                next_sequence = entry.sequence + 1;
                match entry.record {
                    WalRecord::Op(op) => pending.push(op),
                    WalRecord::Commit => {
                        for op in pending.drain(..) {
                            tables.apply(&op)?;
                        }
                        committed_end = end;
                        replayed += 1;
                    }
                }
            }

            if !pending.is_empty() || committed_end < wal.position {
                warn!(wal = seq, dropped_ops = pending.len(), "discarding uncommitted WAL tail");
                wal.truncate(committed_end)?;
            }
            wal.sequence = next_sequence;
            active = Some(wal);
        }

        let wal = match active {
            Some(wal) => wal,
            None => Wal::open(&layout, start, sync_mode)?,
        };
        info!(path = %layout.base_dir.display(), transactions = replayed, "file store opened");

        Ok(FileStore {
            layout,
            state: Mutex::new(FileState {
                tables,
                undo: None,
                pending: Vec::new(),
                wal,
            }),
            _lock: lock,
        })
    }

    /// Snapshot all tables and start a fresh WAL file. Older WAL files are removed.
    pub fn checkpoint(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.undo.is_some() {
            return Err(Error::InvalidState("cannot checkpoint inside a transaction".to_string()));
        }

        state.wal.sync()?;
        let next = state.wal.sequence;
        let wal = Wal::open(&self.layout, next, state.wal.sync_mode)?;
        Checkpoint::new(next, state.tables.clone()).save(&self.layout)?;
        state.wal = wal;

        for seq in Wal::find_wal_files(&self.layout)? {
            if seq < next {
                std::fs::remove_file(self.layout.wal_path(seq))?;
            }
        }
        info!(wal = next, rows = state.tables.total_rows(), "checkpoint written");
        Ok(())
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state.lock().tables.rows(table).cloned().collect()
    }
}

impl MaxIdSource for FileStore {
    fn max_id(&self, table: &str) -> Result<i64> {
        Ok(self.state.lock().tables.max_id(table))
    }
}

impl RowStore for FileStore {
    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.undo.is_some() {
            return Err(Error::InvalidState("transaction already open".to_string()));
        }
        state.undo = Some(state.tables.clone());
        state.pending.clear();
        Ok(())
    }

    fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        let mut state = self.state.lock();
        state.in_transaction()?;
        state.tables.insert(table, row)?;
        state.pending.push(WalOp::Insert { table: table.to_string(), row: row.clone() });
        Ok(())
    }

    fn update_row(&self, table: &str, row: &Row) -> Result<()> {
        let mut state = self.state.lock();
        state.in_transaction()?;
        state.tables.update(table, row)?;
        state.pending.push(WalOp::Update { table: table.to_string(), row: row.clone() });
        Ok(())
    }

    fn delete_row(&self, table: &str, id: RowId) -> Result<()> {
        let mut state = self.state.lock();
        state.in_transaction()?;
        state.tables.delete(table, id)?;
        state.pending.push(WalOp::Delete { table: table.to_string(), id });
        Ok(())
    }

    fn update_column(&self, table: &str, id: RowId, column: &str, value: &Value) -> Result<bool> {
        let mut state = self.state.lock();
        state.in_transaction()?;
        if !state.tables.update_column(table, id, column, value) {
            return Ok(false);
        }
        state.pending.push(WalOp::SetColumn {
            table: table.to_string(),
            id,
            column: column.to_string(),
            value: value.clone(),
        });
        Ok(true)
    }

    fn load_row(&self, table: &str, id: RowId) -> Result<Option<Row>> {
        Ok(self.state.lock().tables.get(table, id).cloned())
    }

    fn total_rows(&self) -> Result<u64> {
        Ok(self.state.lock().tables.total_rows())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.in_transaction()?;

        let FileState { wal, pending, .. } = &mut *state;
        let start = wal.position;
        let written = pending
            .drain(..)
            .try_for_each(|op| wal.append(WalRecord::Op(op)))
            .and_then(|_| wal.append(WalRecord::Commit))
            .and_then(|_| wal.commit_boundary());

        if let Err(err) = written {
            // Leave no half-written transaction behind for the next commit marker.
            wal.truncate(start)?;
            return Err(err);
        }

        state.undo = None;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.undo.take() {
            Some(snapshot) => {
                state.tables = snapshot;
                state.pending.clear();
                Ok(())
            }
            None => Err(Error::InvalidState("no open transaction".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(store: &FileStore, id: i64) {
        store.begin().unwrap();
        store.insert_row("Docs", &Row::new(RowId(id)).with("Name", "doc")).unwrap();
        store.commit().unwrap();
    }

    #[test]
    fn committed_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path(), SyncMode::Immediate).unwrap();
            insert(&store, 1);
            insert(&store, 2);

            store.begin().unwrap();
            store.insert_row("Docs", &Row::new(RowId(3))).unwrap();
            store.rollback().unwrap();
        }

        let store = FileStore::open(dir.path(), SyncMode::Immediate).unwrap();
        assert_eq!(store.max_id("Docs").unwrap(), 2);
        assert_eq!(store.total_rows().unwrap(), 2);
    }

    #[test]
    fn checkpoint_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path(), SyncMode::Immediate).unwrap();
            insert(&store, 1);
            store.checkpoint().unwrap();
            insert(&store, 2);
            store.begin().unwrap();
            assert!(store.update_column("Docs", RowId(1), "Name", &Value::from("renamed")).unwrap());
            store.commit().unwrap();
        }

        let store = FileStore::open(dir.path(), SyncMode::Immediate).unwrap();
        assert_eq!(store.rows("Docs").len(), 2);
        let first = store.load_row("Docs", RowId(1)).unwrap().unwrap();
        assert_eq!(first.get("Name"), &Value::from("renamed"));
        assert_eq!(Wal::find_wal_files(&store.layout).unwrap().len(), 1);
    }

    #[test]
    fn second_open_of_the_same_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = FileStore::open(dir.path(), SyncMode::None).unwrap();
        assert!(FileStore::open(dir.path(), SyncMode::None).is_err());
    }

    #[test]
    fn writes_need_a_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), SyncMode::None).unwrap();
        assert!(store.insert_row("Docs", &Row::new(RowId(1))).is_err());
    }
}
