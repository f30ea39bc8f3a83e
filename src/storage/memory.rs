use std::collections::HashSet;
use parking_lot::Mutex;
use crate::core::error::{Error, Result};
use crate::core::types::{Row, RowId, Value};
use crate::storage::store::{MaxIdSource, RowStore};
use crate::storage::tables::TableSet;

#[derive(Default)]
struct MemoryState {
    tables: TableSet,
    undo: Option<TableSet>,
    failing_max_id: HashSet<String>,
}

/// Volatile row store. A transaction keeps an undo snapshot of all tables.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with rows, outside any transaction.
    pub fn with_rows<'a>(rows: impl IntoIterator<Item = (&'a str, Row)>) -> Result<Self> {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            for (table, row) in rows {
                state.tables.insert(table, &row)?;
            }
        }
        Ok(store)
    }

    /// Make `max_id(table)` fail until cleared. Used to exercise allocation failures.
    pub fn fail_max_id(&self, table: &str, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failing_max_id.insert(table.to_string());
        } else {
            state.failing_max_id.remove(table);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state.lock().tables.rows(table).cloned().collect()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().undo.is_some()
    }
}

impl MaxIdSource for MemoryStore {
    fn max_id(&self, table: &str) -> Result<i64> {
        let state = self.state.lock();
        if state.failing_max_id.contains(table) {
            return Err(Error::Storage(format!("max id query on '{}' failed", table)));
        }
        Ok(state.tables.max_id(table))
    }
}

impl RowStore for MemoryStore {
    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.undo.is_some() {
            return Err(Error::InvalidState("transaction already open".to_string()));
        }
        state.undo = Some(state.tables.clone());
        Ok(())
    }

    fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        self.state.lock().tables.insert(table, row)
    }

    fn update_row(&self, table: &str, row: &Row) -> Result<()> {
        self.state.lock().tables.update(table, row)
    }

    fn delete_row(&self, table: &str, id: RowId) -> Result<()> {
        self.state.lock().tables.delete(table, id)
    }

    fn update_column(&self, table: &str, id: RowId, column: &str, value: &Value) -> Result<bool> {
        Ok(self.state.lock().tables.update_column(table, id, column, value))
    }

    fn load_row(&self, table: &str, id: RowId) -> Result<Option<Row>> {
        Ok(self.state.lock().tables.get(table, id).cloned())
    }

    fn total_rows(&self) -> Result<u64> {
        Ok(self.state.lock().tables.total_rows())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.undo.take().is_none() {
            return Err(Error::InvalidState("no open transaction".to_string()));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.undo.take() {
            Some(snapshot) => {
                state.tables = snapshot;
                Ok(())
            }
            None => Err(Error::InvalidState("no open transaction".to_string())),
        }
    }
}
