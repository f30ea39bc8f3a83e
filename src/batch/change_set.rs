use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::{Row, RowId, ID_COLUMN, DOC_ID_COLUMN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowState {
    Unchanged,
    Inserted,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub row: Row,
    pub state: RowState,
}

/// Index of a row inside a change-set arena.
///
/// Valid until the owning table batch changes structurally (a row is
/// discarded or changes are accepted); after that it resolves to
/// `Error::StaleHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowHandle {
    table: usize,
    index: usize,
    generation: u64,
}

/// Pending rows of one table.
#[derive(Debug, Clone)]
pub struct TableBatch {
    name: String,
    rows: Vec<BatchRow>,
    generation: u64,
    index: HashMap<RowId, usize>,
    unique: bool,
}

impl TableBatch {
    pub fn new(name: &str) -> Self {
        TableBatch {
            name: name.to_string(),
            rows: Vec::new(),
            generation: 0,
            index: HashMap::new(),
            unique: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rows(&self) -> impl Iterator<Item = &BatchRow> {
        self.rows.iter()
    }

    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = &mut BatchRow> {
        self.rows.iter_mut()
    }

    pub fn count(&self, state: RowState) -> usize {
        self.rows.iter().filter(|r| r.state == state).count()
    }

    pub fn find(&self, id: RowId) -> Option<&BatchRow> {
        self.position(id).map(|i| &self.rows[i])
    }

    pub(crate) fn find_mut(&mut self, id: RowId) -> Option<&mut BatchRow> {
        self.position(id).map(move |i| &mut self.rows[i])
    }

    fn position(&self, id: RowId) -> Option<usize> {
        if self.unique {
            self.index.get(&id).copied()
        } else {
            self.rows.iter().position(|r| r.row.id == id)
        }
    }

    fn push(&mut self, row: Row, state: RowState) -> Result<usize> {
        if row.id.0 == 0 {
            return Err(Error::InvalidArgument(format!("row id 0 is not valid in table '{}'", self.name)));
        }
        if row.id.is_placeholder() && state != RowState::Inserted {
            return Err(Error::consistency(
                &self.name,
                ID_COLUMN,
                row.id.0,
                format!("placeholder id on a row in {:?} state", state),
            ));
        }
        if self.unique && self.index.contains_key(&row.id) {
            return Err(Error::consistency(&self.name, ID_COLUMN, row.id.0, "duplicate id in batch"));
        }
        let i = self.rows.len();
        self.index.insert(row.id, i);
        self.rows.push(BatchRow { row, state });
        Ok(i)
    }

    /// Change the primary key of row `i`.
    pub(crate) fn set_row_id(&mut self, i: usize, new_id: RowId) -> Result<()> {
        let old_id = self.rows[i].row.id;
        if self.unique {
            if self.index.contains_key(&new_id) {
                return Err(Error::consistency(&self.name, ID_COLUMN, new_id.0, "duplicate id in batch"));
            }
            self.index.remove(&old_id);
            self.index.insert(new_id, i);
        }
        self.rows[i].row.id = new_id;
        Ok(())
    }

    pub(crate) fn row_at(&self, i: usize) -> &BatchRow {
        &self.rows[i]
    }

    /// Suspend the primary-key index while ids are being rewritten.
    pub(crate) fn relax_unique(&mut self) {
        self.unique = false;
        self.index.clear();
    }

    /// Rebuild the primary-key index, failing on duplicates.
    pub(crate) fn enforce_unique(&mut self) -> Result<()> {
        let mut index = HashMap::with_capacity(self.rows.len());
        for (i, r) in self.rows.iter().enumerate() {
            if index.insert(r.row.id, i).is_some() {
                return Err(Error::consistency(&self.name, ID_COLUMN, r.row.id.0, "duplicate id in batch"));
            }
        }
        self.index = index;
        self.unique = true;
        Ok(())
    }

    fn remove(&mut self, i: usize) -> Result<BatchRow> {
        let removed = self.rows.remove(i);
        self.generation += 1;
        self.enforce_unique()?;
        Ok(removed)
    }

    fn accept_changes(&mut self) -> Result<()> {
        self.rows.retain(|r| r.state != RowState::Deleted);
        for r in &mut self.rows {
            r.state = RowState::Unchanged;
        }
        self.generation += 1;
        self.enforce_unique()
    }
}

/// A commit's worth of pending row changes, one arena per table.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    tables: Vec<TableBatch>,
    by_name: HashMap<String, usize>,
    // None once the placeholder range is used up.
    next_placeholder: Option<i64>,
}

impl Default for ChangeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet {
            tables: Vec::new(),
            by_name: HashMap::new(),
            next_placeholder: Some(-1),
        }
    }

    /// Fresh placeholder id, unique within this change-set.
    pub fn next_placeholder(&mut self) -> Result<RowId> {
        let id = self
            .next_placeholder
            .ok_or_else(|| Error::InvalidArgument("placeholder ids exhausted".to_string()))?;
        self.next_placeholder = id.checked_sub(1);
        Ok(RowId(id))
    }

    pub fn table(&self, name: &str) -> Option<&TableBatch> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Option<&mut TableBatch> {
        self.by_name.get(name).map(|&i| &mut self.tables[i])
    }

    fn batch_index(&mut self, name: &str) -> usize {
        if let Some(&i) = self.by_name.get(name) {
            return i;
        }
        self.tables.push(TableBatch::new(name));
        self.by_name.insert(name.to_string(), self.tables.len() - 1);
        self.tables.len() - 1
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableBatch> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name())
    }

    fn handle(&self, table: usize, index: usize) -> RowHandle {
        RowHandle {
            table,
            index,
            generation: self.tables[table].generation,
        }
    }

    fn push(&mut self, table: &str, row: Row, state: RowState) -> Result<RowHandle> {
        let t = self.batch_index(table);
        let i = self.tables[t].push(row, state)?;
        Ok(self.handle(t, i))
    }

    /// Add a new row. An id of 0 is replaced by a fresh placeholder.
    pub fn insert(&mut self, table: &str, mut row: Row) -> Result<RowHandle> {
        if row.id.0 == 0 {
            row.id = self.next_placeholder()?;
        } else if row.id.is_placeholder() {
            if let Some(next) = self.next_placeholder {
                if row.id.0 <= next {
                    self.next_placeholder = row.id.0.checked_sub(1);
                }
            }
        }
        self.push(table, row, RowState::Inserted)
    }

    /// Add a new sub-document row owned by document `doc_id`.
    pub fn insert_sub_doc(&mut self, table: &str, doc_id: RowId, mut row: Row) -> Result<RowHandle> {
        row.set(DOC_ID_COLUMN, doc_id);
        self.insert(table, row)
    }

    /// Attach an already persisted row without changing it.
    pub fn attach(&mut self, table: &str, row: Row) -> Result<RowHandle> {
        self.push(table, row, RowState::Unchanged)
    }

    /// Record new values for a persisted row, or replace a pending row's values.
    pub fn update(&mut self, table: &str, row: Row) -> Result<RowHandle> {
        let t = self.batch_index(table);
        if let Some(i) = self.tables[t].position(row.id) {
            let existing = &mut self.tables[t].rows[i];
            if existing.state == RowState::Deleted {
                return Err(Error::InvalidState(format!("row {} of '{}' is deleted", row.id, table)));
            }
            existing.row = row;
            if existing.state == RowState::Unchanged {
                existing.state = RowState::Modified;
            }
            return Ok(self.handle(t, i));
        }
        self.push(table, row, RowState::Modified)
    }

    /// Delete a row. A pending insert is simply dropped from the batch.
    pub fn delete(&mut self, table: &str, id: RowId) -> Result<()> {
        let t = self.batch_index(table);
        match self.tables[t].position(id) {
            Some(i) if self.tables[t].rows[i].state == RowState::Inserted => {
                self.tables[t].remove(i)?;
            }
            Some(i) => self.tables[t].rows[i].state = RowState::Deleted,
            None => {
                self.push(table, Row::new(id), RowState::Deleted)?;
            }
        }
        Ok(())
    }

    fn resolve(&self, handle: RowHandle) -> Result<&TableBatch> {
        let batch = self.tables.get(handle.table).ok_or_else(|| Error::InvalidArgument("foreign row handle".into()))?;
        if batch.generation != handle.generation || handle.index >= batch.rows.len() {
            return Err(Error::StaleHandle { table: batch.name.clone() });
        }
        Ok(batch)
    }

    pub fn get(&self, handle: RowHandle) -> Result<&Row> {
        Ok(&self.resolve(handle)?.rows[handle.index].row)
    }

    pub fn get_mut(&mut self, handle: RowHandle) -> Result<&mut Row> {
        self.resolve(handle)?;
        let entry = &mut self.tables[handle.table].rows[handle.index];
        if entry.state == RowState::Unchanged {
            entry.state = RowState::Modified;
        }
        Ok(&mut entry.row)
    }

    pub fn state(&self, handle: RowHandle) -> Result<RowState> {
        Ok(self.resolve(handle)?.rows[handle.index].state)
    }

    /// Remove a row from the batch entirely. Invalidates the table's handles.
    pub fn discard(&mut self, handle: RowHandle) -> Result<BatchRow> {
        self.resolve(handle)?;
        self.tables[handle.table].remove(handle.index)
    }

    /// Mark everything as persisted: deleted rows leave the batch, the rest
    /// become `Unchanged`. Invalidates all handles.
    pub fn accept_changes(&mut self) -> Result<()> {
        for batch in &mut self.tables {
            batch.accept_changes()?;
        }
        Ok(())
    }

    /// True when nothing would be written.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.rows.iter().all(|r| r.state == RowState::Unchanged))
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(TableBatch::len).sum()
    }
}
