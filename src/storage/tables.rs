use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::{Row, RowId, Value};
use crate::storage::wal::WalOp;

/// Plain in-memory rows, keyed by table and id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSet {
    tables: BTreeMap<String, BTreeMap<RowId, Row>>,
}

impl TableSet {
    pub fn new() -> Self {
        TableSet { tables: BTreeMap::new() }
    }

    pub fn max_id(&self, table: &str) -> i64 {
        self.tables
            .get(table)
            .and_then(|rows| rows.keys().next_back())
            .map(|id| id.0)
            .unwrap_or(0)
    }

    pub fn insert(&mut self, table: &str, row: &Row) -> Result<()> {
        if !row.id.is_real() {
            return Err(Error::Storage(format!("refusing to store id {} in '{}'", row.id, table)));
        }
        let rows = self.tables.entry(table.to_string()).or_default();
        if rows.contains_key(&row.id) {
            return Err(Error::Storage(format!("duplicate key {} in '{}'", row.id, table)));
        }
        rows.insert(row.id, row.clone());
        Ok(())
    }

    pub fn update(&mut self, table: &str, row: &Row) -> Result<()> {
        match self.tables.get_mut(table).and_then(|rows| rows.get_mut(&row.id)) {
            Some(existing) => {
                *existing = row.clone();
                Ok(())
            }
            None => Err(Error::Storage(format!("row {} not found in '{}'", row.id, table))),
        }
    }

    pub fn delete(&mut self, table: &str, id: RowId) -> Result<()> {
        match self.tables.get_mut(table).and_then(|rows| rows.remove(&id)) {
            Some(_) => Ok(()),
            None => Err(Error::Storage(format!("row {} not found in '{}'", id, table))),
        }
    }

    pub fn update_column(&mut self, table: &str, id: RowId, column: &str, value: &Value) -> bool {
        match self.tables.get_mut(table).and_then(|rows| rows.get_mut(&id)) {
            Some(row) => {
                row.set(column, value.clone());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, table: &str, id: RowId) -> Option<&Row> {
        self.tables.get(table).and_then(|rows| rows.get(&id))
    }

    pub fn rows(&self, table: &str) -> impl Iterator<Item = &Row> {
        self.tables.get(table).into_iter().flat_map(|rows| rows.values())
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.values().map(|rows| rows.len() as u64).sum()
    }

    /// Replay one logged operation.
    pub fn apply(&mut self, op: &WalOp) -> Result<()> {
        match op {
            WalOp::Insert { table, row } => self.insert(table, row),
            WalOp::Update { table, row } => self.update(table, row),
            WalOp::Delete { table, id } => self.delete(table, *id),
            WalOp::SetColumn { table, id, column, value } => {
                if self.update_column(table, *id, column, value) {
                    Ok(())
                } else {
                    Err(Error::Storage(format!("row {} not found in '{}'", id, table)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_id_tracks_highest_key() {
        let mut set = TableSet::new();
        assert_eq!(set.max_id("Docs"), 0);
        set.insert("Docs", &Row::new(RowId(3))).unwrap();
        set.insert("Docs", &Row::new(RowId(9))).unwrap();
        set.insert("Docs", &Row::new(RowId(5))).unwrap();
        assert_eq!(set.max_id("Docs"), 9);
        assert_eq!(set.total_rows(), 3);
    }

    #[test]
    fn rejects_placeholders_and_duplicates() {
        let mut set = TableSet::new();
        assert!(set.insert("Docs", &Row::new(RowId(-1))).is_err());
        set.insert("Docs", &Row::new(RowId(1))).unwrap();
        assert!(set.insert("Docs", &Row::new(RowId(1))).is_err());
        assert!(set.delete("Docs", RowId(2)).is_err());
        assert!(!set.update_column("Docs", RowId(2), "Name", &Value::Null));
        assert!(set.update_column("Docs", RowId(1), "Name", &Value::from("x")));
        assert_eq!(set.get("Docs", RowId(1)).unwrap().get("Name"), &Value::from("x"));
    }
}
