use serde::Serialize;
use tracing::debug;
use crate::batch::change_set::ChangeSet;
use crate::core::error::{Error, Result};
use crate::core::types::{RowId, Value};
use crate::storage::store::RowStore;

/// Single-column write postponed until every row of the commit exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeferredPatch {
    pub table: String,
    pub row_id: RowId,
    pub column: String,
    pub value: Value,
}

/// Patches collected by the reference rewriter, applied after the inserts.
///
/// Patches are independent of each other; order of application does not matter.
#[derive(Debug, Clone, Default)]
pub struct DeferredWriteQueue {
    patches: Vec<DeferredPatch>,
}

impl DeferredWriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: &str, row_id: RowId, column: &str, value: Value) {
        self.patches.push(DeferredPatch {
            table: table.to_string(),
            row_id,
            column: column.to_string(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeferredPatch> {
        self.patches.iter()
    }

    pub fn into_patches(self) -> Vec<DeferredPatch> {
        self.patches
    }

    /// Write every patch straight to storage, keyed by real row id.
    ///
    /// Must run inside the commit's storage transaction, after the rows were
    /// inserted. A missing target row is a consistency violation.
    pub fn apply(&self, store: &dyn RowStore) -> Result<usize> {
        for patch in &self.patches {
            if !patch.row_id.is_real() {
                return Err(Error::consistency(
                    &patch.table,
                    &patch.column,
                    patch.row_id.0,
                    "deferred patch keyed by a placeholder id",
                ));
            }
            if !store.update_column(&patch.table, patch.row_id, &patch.column, &patch.value)? {
                return Err(Error::consistency(
                    &patch.table,
                    &patch.column,
                    patch.row_id.0,
                    "deferred patch target row does not exist",
                ));
            }
        }
        debug!(patches = self.patches.len(), "deferred patches applied");
        Ok(self.patches.len())
    }

    /// Mirror the patches into the batch they came from, so the committed
    /// change-set shows the values that were stored.
    pub(crate) fn apply_to(&self, change_set: &mut ChangeSet) {
        for patch in &self.patches {
            if let Some(entry) = change_set.table_mut(&patch.table).and_then(|b| b.find_mut(patch.row_id)) {
                entry.row.set(&patch.column, patch.value.clone());
            }
        }
    }
}

impl IntoIterator for DeferredWriteQueue {
    type Item = DeferredPatch;
    type IntoIter = std::vec::IntoIter<DeferredPatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::Row;
    use crate::storage::memory::MemoryStore;

    #[test]
    fn applies_patches_to_existing_rows() {
        let store = MemoryStore::with_rows([("Lines", Row::new(RowId(4)))]).unwrap();
        let mut queue = DeferredWriteQueue::new();
        queue.push("Lines", RowId(4), "Product", Value::Int(12));

        assert_eq!(queue.apply(&store).unwrap(), 1);
        let row = store.load_row("Lines", RowId(4)).unwrap().unwrap();
        assert_eq!(row.get("Product"), &Value::Int(12));
    }

    #[test]
    fn missing_target_is_a_consistency_violation() {
        let store = MemoryStore::new();
        let mut queue = DeferredWriteQueue::new();
        queue.push("Lines", RowId(4), "Product", Value::Int(12));

        let err = queue.apply(&store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(err.to_string().contains("Lines.Product"));
    }
}
