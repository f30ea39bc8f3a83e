use crate::core::error::Result;
use crate::core::types::{Row, RowId, Value};

/// Source of the current maximum id of a table.
pub trait MaxIdSource: Send + Sync {
    /// `MAX(id)` of `table`, 0 when the table is empty.
    fn max_id(&self, table: &str) -> Result<i64>;
}

/// Storage collaborator used by the commit pipeline.
///
/// Writes between `begin` and `commit`/`rollback` form one storage
/// transaction. Callers serialize transactions (the commit lock does).
pub trait RowStore: MaxIdSource {
    fn begin(&self) -> Result<()>;

    fn insert_row(&self, table: &str, row: &Row) -> Result<()>;

    fn update_row(&self, table: &str, row: &Row) -> Result<()>;

    fn delete_row(&self, table: &str, id: RowId) -> Result<()>;

    /// Overwrite one column of an existing row. `Ok(false)` if the row is missing.
    fn update_column(&self, table: &str, id: RowId, column: &str, value: &Value) -> Result<bool>;

    fn load_row(&self, table: &str, id: RowId) -> Result<Option<Row>>;

    fn total_rows(&self) -> Result<u64>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}
