//! Commit-time identity resolution.
//!
//! `assign_real_ids` -> `rewrite_references` -> (physical writes) ->
//! `DeferredWriteQueue::apply`, all under the commit lock.

pub mod deferred;
pub mod materializer;
pub mod rewriter;

use crate::batch::change_set::ChangeSet;
use crate::core::error::{Error, Result};
use crate::schema::catalog::ReferenceCatalog;

/// Tables of `change_set` in catalog processing order.
pub(crate) fn ordered_tables(change_set: &ChangeSet, catalog: &ReferenceCatalog) -> Result<Vec<String>> {
    let mut tables = Vec::new();
    for name in change_set.table_names() {
        let position = catalog
            .position(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))?;
        tables.push((position, name.to_string()));
    }
    tables.sort_unstable_by_key(|(position, _)| *position);
    Ok(tables.into_iter().map(|(_, name)| name).collect())
}
