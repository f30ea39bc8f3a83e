use tracing::debug;
use crate::batch::change_set::{ChangeSet, RowState, TableBatch};
use crate::batch::id_map::{IdMaps, TableIdPairs};
use crate::commit::deferred::DeferredWriteQueue;
use crate::commit::ordered_tables;
use crate::core::error::{Error, Result};
use crate::core::types::Value;
use crate::schema::catalog::{FixedRef, ReferenceCatalog, VariableRef};

fn is_written(state: RowState) -> bool {
    matches!(state, RowState::Inserted | RowState::Modified)
}

// A rewritten row must reach storage.
fn touch(state: &mut RowState) {
    if *state == RowState::Unchanged {
        *state = RowState::Modified;
    }
}

/// Point every reference at real ids.
///
/// Driven by target table: for each table that received new ids, the
/// catalog names the columns that may hold its placeholders. A fixed
/// reference is rewritten in place when its master table is persisted
/// before the source table; otherwise it becomes a deferred patch (and is
/// nulled in the batch when the column allows it). Variable references
/// are always deferred.
pub fn rewrite_references(
    change_set: &mut ChangeSet,
    id_maps: &IdMaps,
    catalog: &ReferenceCatalog,
) -> Result<DeferredWriteQueue> {
    let order = ordered_tables(change_set, catalog)?;
    for table in &order {
        if let Some(batch) = change_set.table(table) {
            validate_variable_refs(batch, catalog)?;
        }
    }

    let mut queue = DeferredWriteQueue::new();
    for target in catalog.processing_order() {
        let Some(pairs) = id_maps.get(target) else { continue };
        let incoming = catalog.references_into(target);

        for fixed in &incoming.fixed {
            let immediate = catalog.is_immediate(&fixed.source_table, target);
            if let Some(batch) = change_set.table_mut(&fixed.source_table) {
                rewrite_fixed(batch, fixed, pairs, immediate, &mut queue);
            }
        }

        let Some(code) = catalog.table_code(target) else { continue };
        for vt in &incoming.variable {
            if let Some(batch) = change_set.table_mut(&vt.source_table) {
                rewrite_variable(batch, vt, i64::from(code), pairs, &mut queue);
            }
        }
    }

    for table in &order {
        if let Some(batch) = change_set.table(table) {
            verify_resolved(batch, catalog)?;
        }
    }

    debug!(deferred = queue.len(), "references rewritten");
    Ok(queue)
}

fn rewrite_fixed(
    batch: &mut TableBatch,
    fixed: &FixedRef,
    pairs: &TableIdPairs,
    immediate: bool,
    queue: &mut DeferredWriteQueue,
) {
    for entry in batch.rows_mut() {
        if entry.state == RowState::Deleted {
            continue;
        }
        let Some(old_id) = entry.row.get_row_id(&fixed.column) else { continue };
        if !old_id.is_placeholder() {
            continue;
        }
        // Unmapped placeholders are reported by verify_resolved.
        let Some(new_id) = pairs.get(old_id) else { continue };
        touch(&mut entry.state);

        if immediate {
            entry.row.set(&fixed.column, new_id);
            continue;
        }
        queue.push(&fixed.source_table, entry.row.id, &fixed.column, Value::from(new_id));
        if fixed.nullable {
            entry.row.set(&fixed.column, Value::Null);
        } else {
            entry.row.set(&fixed.column, new_id);
        }
    }
}

fn rewrite_variable(
    batch: &mut TableBatch,
    vt: &VariableRef,
    target_code: i64,
    pairs: &TableIdPairs,
    queue: &mut DeferredWriteQueue,
) {
    for entry in batch.rows_mut() {
        if entry.state == RowState::Deleted {
            continue;
        }
        if entry.row.get(&vt.table_id_column).as_int() != Some(target_code) {
            continue;
        }
        let Some(old_id) = entry.row.get_row_id(&vt.row_id_column) else { continue };
        if !old_id.is_placeholder() {
            continue;
        }
        let Some(new_id) = pairs.get(old_id) else { continue };
        touch(&mut entry.state);

        queue.push(&vt.source_table, entry.row.id, &vt.row_id_column, Value::from(new_id));
        if vt.nullable {
            // Keep the pair consistently empty until both halves are patched.
            queue.push(&vt.source_table, entry.row.id, &vt.table_id_column, Value::Int(target_code));
            entry.row.set(&vt.table_id_column, Value::Null);
            entry.row.set(&vt.row_id_column, Value::Null);
        } else {
            entry.row.set(&vt.row_id_column, new_id);
        }
    }
}

/// Both halves of each variable reference populated or both empty, and
/// the named table permitted by the reference.
fn validate_variable_refs(batch: &TableBatch, catalog: &ReferenceCatalog) -> Result<()> {
    let table = batch.name();
    for vt in catalog.variable_refs_from(table) {
        for entry in batch.rows() {
            if !is_written(entry.state) {
                continue;
            }
            let row_id = entry.row.id.0;
            let code = entry.row.get(&vt.table_id_column);
            let target = entry.row.get(&vt.row_id_column);

            match (code.is_null(), target.is_null()) {
                (true, true) if vt.nullable => continue,
                (true, true) => {
                    return Err(Error::ambiguous(table, &vt.table_id_column, row_id, "required reference is empty"));
                }
                (false, true) => {
                    return Err(Error::ambiguous(table, &vt.row_id_column, row_id, "table id is set but row id is empty"));
                }
                (true, false) => {
                    return Err(Error::ambiguous(table, &vt.table_id_column, row_id, "row id is set but table id is empty"));
                }
                (false, false) => {}
            }

            let Some(code) = code.as_int() else {
                return Err(Error::ambiguous(table, &vt.table_id_column, row_id, "table id is not an integer"));
            };
            let Some(master) = catalog.table_for_code(code) else {
                return Err(Error::ambiguous(table, &vt.table_id_column, row_id, format!("unknown table code {}", code)));
            };
            if !vt.permits(master) {
                return Err(Error::ambiguous(
                    table,
                    &vt.table_id_column,
                    row_id,
                    format!("reference '{}' names table '{}' which its type does not allow", vt.name, master),
                ));
            }
            match target.as_row_id() {
                Some(id) if id.0 != 0 => {}
                _ => {
                    return Err(Error::ambiguous(table, &vt.row_id_column, row_id, "row id is not a valid id"));
                }
            }
        }
    }
    Ok(())
}

/// No placeholder may survive rewriting.
fn verify_resolved(batch: &TableBatch, catalog: &ReferenceCatalog) -> Result<()> {
    let def = catalog.table(batch.name())?;
    for entry in batch.rows() {
        if entry.state == RowState::Deleted {
            continue;
        }
        for column in def.fixed_references() {
            if let Some(id) = entry.row.get_row_id(&column.name) {
                if id.is_placeholder() {
                    let master = column.master.as_deref().unwrap_or_default();
                    return Err(Error::consistency(
                        batch.name(),
                        &column.name,
                        id.0,
                        format!("placeholder has no real id in '{}'", master),
                    ));
                }
            }
        }
        for vt in catalog.variable_refs_from(batch.name()) {
            if let Some(id) = entry.row.get_row_id(&vt.row_id_column) {
                if id.is_placeholder() {
                    return Err(Error::consistency(
                        batch.name(),
                        &vt.row_id_column,
                        id.0,
                        "placeholder has no real id in the referenced table",
                    ));
                }
            }
        }
    }
    Ok(())
}
