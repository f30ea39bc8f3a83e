use tracing::debug;
use crate::batch::change_set::{ChangeSet, RowState, TableBatch};
use crate::batch::id_map::{IdMaps, TableIdPairs};
use crate::commit::ordered_tables;
use crate::core::error::{Error, Result};
use crate::core::types::ID_COLUMN;
use crate::identity::authority::IdentifierAuthority;
use crate::schema::catalog::ReferenceCatalog;

/// Replace the placeholder id of every inserted row with a real id.
///
/// Tables are visited in catalog processing order (documents before their
/// sub-documents). Rows that already carry a real id are left alone, so
/// running this twice allocates nothing the second time. An inserted row
/// with a real id the authority has not reached yet is refused. Tables
/// without placeholder rows get no entry in the returned maps.
pub fn assign_real_ids(
    change_set: &mut ChangeSet,
    catalog: &ReferenceCatalog,
    authority: &IdentifierAuthority,
) -> Result<IdMaps> {
    let mut maps = IdMaps::new();

    for table in ordered_tables(change_set, catalog)? {
        let Some(batch) = change_set.table_mut(&table) else { continue };

        let mut pending = Vec::new();
        for (i, entry) in batch.rows().enumerate() {
            if !entry.row.id.is_placeholder() {
                if entry.state == RowState::Inserted {
                    authority.check_issued(&table, entry.row.id)?;
                }
                continue;
            }
            if entry.state != RowState::Inserted {
                return Err(Error::consistency(
                    &table,
                    ID_COLUMN,
                    entry.row.id.0,
                    format!("placeholder id on a row in {:?} state", entry.state),
                ));
            }
            pending.push(i);
        }
        if pending.is_empty() {
            continue;
        }

        let mut pairs = TableIdPairs::new(&table);
        batch.relax_unique();
        let assigned = remap_rows(batch, &pending, &mut pairs, authority);
        let enforced = batch.enforce_unique();
        assigned?;
        enforced?;

        debug!(table = %table, rows = pairs.len(), "assigned real ids");
        maps.insert(pairs);
    }

    Ok(maps)
}

fn remap_rows(
    batch: &mut TableBatch,
    rows: &[usize],
    pairs: &mut TableIdPairs,
    authority: &IdentifierAuthority,
) -> Result<()> {
    for &i in rows {
        let old_id = batch.row_at(i).row.id;
        let new_id = authority.next_id(batch.name())?;
        pairs.insert(old_id, new_id)?;
        batch.set_row_id(i, new_id)?;
    }
    Ok(())
}
