use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::core::types::{RowId, ID_COLUMN};
use crate::storage::store::MaxIdSource;

/// Per-table id allocator.
///
/// The first request for a table reads `MAX(id)` from the store; every later
/// request increments the cached counter. One authority per store: a second
/// instance over the same data would reissue ids.
pub struct IdentifierAuthority {
    source: Arc<dyn MaxIdSource>,
    counters: Mutex<HashMap<String, Arc<Mutex<Option<i64>>>>>,
}

impl IdentifierAuthority {
    pub fn new(source: Arc<dyn MaxIdSource>) -> Self {
        IdentifierAuthority {
            source,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn counter(&self, table: &str) -> Arc<Mutex<Option<i64>>> {
        self.counters
            .lock()
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Counter value for `table`, seeded from the store on first use.
    fn current(&self, table: &str, last: &mut Option<i64>) -> Result<i64> {
        if let Some(v) = *last {
            return Ok(v);
        }
        let max = self.source.max_id(table).map_err(|err| Error::Allocation {
            table: table.to_string(),
            source: Box::new(err),
        })?;
        debug!(table, max_id = max, "identifier counter initialized");
        let seeded = max.max(0);
        *last = Some(seeded);
        Ok(seeded)
    }

    /// Next real id for `table`. Strictly increasing per table, never repeats.
    ///
    /// If the max-id query fails nothing is cached, so the next call retries it.
    pub fn next_id(&self, table: &str) -> Result<RowId> {
        let counter = self.counter(table);
        let mut last = counter.lock();

        let current = self.current(table, &mut last)?;
        let next = current.checked_add(1).ok_or_else(|| Error::Allocation {
            table: table.to_string(),
            source: Box::new(Error::InvalidState("id space exhausted".to_string())),
        })?;
        *last = Some(next);
        Ok(RowId(next))
    }

    /// Fails unless `id` is at or below the last id this authority issued (or
    /// found stored) for `table`. A higher id would be handed out again later.
    pub fn check_issued(&self, table: &str, id: RowId) -> Result<()> {
        let counter = self.counter(table);
        let mut last = counter.lock();

        let current = self.current(table, &mut last)?;
        if id.0 > current {
            return Err(Error::consistency(table, ID_COLUMN, id.0, "id was never issued for this table"));
        }
        Ok(())
    }

    /// Last id handed out for `table`, if the counter has been initialized.
    pub fn last_id(&self, table: &str) -> Option<RowId> {
        let counters = self.counters.lock();
        let counter = counters.get(table)?;
        let last = *counter.lock();
        last.map(RowId)
    }
}
