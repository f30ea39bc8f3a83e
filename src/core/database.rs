use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use crate::batch::change_set::{ChangeSet, RowState};
use crate::batch::id_map::IdMaps;
use crate::cache::row_cache::{CacheInvalidator, Invalidation, RowCache};
use crate::commit::deferred::DeferredWriteQueue;
use crate::commit::materializer::assign_real_ids;
use crate::commit::ordered_tables;
use crate::commit::rewriter::rewrite_references;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::hooks::{EngineHooks, NoHooks, SizeLimitAction, SizeLimitInfo};
use crate::core::stats::{CommitStats, DatabaseStats};
use crate::core::types::{Row, RowId, DOC_ID_COLUMN};
use crate::identity::authority::IdentifierAuthority;
use crate::lock::long_term::{LockConflict, LockScope, LongTermLock, LongTermLockList};
use crate::lock::short_term::CommitLock;
use crate::schema::catalog::ReferenceCatalog;
use crate::schema::schema::Schema;
use crate::storage::file_store::FileStore;
use crate::storage::store::RowStore;

/// Outcome of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitReport {
    pub id_maps: IdMaps,
    pub rows_written: usize,
    pub patches_applied: usize,
    pub invalidation: Invalidation,
}

/// One storage connection: schema catalog, identifier authority, locks and
/// the commit pipeline over a single `RowStore`.
pub struct Database {
    config: Config,
    schema: Schema,
    catalog: ReferenceCatalog,

    store: Arc<dyn RowStore>,
    authority: IdentifierAuthority,   // exactly one per store

    commit_lock: CommitLock,
    long_locks: LongTermLockList,

    hooks: Arc<dyn EngineHooks>,
    row_cache: Option<Arc<RowCache>>,
    invalidators: Vec<Arc<dyn CacheInvalidator>>,

    stats: CommitStats,
}

impl Database {
    pub fn open<S: RowStore + 'static>(schema: Schema, store: Arc<S>, config: Config) -> Result<Self> {
        Self::open_with_hooks(schema, store, config, Arc::new(NoHooks))
    }

    /// Open with hooks in place, so `before_init` sees the schema.
    pub fn open_with_hooks<S: RowStore + 'static>(
        schema: Schema,
        store: Arc<S>,
        config: Config,
        hooks: Arc<dyn EngineHooks>,
    ) -> Result<Self> {
        hooks.before_init(&schema)?;
        let catalog = ReferenceCatalog::build(&schema)?;

        let authority = IdentifierAuthority::new(store.clone());
        let store: Arc<dyn RowStore> = store;

        let row_cache = RowCache::new(config.row_cache_capacity).map(Arc::new);
        let mut invalidators: Vec<Arc<dyn CacheInvalidator>> = Vec::new();
        if let Some(cache) = &row_cache {
            invalidators.push(cache.clone());
        }

        info!(
            tables = schema.tables.len(),
            order = ?catalog.processing_order(),
            "database opened"
        );

        Ok(Database {
            config,
            schema,
            catalog,
            store,
            authority,
            commit_lock: CommitLock::new(),
            long_locks: LongTermLockList::new(),
            hooks,
            row_cache,
            invalidators,
            stats: CommitStats::new(),
        })
    }

    /// Open over a `FileStore` at `config.storage_path`.
    pub fn open_file_store(schema: Schema, config: Config) -> Result<Self> {
        let store = Arc::new(FileStore::open(config.storage_path.clone(), config.sync_mode)?);
        Self::open(schema, store, config)
    }

    /// Replace the hooks consulted after opening.
    pub fn with_hooks(mut self, hooks: Arc<dyn EngineHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidators.push(invalidator);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &dyn RowStore {
        self.store.as_ref()
    }

    pub fn long_locks(&self) -> &LongTermLockList {
        &self.long_locks
    }

    pub fn new_change_set(&self) -> ChangeSet {
        ChangeSet::new()
    }

    /// Allocate a real id outside a commit, e.g. for rows written by other means.
    pub fn next_id(&self, table: &str) -> Result<RowId> {
        self.catalog.table(table)?;
        self.authority.next_id(table)
    }

    pub fn register_lock(&self, scope: LockScope, owner: &str) -> Result<Uuid> {
        self.long_locks.register(scope, owner)
    }

    pub fn release_lock(&self, token: Uuid) -> bool {
        self.long_locks.release(token)
    }

    /// Read one persisted row, through the row cache when enabled.
    pub fn get_row(&self, table: &str, id: RowId) -> Result<Option<Row>> {
        self.catalog.table(table)?;
        match &self.row_cache {
            Some(cache) => cache.get_or_load(self.store.as_ref(), table, id),
            None => self.store.load_row(table, id),
        }
    }

    pub fn stats(&self) -> DatabaseStats {
        self.stats.snapshot(self.row_cache.as_ref().map(|c| c.stats()))
    }

    /// Persist `change_set` as one storage transaction.
    ///
    /// On success the caller's change-set holds real ids and resolved
    /// references, and every row is `Unchanged`. On failure it is left
    /// exactly as it was passed in.
    ///
    /// Long-term locks are checked before the commit lock is taken, so a
    /// lock registered in between is not seen by this commit.
    pub fn commit(&self, change_set: &mut ChangeSet, session: Option<&str>) -> Result<CommitReport> {
        let result = self.commit_inner(change_set, session);
        if let Err(err) = &result {
            self.stats.record_failure(err.is_conflict());
            warn!(session = session.unwrap_or("-"), error = %err, "commit failed");
        }
        result
    }

    fn commit_inner(&self, change_set: &mut ChangeSet, session: Option<&str>) -> Result<CommitReport> {
        let order = ordered_tables(change_set, &self.catalog)?;
        if change_set.is_empty() {
            return Ok(CommitReport {
                id_maps: IdMaps::new(),
                rows_written: 0,
                patches_applied: 0,
                invalidation: Invalidation::new(),
            });
        }

        if self.config.check_long_locks_on_commit {
            self.check_long_locks(change_set, session)?;
        }

        let guard = self.commit_lock.acquire();
        let mut resolved = change_set.clone();

        let id_maps = assign_real_ids(&mut resolved, &self.catalog, &self.authority)?;
        let deferred = rewrite_references(&mut resolved, &id_maps, &self.catalog)?;

        self.store.begin()?;
        let (rows_written, invalidation) = match self.write(&resolved, &order, &deferred) {
            Ok(written) => written,
            Err(err) => {
                self.rollback();
                return Err(err);
            }
        };
        if let Err(err) = self.store.commit() {
            self.rollback();
            return Err(err);
        }

        debug!(ticket = guard.ticket, "storage transaction committed");
        drop(guard);

        deferred.apply_to(&mut resolved);
        resolved.accept_changes()?;
        *change_set = resolved;

        for invalidator in &self.invalidators {
            invalidator.invalidate(&invalidation);
        }
        self.stats.record_commit(id_maps.total_ids(), rows_written, deferred.len());
        info!(
            session = session.unwrap_or("-"),
            ids = id_maps.total_ids(),
            rows = rows_written,
            patches = deferred.len(),
            "commit complete"
        );

        Ok(CommitReport {
            id_maps,
            rows_written,
            patches_applied: deferred.len(),
            invalidation,
        })
    }

    fn rollback(&self) {
        if let Err(err) = self.store.rollback() {
            error!(error = %err, "storage rollback failed");
        }
    }

    // Deletes in reverse processing order, then inserts and updates in
    // processing order, then the deferred patches.
    fn write(
        &self,
        change_set: &ChangeSet,
        order: &[String],
        deferred: &DeferredWriteQueue,
    ) -> Result<(usize, Invalidation)> {
        let mut invalidation = Invalidation::new();
        let mut rows_written = 0;

        for table in order.iter().rev() {
            let Some(batch) = change_set.table(table) else { continue };
            for entry in batch.rows().filter(|e| e.state == RowState::Deleted) {
                self.store.delete_row(table, entry.row.id)?;
                invalidation.add(table, entry.row.id);
                rows_written += 1;
            }
        }

        for table in order {
            let Some(batch) = change_set.table(table) else { continue };
            for entry in batch.rows() {
                match entry.state {
                    RowState::Inserted => self.store.insert_row(table, &entry.row)?,
                    RowState::Modified => self.store.update_row(table, &entry.row)?,
                    RowState::Unchanged | RowState::Deleted => continue,
                }
                invalidation.add(table, entry.row.id);
                rows_written += 1;
            }
        }

        deferred.apply(self.store.as_ref())?;
        for patch in deferred.iter() {
            invalidation.add(&patch.table, patch.row_id);
        }

        self.check_size_limit()?;
        Ok((rows_written, invalidation))
    }

    fn check_size_limit(&self) -> Result<()> {
        let Some(limit) = self.config.max_store_rows else {
            return Ok(());
        };
        let rows = self.store.total_rows()?;
        if rows <= limit {
            return Ok(());
        }
        match self.hooks.size_limit_exceeded(&SizeLimitInfo { rows, limit }) {
            SizeLimitAction::Reject => Err(Error::SizeLimitExceeded { rows, limit }),
            SizeLimitAction::Allow => {
                warn!(rows, limit, "size limit exceeded, commit allowed by hook");
                Ok(())
            }
        }
    }

    /// Fail with a conflict if another session holds a long-term lock on a
    /// row this change-set modifies or deletes, or on the owner document of
    /// a changed sub-document row.
    fn check_long_locks(&self, change_set: &ChangeSet, session: Option<&str>) -> Result<()> {
        if self.long_locks.is_empty() {
            return Ok(());
        }
        let scope = self.touched_scope(change_set)?;
        if scope.is_empty() {
            return Ok(());
        }
        match self.long_locks.find_conflict(&scope, session) {
            None => Ok(()),
            Some(existing) => Err(LockConflict {
                existing,
                requested: LongTermLock {
                    token: Uuid::nil(),
                    owner: session.unwrap_or_default().to_string(),
                    scope,
                    created_at: Utc::now(),
                },
            }
            .into()),
        }
    }

    fn touched_scope(&self, change_set: &ChangeSet) -> Result<LockScope> {
        let mut scope = LockScope::new();
        for batch in change_set.tables() {
            let owner = self.catalog.table(batch.name())?.owner();

            let existing = batch
                .rows()
                .filter(|e| matches!(e.state, RowState::Modified | RowState::Deleted))
                .map(|e| e.row.id);
            scope.add_rows(batch.name(), existing);

            if let Some(owner) = owner {
                let documents = batch
                    .rows()
                    .filter(|e| e.state != RowState::Unchanged)
                    .filter_map(|e| e.row.get_row_id(DOC_ID_COLUMN))
                    .filter(|id| id.is_real());
                scope.add_rows(owner, documents);
            }
        }
        Ok(scope)
    }
}
