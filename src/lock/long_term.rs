use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use tracing::debug;
use uuid::Uuid;
use crate::core::error::{Error, Result};
use crate::core::types::RowId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableScope {
    /// Every row of the table.
    All,
    Rows(BTreeSet<RowId>),
}

impl TableScope {
    fn intersects(&self, other: &TableScope) -> bool {
        match (self, other) {
            (TableScope::All, _) | (_, TableScope::All) => true,
            (TableScope::Rows(a), TableScope::Rows(b)) => {
                let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
                small.iter().any(|id| large.contains(id))
            }
        }
    }
}

/// Set of documents / sub-documents (or whole tables) a lock protects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockScope {
    tables: BTreeMap<String, TableScope>,
}

impl LockScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(table: &str, id: RowId) -> Self {
        Self::new().with_rows(table, [id])
    }

    pub fn with_rows(mut self, table: &str, ids: impl IntoIterator<Item = RowId>) -> Self {
        self.add_rows(table, ids);
        self
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.tables.insert(table.to_string(), TableScope::All);
        self
    }

    pub fn add_rows(&mut self, table: &str, ids: impl IntoIterator<Item = RowId>) {
        let mut ids = ids.into_iter().peekable();
        if ids.peek().is_none() {
            return;
        }
        match self
            .tables
            .entry(table.to_string())
            .or_insert_with(|| TableScope::Rows(BTreeSet::new()))
        {
            TableScope::All => {}
            TableScope::Rows(rows) => rows.extend(ids),
        }
    }

    pub fn intersects(&self, other: &LockScope) -> bool {
        self.tables
            .iter()
            .any(|(table, scope)| other.tables.get(table).is_some_and(|o| scope.intersects(o)))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, table: &str) -> Option<&TableScope> {
        self.tables.get(table)
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (table, scope) in &self.tables {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match scope {
                TableScope::All => write!(f, "{}[*]", table)?,
                TableScope::Rows(ids) => {
                    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                    write!(f, "{}[{}]", table, ids.join(","))?
                }
            }
        }
        Ok(())
    }
}

/// Explicit, caller-held reservation. Active until released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTermLock {
    pub token: Uuid,
    pub owner: String,
    pub scope: LockScope,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for LongTermLock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "lock {} held by '{}' on {}", self.token, self.owner, self.scope)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConflict {
    pub existing: LongTermLock,
    pub requested: LongTermLock,
}

impl fmt::Display for LockConflict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "lock conflict: '{}' requested {} but {}",
            self.requested.owner, self.requested.scope, self.existing
        )
    }
}

/// Registry of long-term locks. Registration fails instead of waiting.
#[derive(Default)]
pub struct LongTermLockList {
    locks: Mutex<Vec<LongTermLock>>,
}

impl LongTermLockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lock under a fresh token.
    pub fn register(&self, scope: LockScope, owner: &str) -> Result<Uuid> {
        let token = Uuid::new_v4();
        self.register_with_token(scope, token, owner)?;
        Ok(token)
    }

    pub fn register_with_token(&self, scope: LockScope, token: Uuid, owner: &str) -> Result<()> {
        if scope.is_empty() {
            return Err(Error::InvalidArgument("lock scope is empty".to_string()));
        }
        let requested = LongTermLock {
            token,
            owner: owner.to_string(),
            scope,
            created_at: Utc::now(),
        };

        let mut locks = self.locks.lock();
        if locks.iter().any(|l| l.token == token) {
            return Err(Error::InvalidArgument(format!("lock token {} already registered", token)));
        }
        if let Some(existing) = locks.iter().find(|l| l.scope.intersects(&requested.scope)) {
            debug!(existing = %existing.token, requested = %token, owner, "long-term lock conflict");
            return Err(LockConflict { existing: existing.clone(), requested }.into());
        }
        debug!(token = %token, owner, scope = %requested.scope, "long-term lock registered");
        locks.push(requested);
        Ok(())
    }

    /// Release by token. Returns false if no such lock is registered.
    pub fn release(&self, token: Uuid) -> bool {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|l| l.token != token);
        let released = locks.len() != before;
        if released {
            debug!(token = %token, "long-term lock released");
        }
        released
    }

    /// First lock not owned by `owner` whose scope intersects `scope`.
    pub fn find_conflict(&self, scope: &LockScope, owner: Option<&str>) -> Option<LongTermLock> {
        self.locks
            .lock()
            .iter()
            .find(|l| owner != Some(l.owner.as_str()) && l.scope.intersects(scope))
            .cloned()
    }

    pub fn get(&self, token: Uuid) -> Option<LongTermLock> {
        self.locks.lock().iter().find(|l| l.token == token).cloned()
    }

    pub fn locks(&self) -> Vec<LongTermLock> {
        self.locks.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_rows_conflict() {
        let list = LongTermLockList::new();
        let first = list.register(LockScope::document("Orders", RowId(10)), "alice").unwrap();

        let err = list
            .register(LockScope::new().with_rows("Orders", [RowId(9), RowId(10)]), "bob")
            .unwrap_err();
        assert!(err.is_conflict());
        match err {
            Error::LockConflict(conflict) => {
                assert_eq!(conflict.existing.token, first);
                assert_eq!(conflict.requested.owner, "bob");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn disjoint_scopes_coexist() {
        let list = LongTermLockList::new();
        list.register(LockScope::document("Orders", RowId(1)), "alice").unwrap();
        list.register(LockScope::document("Orders", RowId(2)), "bob").unwrap();
        list.register(LockScope::document("Clients", RowId(1)), "carol").unwrap();
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn whole_table_scope_covers_every_row() {
        let list = LongTermLockList::new();
        list.register(LockScope::new().with_table("Orders"), "alice").unwrap();
        assert!(list.register(LockScope::document("Orders", RowId(77)), "bob").is_err());
        assert!(list.find_conflict(&LockScope::document("Orders", RowId(3)), Some("alice")).is_none());
        assert!(list.find_conflict(&LockScope::document("Orders", RowId(3)), Some("bob")).is_some());
    }

    #[test]
    fn release_is_idempotent() {
        let list = LongTermLockList::new();
        let token = list.register(LockScope::document("Orders", RowId(1)), "alice").unwrap();
        assert!(list.release(token));
        assert!(!list.release(token));
        assert!(list.is_empty());
    }

    #[test]
    fn empty_scope_and_reused_token_are_rejected() {
        let list = LongTermLockList::new();
        assert!(list.register(LockScope::new(), "alice").is_err());

        let token = Uuid::new_v4();
        list.register_with_token(LockScope::document("A", RowId(1)), token, "alice").unwrap();
        let err = list.register_with_token(LockScope::document("B", RowId(1)), token, "alice").unwrap_err();
        assert!(!err.is_conflict());
    }

    #[test]
    fn scope_display_lists_rows() {
        let scope = LockScope::new().with_rows("Orders", [RowId(2), RowId(1)]).with_table("Clients");
        assert_eq!(scope.to_string(), "Clients[*], Orders[1,2]");
    }
}
