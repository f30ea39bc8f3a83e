use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use crate::core::error::{Error, Result};
use crate::core::types::{RowId, ID_COLUMN};

/// Placeholder -> real id map for one table and one commit.
///
/// The reverse index is only needed by `is_added`, so it is built on first use.
#[derive(Debug, Clone, Default)]
pub struct TableIdPairs {
    pub table: String,
    forward: HashMap<RowId, RowId>,
    reverse: OnceLock<HashMap<RowId, RowId>>,
}

impl TableIdPairs {
    pub fn new(table: &str) -> Self {
        TableIdPairs {
            table: table.to_string(),
            forward: HashMap::new(),
            reverse: OnceLock::new(),
        }
    }

    pub fn insert(&mut self, old_id: RowId, new_id: RowId) -> Result<()> {
        if !old_id.is_placeholder() || !new_id.is_real() {
            return Err(Error::consistency(
                &self.table,
                ID_COLUMN,
                old_id.0,
                format!("cannot map {} to {}", old_id, new_id),
            ));
        }
        if self.forward.contains_key(&old_id) {
            return Err(Error::consistency(&self.table, ID_COLUMN, old_id.0, "placeholder mapped twice"));
        }
        if self.forward.values().any(|&v| v == new_id) {
            return Err(Error::consistency(&self.table, ID_COLUMN, new_id.0, "real id claimed by two placeholders"));
        }
        self.forward.insert(old_id, new_id);
        self.reverse = OnceLock::new();
        Ok(())
    }

    pub fn get(&self, old_id: RowId) -> Option<RowId> {
        self.forward.get(&old_id).copied()
    }

    /// True if `real_id` was issued to a row inserted by this commit.
    pub fn is_added(&self, real_id: RowId) -> bool {
        self.reverse_index().contains_key(&real_id)
    }

    pub fn placeholder_for(&self, real_id: RowId) -> Option<RowId> {
        self.reverse_index().get(&real_id).copied()
    }

    fn reverse_index(&self) -> &HashMap<RowId, RowId> {
        self.reverse
            .get_or_init(|| self.forward.iter().map(|(&old, &new)| (new, old)).collect())
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, RowId)> + '_ {
        self.forward.iter().map(|(&old, &new)| (old, new))
    }
}

/// All id maps produced by one commit. Tables without new rows are absent.
#[derive(Debug, Clone, Default)]
pub struct IdMaps {
    maps: BTreeMap<String, TableIdPairs>,
}

impl IdMaps {
    pub fn new() -> Self {
        IdMaps { maps: BTreeMap::new() }
    }

    pub fn insert(&mut self, pairs: TableIdPairs) {
        self.maps.insert(pairs.table.clone(), pairs);
    }

    pub fn get(&self, table: &str) -> Option<&TableIdPairs> {
        self.maps.get(table)
    }

    pub fn real_id(&self, table: &str, old_id: RowId) -> Option<RowId> {
        self.maps.get(table).and_then(|pairs| pairs.get(old_id))
    }

    pub fn is_added(&self, table: &str, id: RowId) -> bool {
        self.maps.get(table).is_some_and(|pairs| pairs.is_added(id))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn total_ids(&self) -> usize {
        self.maps.values().map(TableIdPairs::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_lookup_follows_inserts() {
        let mut pairs = TableIdPairs::new("Docs");
        pairs.insert(RowId(-1), RowId(101)).unwrap();
        assert!(pairs.is_added(RowId(101)));
        assert!(!pairs.is_added(RowId(102)));

        pairs.insert(RowId(-2), RowId(102)).unwrap();
        assert!(pairs.is_added(RowId(102)));
        assert_eq!(pairs.placeholder_for(RowId(102)), Some(RowId(-2)));
        assert_eq!(pairs.get(RowId(-1)), Some(RowId(101)));
    }

    #[test]
    fn mapping_is_one_to_one() {
        let mut pairs = TableIdPairs::new("Docs");
        pairs.insert(RowId(-1), RowId(5)).unwrap();
        assert!(pairs.insert(RowId(-1), RowId(6)).is_err());
        assert!(pairs.insert(RowId(-2), RowId(5)).is_err());
        assert!(pairs.insert(RowId(3), RowId(7)).is_err());
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn id_maps_answer_per_table() {
        let mut pairs = TableIdPairs::new("Docs");
        pairs.insert(RowId(-5), RowId(40)).unwrap();
        let mut maps = IdMaps::new();
        maps.insert(pairs);

        assert_eq!(maps.real_id("Docs", RowId(-5)), Some(RowId(40)));
        assert_eq!(maps.real_id("Lines", RowId(-5)), None);
        assert!(maps.is_added("Docs", RowId(40)));
        assert!(!maps.is_added("Lines", RowId(40)));
        assert_eq!(maps.total_ids(), 1);
    }
}
