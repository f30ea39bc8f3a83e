use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::core::types::DOC_ID_COLUMN;
use crate::schema::schema::{Schema, TableDef, TableKind};

/// Fixed reference column pointing into some table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedRef {
    pub source_table: String,
    pub column: String,
    pub nullable: bool,
}

impl FixedRef {
    /// The `DocId` link of a sub-document row to its owning document.
    pub fn is_owner_link(&self) -> bool {
        self.column == DOC_ID_COLUMN
    }
}

/// Variable reference that may point into some table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub source_table: String,
    pub name: String,
    pub table_id_column: String,
    pub row_id_column: String,
    pub nullable: bool,
    pub master_tables: Vec<String>,
}

impl VariableRef {
    pub fn permits(&self, table: &str) -> bool {
        self.master_tables.iter().any(|t| t == table)
    }
}

/// Everything that can reference one table.
#[derive(Debug, Clone, Default)]
pub struct IncomingRefs {
    pub fixed: Vec<FixedRef>,
    pub variable: Vec<Arc<VariableRef>>,
}

impl IncomingRefs {
    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty() && self.variable.is_empty()
    }
}

/// Immutable reference index built once from the schema.
///
/// Indexed by *target* table: "if this table's ids change, which columns
/// must be revisited". Also fixes the table processing order used by the
/// commit pipeline.
#[derive(Debug)]
pub struct ReferenceCatalog {
    tables: Vec<TableDef>,
    by_name: HashMap<String, usize>,
    by_code: HashMap<i32, usize>,
    incoming: HashMap<String, IncomingRefs>,
    outgoing_variable: HashMap<String, Vec<Arc<VariableRef>>>,
    order: Vec<String>,
    position: HashMap<String, usize>,
    empty: IncomingRefs,
}

impl ReferenceCatalog {
    pub fn build(schema: &Schema) -> Result<Self> {
        let mut by_name = HashMap::new();
        let mut by_code = HashMap::new();

        for (i, table) in schema.tables.iter().enumerate() {
            if by_name.insert(table.name.clone(), i).is_some() {
                return Err(Error::schema(&table.name, "table declared twice"));
            }
            if let Some(other) = by_code.insert(table.table_code, i) {
                return Err(Error::schema(
                    &table.name,
                    format!("table code {} already used by '{}'", table.table_code, schema.tables[other].name),
                ));
            }
        }

        let mut incoming: HashMap<String, IncomingRefs> = HashMap::new();
        let mut outgoing_variable: HashMap<String, Vec<Arc<VariableRef>>> = HashMap::new();

        for table in &schema.tables {
            if let TableKind::SubDocument { owner } = &table.kind {
                match by_name.get(owner).map(|&i| &schema.tables[i].kind) {
                    Some(TableKind::Document) => {}
                    Some(TableKind::SubDocument { .. }) => {
                        return Err(Error::schema(&table.name, format!("owner '{}' is not a document table", owner)));
                    }
                    None => {
                        return Err(Error::schema(&table.name, format!("unknown owner table '{}'", owner)));
                    }
                }
            }

            let mut seen = HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(Error::schema(&table.name, format!("column '{}' declared twice", column.name)));
                }
            }

            for column in table.fixed_references() {
                let Some(master) = column.master.as_deref() else { continue };
                if !by_name.contains_key(master) {
                    return Err(Error::schema(
                        &table.name,
                        format!("column '{}' references unknown table '{}'", column.name, master),
                    ));
                }
                incoming.entry(master.to_string()).or_default().fixed.push(FixedRef {
                    source_table: table.name.clone(),
                    column: column.name.clone(),
                    nullable: column.nullable,
                });
            }

            for vt in &table.vt_refs {
                if vt.master_tables.is_empty() {
                    return Err(Error::schema(&table.name, format!("variable reference '{}' permits no tables", vt.name)));
                }
                for column in [&vt.table_id_column, &vt.row_id_column] {
                    if table.get_column(column).is_none() {
                        return Err(Error::schema(
                            &table.name,
                            format!("variable reference '{}' uses undeclared column '{}'", vt.name, column),
                        ));
                    }
                }
                let info = Arc::new(VariableRef {
                    source_table: table.name.clone(),
                    name: vt.name.clone(),
                    table_id_column: vt.table_id_column.clone(),
                    row_id_column: vt.row_id_column.clone(),
                    nullable: vt.nullable,
                    master_tables: vt.master_tables.clone(),
                });
                for master in &vt.master_tables {
                    if !by_name.contains_key(master) {
                        return Err(Error::schema(
                            &table.name,
                            format!("variable reference '{}' names unknown table '{}'", vt.name, master),
                        ));
                    }
                    incoming.entry(master.clone()).or_default().variable.push(info.clone());
                }
                outgoing_variable.entry(table.name.clone()).or_default().push(info);
            }
        }

        let order = processing_order(schema, &by_name);
        let position = order.iter().enumerate().map(|(i, name)| (name.clone(), i)).collect();

        Ok(ReferenceCatalog {
            tables: schema.tables.clone(),
            by_name,
            by_code,
            incoming,
            outgoing_variable,
            order,
            position,
            empty: IncomingRefs::default(),
        })
    }

    /// Fixed and variable references that may target `table`. Empty, never absent.
    pub fn references_into(&self, table: &str) -> &IncomingRefs {
        self.incoming.get(table).unwrap_or(&self.empty)
    }

    /// Variable references declared on `table` itself.
    pub fn variable_refs_from(&self, table: &str) -> &[Arc<VariableRef>] {
        self.outgoing_variable.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn table(&self, name: &str) -> Result<&TableDef> {
        self.by_name
            .get(name)
            .map(|&i| &self.tables[i])
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn table_code(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).map(|&i| self.tables[i].table_code)
    }

    pub fn table_for_code(&self, code: i64) -> Option<&str> {
        let code = i32::try_from(code).ok()?;
        self.by_code.get(&code).map(|&i| self.tables[i].name.as_str())
    }

    /// Tables in the order the commit pipeline visits and persists them.
    pub fn processing_order(&self) -> &[String] {
        &self.order
    }

    pub fn position(&self, table: &str) -> Option<usize> {
        self.position.get(table).copied()
    }

    /// True when `master` rows are persisted strictly before `source` rows,
    /// so a reference from `source` to `master` can be written in place.
    pub fn is_immediate(&self, source: &str, master: &str) -> bool {
        match (self.position(source), self.position(master)) {
            (Some(s), Some(m)) => m < s,
            _ => false,
        }
    }
}

// Kahn order over "master before source" and "owner before sub-document"
// edges, ties broken by declaration order. Cycles are cut at the first
// remaining table whose owner is already placed.
fn processing_order(schema: &Schema, by_name: &HashMap<String, usize>) -> Vec<String> {
    let n = schema.tables.len();
    let mut deps: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut owner_of: Vec<Option<usize>> = vec![None; n];

    for (i, table) in schema.tables.iter().enumerate() {
        if let Some(owner) = table.owner() {
            owner_of[i] = by_name.get(owner).copied();
        }
        for column in table.fixed_references() {
            if let Some(&m) = column.master.as_deref().and_then(|m| by_name.get(m)) {
                if m != i {
                    deps[i].insert(m);
                }
            }
        }
    }

    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let ready = (0..n).find(|&i| !placed[i] && deps[i].iter().all(|&d| placed[d]));
        let next = match ready {
            Some(i) => i,
            None => {
                let Some(i) = (0..n).find(|&i| !placed[i] && owner_of[i].is_none_or(|o| placed[o])) else {
                    break;
                };
                debug!(table = %schema.tables[i].name, "reference cycle, remaining references become deferred");
                i
            }
        };
        placed[next] = true;
        order.push(schema.tables[next].name.clone());
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::schema::schema::ColumnType;

    fn schema() -> Schema {
        Schema::new()
            .add_table(
                TableDef::document("Tasks", 30)
                    .column("Title", ColumnType::Text, false)
                    .vt_reference("Subject", &["Orders", "Clients"], true),
            )
            .add_table(TableDef::sub_document("Lines", 11, "Orders").reference("Product", "Products", true))
            .add_table(TableDef::document("Orders", 10).reference("Client", "Clients", false))
            .add_table(TableDef::document("Clients", 20))
            .add_table(TableDef::document("Products", 40))
    }

    #[test]
    fn indexes_references_by_target_table() {
        let catalog = ReferenceCatalog::build(&schema()).unwrap();

        let into_orders = catalog.references_into("Orders");
        assert_eq!(into_orders.fixed.len(), 1);
        assert!(into_orders.fixed[0].is_owner_link());
        assert_eq!(into_orders.variable.len(), 1);
        assert_eq!(into_orders.variable[0].source_table, "Tasks");

        let into_clients = catalog.references_into("Clients");
        assert_eq!(into_clients.fixed[0].source_table, "Orders");
        assert_eq!(into_clients.fixed[0].column, "Client");
        assert!(!into_clients.fixed[0].nullable);

        assert!(catalog.references_into("Tasks").is_empty());
        assert!(catalog.references_into("NoSuchTable").is_empty());
    }

    #[test]
    fn processing_order_puts_masters_and_owners_first() {
        let catalog = ReferenceCatalog::build(&schema()).unwrap();
        let pos = |t: &str| catalog.position(t).unwrap();

        assert!(pos("Clients") < pos("Orders"));
        assert!(pos("Orders") < pos("Lines"));
        assert!(pos("Products") < pos("Lines"));
        assert!(catalog.is_immediate("Lines", "Orders"));
        assert!(!catalog.is_immediate("Orders", "Lines"));
        // Tasks has only a variable reference, so declaration order wins.
        assert_eq!(catalog.processing_order()[0], "Tasks");
    }

    #[test]
    fn cycles_and_self_references_are_cut_deterministically() {
        let schema = Schema::new()
            .add_table(TableDef::document("A", 1).reference("B", "B", true))
            .add_table(TableDef::document("B", 2).reference("A", "A", true).reference("Parent", "B", true))
            .add_table(TableDef::sub_document("BItems", 3, "B"));
        let catalog = ReferenceCatalog::build(&schema).unwrap();

        assert_eq!(catalog.processing_order(), ["A", "B", "BItems"]);
        assert!(!catalog.is_immediate("A", "B"));
        assert!(catalog.is_immediate("B", "A"));
        assert!(!catalog.is_immediate("B", "B"));
    }

    #[test]
    fn unknown_master_table_fails_fast() {
        let schema = Schema::new().add_table(TableDef::document("Orders", 1).reference("Client", "Clients", false));
        let err = ReferenceCatalog::build(&schema).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.to_string().contains("Clients"));

        let schema = Schema::new().add_table(TableDef::document("Tasks", 1).vt_reference("Subject", &["Nowhere"], true));
        assert_eq!(ReferenceCatalog::build(&schema).unwrap_err().kind(), ErrorKind::Schema);
    }

    #[test]
    fn duplicate_codes_and_bad_owners_are_rejected() {
        let dup = Schema::new()
            .add_table(TableDef::document("A", 1))
            .add_table(TableDef::document("B", 1));
        assert!(ReferenceCatalog::build(&dup).is_err());

        let nested = Schema::new()
            .add_table(TableDef::document("A", 1))
            .add_table(TableDef::sub_document("B", 2, "A"))
            .add_table(TableDef::sub_document("C", 3, "B"));
        assert!(ReferenceCatalog::build(&nested).is_err());
    }

    #[test]
    fn table_codes_resolve_both_ways() {
        let catalog = ReferenceCatalog::build(&schema()).unwrap();
        assert_eq!(catalog.table_code("Orders"), Some(10));
        assert_eq!(catalog.table_for_code(20), Some("Clients"));
        assert_eq!(catalog.table_for_code(99), None);
        assert_eq!(catalog.table_for_code(i64::MAX), None);
        assert_eq!(catalog.variable_refs_from("Tasks").len(), 1);
        assert!(catalog.variable_refs_from("Orders").is_empty());
    }
}
