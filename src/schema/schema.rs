use serde::{Serialize, Deserialize};
use crate::core::types::DOC_ID_COLUMN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Text,
    Number,
    Date,
    Boolean,
    /// Row id of another table. The target is named by `ColumnDef::master`.
    Reference,
}

/// Column definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub master: Option<String>,  // Target table of a fixed reference
}

/// Variable ("VTRef") reference: a table-code column plus a row-id column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VTRefDef {
    pub name: String,
    pub table_id_column: String,
    pub row_id_column: String,
    pub nullable: bool,
    pub master_tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Document,
    SubDocument { owner: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub kind: TableKind,
    pub table_code: i32,
    pub columns: Vec<ColumnDef>,
    pub vt_refs: Vec<VTRefDef>,
}

impl TableDef {
    pub fn document(name: &str, table_code: i32) -> Self {
        TableDef {
            name: name.to_string(),
            kind: TableKind::Document,
            table_code,
            columns: Vec::new(),
            vt_refs: Vec::new(),
        }
    }

    /// Sub-document table; gets the non-nullable `DocId` reference to `owner`.
    pub fn sub_document(name: &str, table_code: i32, owner: &str) -> Self {
        TableDef {
            name: name.to_string(),
            kind: TableKind::SubDocument { owner: owner.to_string() },
            table_code,
            columns: vec![ColumnDef {
                name: DOC_ID_COLUMN.to_string(),
                column_type: ColumnType::Reference,
                nullable: false,
                master: Some(owner.to_string()),
            }],
            vt_refs: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, column_type: ColumnType, nullable: bool) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            column_type,
            nullable,
            master: None,
        });
        self
    }

    pub fn reference(mut self, name: &str, master: &str, nullable: bool) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            column_type: ColumnType::Reference,
            nullable,
            master: Some(master.to_string()),
        });
        self
    }

    /// Declare a variable reference backed by `<name>Table` and `<name>Id` columns.
    pub fn vt_reference(mut self, name: &str, master_tables: &[&str], nullable: bool) -> Self {
        let table_id_column = format!("{}Table", name);
        let row_id_column = format!("{}Id", name);
        self = self
            .column(&table_id_column, ColumnType::Int, nullable)
            .column(&row_id_column, ColumnType::Int, nullable);
        self.vt_refs.push(VTRefDef {
            name: name.to_string(),
            table_id_column,
            row_id_column,
            nullable,
            master_tables: master_tables.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn owner(&self) -> Option<&str> {
        match &self.kind {
            TableKind::SubDocument { owner } => Some(owner),
            TableKind::Document => None,
        }
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn fixed_references(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.master.is_some())
    }
}

/// Document and sub-document type schema, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableDef>,
}

impl Schema {
    pub fn new() -> Self {
        Schema { tables: Vec::new() }
    }

    pub fn add_table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn get_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }
}
