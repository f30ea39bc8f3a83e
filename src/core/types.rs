use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};

/// Primary-key column every table carries.
pub const ID_COLUMN: &str = "Id";

/// Parent reference column carried by every sub-document table.
pub const DOC_ID_COLUMN: &str = "DocId";

/// Row identifier.
///
/// Negative values are placeholders handed out inside one change-set,
/// positive values are real ids issued by the identifier authority.
/// Zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub i64);

impl RowId {
    pub fn new(id: i64) -> Self {
        RowId(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 < 0
    }

    pub fn is_real(&self) -> bool {
        self.0 > 0
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId(id)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Number(f64),
    Date(DateTime<Utc>),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload, `None` for nulls and non-integer values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_row_id(&self) -> Option<RowId> {
        self.as_int().map(RowId)
    }
}

impl From<RowId> for Value {
    fn from(id: RowId) -> Self {
        Value::Int(id.0)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

/// One table row: its primary key plus named column values.
///
/// A column missing from `values` reads as `Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(id: RowId) -> Self {
        Row {
            id,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn get_row_id(&self, column: &str) -> Option<RowId> {
        self.get(column).as_row_id()
    }
}
