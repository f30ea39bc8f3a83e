use thiserror::Error;
use crate::lock::long_term::LockConflict;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    InvalidState,
    Schema,
    Reference,
    Allocation,
    Conflict,
    Consistency,
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    /// A declared reference or table is malformed. Raised while building the catalog.
    #[error("schema definition error in table '{table}': {detail}")]
    SchemaDefinition { table: String, detail: String },

    /// A variable reference is half populated or names a table it may not point at.
    #[error("ambiguous reference {table}.{column} on row {row_id}: {detail}")]
    ReferentialAmbiguity {
        table: String,
        column: String,
        row_id: i64,
        detail: String,
    },

    /// The max-id query behind the identifier authority failed. No id was issued.
    #[error("id allocation failed for table '{table}': {source}")]
    Allocation {
        table: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    LockConflict(Box<LockConflict>),

    /// Should not happen in correct operation.
    #[error("consistency violation in {table}.{column} (id {id}): {detail}")]
    ConsistencyViolation {
        table: String,
        column: String,
        id: i64,
        detail: String,
    },

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("stale row handle for table '{table}'")]
    StaleHandle { table: String },

    #[error("database size limit exceeded: {rows} rows, limit {limit}")]
    SizeLimitExceeded { rows: u64, limit: u64 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SchemaDefinition { .. } => ErrorKind::Schema,
            Error::ReferentialAmbiguity { .. } => ErrorKind::Reference,
            Error::Allocation { .. } => ErrorKind::Allocation,
            Error::LockConflict(_) => ErrorKind::Conflict,
            Error::ConsistencyViolation { .. } => ErrorKind::Consistency,
            Error::UnknownTable(_) => ErrorKind::NotFound,
            Error::StaleHandle { .. } | Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::SizeLimitExceeded { .. } => ErrorKind::InvalidState,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Storage(_) => ErrorKind::Internal,
            Error::Io(_) => ErrorKind::Io,
            Error::Encode(_) | Error::Config(_) => ErrorKind::Parse,
        }
    }

    /// Lock conflicts are expected control flow, everything else is a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::LockConflict(_))
    }

    pub(crate) fn schema(table: &str, detail: impl Into<String>) -> Self {
        Error::SchemaDefinition {
            table: table.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn ambiguous(table: &str, column: &str, row_id: i64, detail: impl Into<String>) -> Self {
        Error::ReferentialAmbiguity {
            table: table.to_string(),
            column: column.to_string(),
            row_id,
            detail: detail.into(),
        }
    }

    pub(crate) fn consistency(table: &str, column: &str, id: i64, detail: impl Into<String>) -> Self {
        Error::ConsistencyViolation {
            table: table.to_string(),
            column: column.to_string(),
            id,
            detail: detail.into(),
        }
    }
}

impl From<LockConflict> for Error {
    fn from(conflict: LockConflict) -> Self {
        Error::LockConflict(Box::new(conflict))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_error_keeps_its_source() {
        let err = Error::Allocation {
            table: "Docs".into(),
            source: Box::new(Error::Storage("max id query failed".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Allocation);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("Docs"));
    }

    #[test]
    fn reference_errors_name_table_column_and_id() {
        let err = Error::ambiguous("Orders", "RefTable", 12, "row id column is empty");
        let text = err.to_string();
        assert!(text.contains("Orders.RefTable"));
        assert!(text.contains("12"));
        assert!(!err.is_conflict());
    }
}
