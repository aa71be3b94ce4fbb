use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by database operations.
///
/// Every failure reaches the caller; nothing is retried or swallowed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open database at {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to read column metadata for table {table}")]
    Introspection {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("column {column} does not exist in table {table}")]
    MissingColumn { table: String, column: String },
    #[error("got {values} values for {columns} columns")]
    ValueCount { columns: usize, values: usize },
    #[error("value {value:?} for column {column} is not a number")]
    InvalidNumber { column: String, value: String },
    #[error("failed to execute statement: {statement}")]
    Execution {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("row function failed")]
    RowHandler(#[source] anyhow::Error),
    #[error("failed to close database connection")]
    Close(#[source] rusqlite::Error),
    #[error("database connection is closed")]
    Closed,
}

impl Error {
    pub(crate) fn execution(statement: &str, source: rusqlite::Error) -> Self {
        Self::Execution {
            statement: statement.to_string(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
