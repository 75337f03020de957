//! Error taxonomy for the loader.
//!
//! Only `LoadError::Connection` (and a failing resume query at startup) ever
//! reaches the caller of `Loader::run`. Row, batch and year errors are
//! absorbed where they happen and surface in logs and the run summary.

use std::path::PathBuf;

use thiserror::Error;

use crate::columns::CanonicalField;

/// Failures raised by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("constraint violation on {table}: {detail}")]
    Constraint { table: &'static str, detail: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    /// Non-fatal: the field is NULL for every row of the file.
    #[error("no column for '{field}' in {path}")]
    MissingColumn { field: CanonicalField, path: PathBuf },

    /// Non-fatal, row-scoped: the row is dropped from the fact load.
    #[error("line {line}: {reason}")]
    RowParse { line: usize, reason: String },

    /// Recoverable, batch-scoped: the batch was rolled back.
    #[error("{table} batch {batch} (rows {start}..{end}) rolled back: {source}")]
    BatchWrite {
        table: &'static str,
        batch: usize,
        start: usize,
        end: usize,
        #[source]
        source: StoreError,
    },

    /// Recoverable, year-scoped: the year is marked failed.
    #[error("fiscal year {year}: {reason}")]
    YearLoad { year: i32, reason: String },

    #[error("cannot read {path}: {reason}")]
    Source { path: PathBuf, reason: String },

    /// Fatal: nothing is attempted.
    #[error("backing store unreachable: {0}")]
    Connection(#[source] StoreError),
}

impl LoadError {
    pub fn source_file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        LoadError::Source {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
