//! Error types for record store operations.

use crate::schema::{ColumnType, RowId, Table};
use std::io;
use thiserror::Error;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with this id already exists.
    #[error("row {row} already exists in {table}")]
    Conflict {
        /// The table that was written.
        table: Table,
        /// The conflicting row id.
        row: RowId,
    },

    /// The table name is not part of the schema.
    #[error("unknown table: {name}")]
    UnknownTable {
        /// The name that failed to resolve.
        name: String,
    },

    /// The column is not declared by the table.
    #[error("unknown column {column} in {table}")]
    UnknownColumn {
        /// The table that was addressed.
        table: Table,
        /// The offending column name.
        column: String,
    },

    /// A value does not fit the column's declared type.
    #[error("type mismatch for {table}.{column}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The table that was addressed.
        table: Table,
        /// The column that was written.
        column: String,
        /// The declared column type.
        expected: ColumnType,
        /// The kind of value that was supplied.
        found: &'static str,
    },

    /// A non-nullable column has no value.
    #[error("missing value for {table}.{column}")]
    MissingColumn {
        /// The table that was addressed.
        table: Table,
        /// The column without a value.
        column: String,
    },

    /// The `_id` column disagrees with the addressed row.
    #[error("id mismatch in {table}: row {expected}, _id {actual}")]
    IdMismatch {
        /// The table that was addressed.
        table: Table,
        /// The row id the write targeted.
        expected: RowId,
        /// The `_id` value supplied.
        actual: RowId,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding or decoding a persisted snapshot failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(
        table: Table,
        column: impl Into<String>,
        expected: ColumnType,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            table,
            column: column.into(),
            expected,
            found,
        }
    }

    /// Creates an unknown column error.
    pub fn unknown_column(table: Table, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table,
            column: column.into(),
        }
    }

    /// Returns true if this error is caused by the data that was written
    /// rather than by the environment.
    pub fn is_data_error(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_table_and_row() {
        let err = StoreError::Conflict {
            table: Table::Categories,
            row: 7,
        };
        assert_eq!(err.to_string(), "row 7 already exists in categories");
        assert!(err.is_data_error());
    }

    #[test]
    fn io_errors_are_environmental() {
        let err = StoreError::from(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(!err.is_data_error());
    }
}
