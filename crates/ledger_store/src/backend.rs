//! Record store trait definition.

use crate::cell::{Cell, Cells};
use crate::error::StoreResult;
use crate::record::Record;
use crate::schema::{RowId, Table};

/// Selects records of a table in [`RecordStore::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every record.
    All,
    /// Records whose column equals the value.
    Equals {
        /// Column to compare.
        column: String,
        /// Expected value.
        value: Cell,
    },
}

impl Filter {
    /// Builds an equality filter.
    pub fn equals(column: impl Into<String>, value: impl Into<Cell>) -> Self {
        Self::Equals {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Returns true if the record is selected.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Equals { column, value } => record.get(column).is_ok_and(|cell| cell == *value),
        }
    }
}

/// Typed record storage consumed by the sync core.
///
/// Stores know tables and rows only. Revisions, journals and leases are kept
/// by `ledger_core` next to the store, never inside it.
///
/// # Invariants
///
/// - A `(table, row)` pair holds at most one record
/// - `update` and `delete` report affected rows, 0 when the row is absent
/// - A failed call leaves the store unchanged
/// - `query` returns records ordered by row id
///
/// # Implementors
///
/// - [`super::MemoryStore`]
pub trait RecordStore: Send + Sync {
    /// Inserts a new record built from `cells` at `row`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Conflict`] if the row exists, or a
    /// schema error if `cells` does not describe a valid record.
    fn insert(&mut self, table: Table, row: RowId, cells: &Cells) -> StoreResult<RowId>;

    /// Overwrites the named columns of an existing record.
    ///
    /// Returns the number of rows affected: 1 if the row exists, else 0.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a column is unknown or a value does not fit.
    fn update(&mut self, table: Table, row: RowId, cells: &Cells) -> StoreResult<usize>;

    /// Removes a record, returning the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn delete(&mut self, table: Table, row: RowId) -> StoreResult<usize>;

    /// Reads a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn get(&self, table: Table, row: RowId) -> StoreResult<Option<Record>>;

    /// Returns true if the row exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn contains(&self, table: Table, row: RowId) -> StoreResult<bool> {
        self.get(table, row).map(|r| r.is_some())
    }

    /// Returns the selected records ordered by row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn query(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>>;
}
