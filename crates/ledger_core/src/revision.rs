//! Per-column revision bookkeeping.
//!
//! Every column of every row the device has seen carries a revision number.
//! A change coming from the server wins over local state only when its
//! revision is strictly greater than the recorded one.
//!
//! Revisions are never removed. After a row is deleted its revisions stay
//! behind as tombstones so that a late, older change cannot resurrect it.

use crate::error::{CoreError, CoreResult};
use ledger_store::{RowId, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The persisted revision ledger.
///
/// Keys that were never recorded read as revision 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionLedger {
    tables: BTreeMap<Table, BTreeMap<RowId, BTreeMap<String, i64>>>,
}

impl RevisionLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the revision of a column, 0 if never recorded.
    pub fn revision_of(&self, table: Table, row: RowId, column: &str) -> i64 {
        self.row(table, row)
            .and_then(|columns| columns.get(column))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the highest revision of any column of the row, 0 if none.
    pub fn max_revision_of(&self, table: Table, row: RowId) -> i64 {
        self.row(table, row)
            .and_then(|columns| columns.values().max())
            .copied()
            .unwrap_or(0)
    }

    /// Records a revision, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidArgument`] for a negative revision and
    /// with a store error for a column the table does not declare.
    pub fn set_revision(
        &mut self,
        table: Table,
        row: RowId,
        column: &str,
        revision: i64,
    ) -> CoreResult<()> {
        if revision < 0 {
            return Err(CoreError::invalid_argument(format!(
                "negative revision {revision} for {table}.{column} row {row}"
            )));
        }
        table.require_column(column)?;
        self.tables
            .entry(table)
            .or_default()
            .entry(row)
            .or_default()
            .insert(column.to_string(), revision);
        Ok(())
    }

    /// Records revision 0 for a column that has no entry yet.
    pub(crate) fn ensure_tracked(&mut self, table: Table, row: RowId, column: &str) {
        self.tables
            .entry(table)
            .or_default()
            .entry(row)
            .or_default()
            .entry(column.to_string())
            .or_insert(0);
    }

    /// Returns the recorded revisions of a row.
    pub fn revisions_for_row(&self, table: Table, row: RowId) -> Option<&BTreeMap<String, i64>> {
        self.row(table, row)
    }

    fn row(&self, table: Table, row: RowId) -> Option<&BTreeMap<String, i64>> {
        self.tables.get(&table).and_then(|rows| rows.get(&row))
    }

    /// Iterates over all entries as `(table, row, column, revision)`.
    pub fn iter(&self) -> impl Iterator<Item = (Table, RowId, &str, i64)> {
        self.tables.iter().flat_map(|(table, rows)| {
            rows.iter().flat_map(move |(row, columns)| {
                columns
                    .iter()
                    .map(move |(column, revision)| (*table, *row, column.as_str(), *revision))
            })
        })
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.tables
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads the ledger into a hash-indexed snapshot.
    pub fn snapshot(&self) -> RevisionSnapshot {
        self.iter()
            .map(|(table, row, column, revision)| (table, row, column.to_string(), revision))
            .collect()
    }
}

/// An in-memory copy of the revision ledger with constant-time lookups.
///
/// The sync engine loads one snapshot per cycle and plans against it. The
/// snapshot is also the working overlay while a delta is planned: [`set`]
/// records revisions the plan will write.
///
/// [`set`]: RevisionSnapshot::set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionSnapshot {
    revisions: HashMap<(Table, RowId), HashMap<String, i64>>,
}

impl RevisionSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the revision of a column, 0 if never recorded.
    pub fn revision_of(&self, table: Table, row: RowId, column: &str) -> i64 {
        self.revisions
            .get(&(table, row))
            .and_then(|columns| columns.get(column))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the highest revision of the row, 0 if none.
    pub fn max_revision_of(&self, table: Table, row: RowId) -> i64 {
        self.revisions
            .get(&(table, row))
            .and_then(|columns| columns.values().max())
            .copied()
            .unwrap_or(0)
    }

    /// Returns the revision of a column.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::NotFound`] if the column was never recorded.
    pub fn strict_revision_of(&self, table: Table, row: RowId, column: &str) -> CoreResult<i64> {
        self.revisions
            .get(&(table, row))
            .and_then(|columns| columns.get(column))
            .copied()
            .ok_or_else(|| {
                CoreError::not_found(format!("revision of {table}.{column} row {row}"))
            })
    }

    /// Returns the highest revision of the row.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::NotFound`] if the row has no recorded column.
    pub fn strict_max_revision_of(&self, table: Table, row: RowId) -> CoreResult<i64> {
        self.revisions
            .get(&(table, row))
            .and_then(|columns| columns.values().max())
            .copied()
            .ok_or_else(|| CoreError::not_found(format!("revisions of {table} row {row}")))
    }

    /// Returns the column to revision map of a row.
    pub fn revisions_for_row(&self, table: Table, row: RowId) -> Option<&HashMap<String, i64>> {
        self.revisions.get(&(table, row))
    }

    /// Returns true if any column of the row was recorded.
    pub fn contains_row(&self, table: Table, row: RowId) -> bool {
        self.revisions.contains_key(&(table, row))
    }

    /// Records a revision in the snapshot only.
    pub fn set(&mut self, table: Table, row: RowId, column: impl Into<String>, revision: i64) {
        self.revisions
            .entry((table, row))
            .or_default()
            .insert(column.into(), revision);
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.revisions.values().map(HashMap::len).sum()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

impl FromIterator<(Table, RowId, String, i64)> for RevisionSnapshot {
    fn from_iter<I: IntoIterator<Item = (Table, RowId, String, i64)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (table, row, column, revision) in iter {
            snapshot.set(table, row, column, revision);
        }
        snapshot
    }
}
