//! In-memory record store.

use crate::backend::{Filter, RecordStore};
use crate::cell::Cells;
use crate::error::{StoreError, StoreResult};
use crate::record::Record;
use crate::schema::{RowId, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An in-memory record store.
///
/// Tables are ordered maps keyed by row id, so queries come back in row
/// order without sorting. The store is a plain value: cloning it is how a
/// transaction stages writes before publishing them, and it serializes as
/// part of a database snapshot.
///
/// # Example
///
/// ```rust
/// use ledger_store::{Cell, Cells, Filter, MemoryStore, RecordStore, Table};
///
/// let mut store = MemoryStore::new();
/// let mut cells = Cells::new();
/// cells.insert("caption".into(), Cell::from("Rent"));
/// store.insert(Table::Categories, 3, &cells).unwrap();
///
/// let rows = store.query(Table::Categories, &Filter::All).unwrap();
/// assert_eq!(rows.len(), 1);
/// assert_eq!(rows[0].id(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    tables: BTreeMap<Table, BTreeMap<RowId, Record>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records in a table.
    #[must_use]
    pub fn len(&self, table: Table) -> usize {
        self.tables.get(&table).map_or(0, BTreeMap::len)
    }

    /// Returns true if no table holds a record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(BTreeMap::is_empty)
    }

    /// Iterates over the records of a table in row order.
    pub fn records(&self, table: Table) -> impl Iterator<Item = &Record> {
        self.tables.get(&table).into_iter().flat_map(BTreeMap::values)
    }
}

impl RecordStore for MemoryStore {
    fn insert(&mut self, table: Table, row: RowId, cells: &Cells) -> StoreResult<RowId> {
        if self.contains(table, row)? {
            return Err(StoreError::Conflict { table, row });
        }
        let record = Record::from_cells(table, row, cells)?;
        self.tables.entry(table).or_default().insert(row, record);
        Ok(row)
    }

    fn update(&mut self, table: Table, row: RowId, cells: &Cells) -> StoreResult<usize> {
        let Some(record) = self.tables.get_mut(&table).and_then(|t| t.get_mut(&row)) else {
            for (column, cell) in cells {
                cell.check(table, column)?;
            }
            return Ok(0);
        };
        record.apply(cells)?;
        Ok(1)
    }

    fn delete(&mut self, table: Table, row: RowId) -> StoreResult<usize> {
        let removed = self
            .tables
            .get_mut(&table)
            .and_then(|t| t.remove(&row))
            .is_some();
        Ok(usize::from(removed))
    }

    fn get(&self, table: Table, row: RowId) -> StoreResult<Option<Record>> {
        Ok(self.tables.get(&table).and_then(|t| t.get(&row)).cloned())
    }

    fn contains(&self, table: Table, row: RowId) -> StoreResult<bool> {
        Ok(self
            .tables
            .get(&table)
            .is_some_and(|t| t.contains_key(&row)))
    }

    fn query(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        Ok(self
            .records(table)
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    fn caption(text: &str) -> Cells {
        let mut cells = Cells::new();
        cells.insert("caption".into(), Cell::from(text));
        cells
    }

    #[test]
    fn insert_and_get() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());
        store.insert(Table::Categories, 1, &caption("Food")).unwrap();

        let record = store.get(Table::Categories, 1).unwrap().unwrap();
        assert_eq!(record.get("caption").unwrap(), Cell::from("Food"));
        assert_eq!(store.len(Table::Categories), 1);
        assert_eq!(store.len(Table::Rules), 0);
        assert!(!store.is_empty());
    }

    #[test]
    fn insert_existing_row_conflicts() {
        let mut store = MemoryStore::new();
        store.insert(Table::Categories, 1, &caption("Food")).unwrap();
        let err = store
            .insert(Table::Categories, 1, &caption("Rent"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { row: 1, .. }));
        let record = store.get(Table::Categories, 1).unwrap().unwrap();
        assert_eq!(record.get("caption").unwrap(), Cell::from("Food"));
    }

    #[test]
    fn same_row_id_in_other_table_is_independent() {
        let mut store = MemoryStore::new();
        store.insert(Table::Categories, 1, &caption("Food")).unwrap();
        store
            .insert(Table::Supercategories, 1, &caption("Living"))
            .unwrap();
        assert_eq!(store.len(Table::Categories), 1);
        assert_eq!(store.len(Table::Supercategories), 1);
    }

    #[test]
    fn update_counts_rows() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.update(Table::Categories, 1, &caption("x")).unwrap(),
            0
        );
        store.insert(Table::Categories, 1, &caption("Food")).unwrap();
        assert_eq!(
            store.update(Table::Categories, 1, &caption("Rent")).unwrap(),
            1
        );
        let record = store.get(Table::Categories, 1).unwrap().unwrap();
        assert_eq!(record.get("caption").unwrap(), Cell::from("Rent"));
    }

    #[test]
    fn update_rejects_bad_values_even_without_row() {
        let mut store = MemoryStore::new();
        let mut cells = Cells::new();
        cells.insert("caption".into(), Cell::Integer(1));
        assert!(store.update(Table::Categories, 9, &cells).is_err());
    }

    #[test]
    fn delete_counts_rows() {
        let mut store = MemoryStore::new();
        store.insert(Table::Categories, 1, &caption("Food")).unwrap();
        assert_eq!(store.delete(Table::Categories, 1).unwrap(), 1);
        assert_eq!(store.delete(Table::Categories, 1).unwrap(), 0);
        assert!(!store.contains(Table::Categories, 1).unwrap());
    }

    #[test]
    fn query_is_ordered_and_filtered() {
        let mut store = MemoryStore::new();
        store.insert(Table::Categories, 5, &caption("b")).unwrap();
        store.insert(Table::Categories, 2, &caption("a")).unwrap();
        store.insert(Table::Categories, 9, &caption("b")).unwrap();

        let all: Vec<_> = store
            .query(Table::Categories, &Filter::All)
            .unwrap()
            .iter()
            .map(Record::id)
            .collect();
        assert_eq!(all, vec![2, 5, 9]);

        let b: Vec<_> = store
            .query(Table::Categories, &Filter::equals("caption", "b"))
            .unwrap()
            .iter()
            .map(Record::id)
            .collect();
        assert_eq!(b, vec![5, 9]);
    }

    #[test]
    fn serde_round_trip() {
        let mut store = MemoryStore::new();
        store.insert(Table::Categories, 1, &caption("Food")).unwrap();
        let json = serde_json::to_string(&store).unwrap();
        let back: MemoryStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store);
    }
}
