//! Typed records, one struct per table.
//!
//! Records are addressed column by column through [`Cell`] when data
//! arrives from the wire or from a generic caller, and by field when the
//! caller knows the table. Every conversion checks the column's declared
//! type and nullability.

use crate::cell::{Cell, Cells};
use crate::error::{StoreError, StoreResult};
use crate::schema::{ColumnType, RowId, Table, ID_COLUMN};
use serde::{Deserialize, Serialize};

/// Column access shared by every record struct.
pub trait TableRecord: Sized {
    /// The table the record belongs to.
    const TABLE: Table;

    /// Returns the row id.
    fn id(&self) -> RowId;

    /// Builds a record from column values.
    ///
    /// Columns that are nullable may be omitted. An `_id` cell, when
    /// present, must equal `id`.
    ///
    /// # Errors
    ///
    /// Fails on unknown columns, missing non-nullable columns and type
    /// mismatches.
    fn from_cells(id: RowId, cells: &Cells) -> StoreResult<Self>;

    /// Reads one column.
    fn get(&self, column: &str) -> StoreResult<Cell>;

    /// Writes one column. `_id` accepts only the current id.
    fn set(&mut self, column: &str, cell: &Cell) -> StoreResult<()>;

    /// Returns every column of the record, `_id` included.
    fn to_cells(&self) -> Cells {
        Self::TABLE
            .column_names()
            .filter_map(|name| self.get(name).ok().map(|cell| (name.to_string(), cell)))
            .collect()
    }
}

/// A ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Row id.
    pub id: RowId,
    /// Timestamp text as entered on the device.
    pub datetime: String,
    /// Optional short description.
    pub caption: Option<String>,
    /// Amount in minor currency units.
    pub value: i64,
    /// Optional free-form details.
    pub details: Option<String>,
    /// Category row id.
    pub category: RowId,
}

/// A spending category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Row id.
    pub id: RowId,
    /// Display caption.
    pub caption: Option<String>,
}

/// A group of categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supercategory {
    /// Row id.
    pub id: RowId,
    /// Display caption.
    pub caption: Option<String>,
}

/// A category suggestion rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Row id.
    pub id: RowId,
    /// Pattern matched against entry captions.
    pub antecedent: Option<String>,
    /// Category suggested on match.
    pub consequent: RowId,
}

/// Metadata attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Row id.
    pub id: RowId,
    /// Category the user picked over the suggestion, if any.
    pub user_chosen_category: Option<RowId>,
}

fn check_columns(table: Table, id: RowId, cells: &Cells) -> StoreResult<()> {
    for (column, cell) in cells {
        cell.check(table, column)?;
    }
    match cells.get(ID_COLUMN) {
        Some(cell) => check_id(table, id, cell),
        None => Ok(()),
    }
}

fn check_id(table: Table, id: RowId, cell: &Cell) -> StoreResult<()> {
    let actual = integer(table, ID_COLUMN, Some(cell))?;
    if actual == id {
        Ok(())
    } else {
        Err(StoreError::IdMismatch {
            table,
            expected: id,
            actual,
        })
    }
}

fn missing(table: Table, column: &str) -> StoreError {
    StoreError::MissingColumn {
        table,
        column: column.to_string(),
    }
}

fn integer(table: Table, column: &str, cell: Option<&Cell>) -> StoreResult<i64> {
    match cell {
        Some(Cell::Integer(v)) => Ok(*v),
        Some(Cell::Null) | None => Err(missing(table, column)),
        Some(other) => Err(StoreError::type_mismatch(
            table,
            column,
            ColumnType::Integer,
            other.kind(),
        )),
    }
}

fn optional_integer(table: Table, column: &str, cell: Option<&Cell>) -> StoreResult<Option<i64>> {
    match cell {
        Some(Cell::Null) | None => Ok(None),
        other => integer(table, column, other).map(Some),
    }
}

fn text(table: Table, column: &str, cell: Option<&Cell>) -> StoreResult<String> {
    match cell {
        Some(Cell::Text(s)) => Ok(s.clone()),
        Some(Cell::Null) | None => Err(missing(table, column)),
        Some(other) => Err(StoreError::type_mismatch(
            table,
            column,
            ColumnType::Text,
            other.kind(),
        )),
    }
}

fn optional_text(table: Table, column: &str, cell: Option<&Cell>) -> StoreResult<Option<String>> {
    match cell {
        Some(Cell::Null) | None => Ok(None),
        other => text(table, column, other).map(Some),
    }
}

impl TableRecord for Entry {
    const TABLE: Table = Table::Entries;

    fn id(&self) -> RowId {
        self.id
    }

    fn from_cells(id: RowId, cells: &Cells) -> StoreResult<Self> {
        let t = Self::TABLE;
        check_columns(t, id, cells)?;
        Ok(Self {
            id,
            datetime: text(t, "datetime", cells.get("datetime"))?,
            caption: optional_text(t, "caption", cells.get("caption"))?,
            value: integer(t, "value", cells.get("value"))?,
            details: optional_text(t, "details", cells.get("details"))?,
            category: integer(t, "category", cells.get("category"))?,
        })
    }

    fn get(&self, column: &str) -> StoreResult<Cell> {
        Ok(match column {
            ID_COLUMN => Cell::Integer(self.id),
            "datetime" => Cell::from(self.datetime.as_str()),
            "caption" => Cell::from(self.caption.clone()),
            "value" => Cell::Integer(self.value),
            "details" => Cell::from(self.details.clone()),
            "category" => Cell::Integer(self.category),
            other => return Err(StoreError::unknown_column(Self::TABLE, other)),
        })
    }

    fn set(&mut self, column: &str, cell: &Cell) -> StoreResult<()> {
        let t = Self::TABLE;
        let value = Some(cell);
        match column {
            ID_COLUMN => check_id(t, self.id, cell)?,
            "datetime" => self.datetime = text(t, column, value)?,
            "caption" => self.caption = optional_text(t, column, value)?,
            "value" => self.value = integer(t, column, value)?,
            "details" => self.details = optional_text(t, column, value)?,
            "category" => self.category = integer(t, column, value)?,
            other => return Err(StoreError::unknown_column(t, other)),
        }
        Ok(())
    }
}

impl TableRecord for Category {
    const TABLE: Table = Table::Categories;

    fn id(&self) -> RowId {
        self.id
    }

    fn from_cells(id: RowId, cells: &Cells) -> StoreResult<Self> {
        check_columns(Self::TABLE, id, cells)?;
        Ok(Self {
            id,
            caption: optional_text(Self::TABLE, "caption", cells.get("caption"))?,
        })
    }

    fn get(&self, column: &str) -> StoreResult<Cell> {
        match column {
            ID_COLUMN => Ok(Cell::Integer(self.id)),
            "caption" => Ok(Cell::from(self.caption.clone())),
            other => Err(StoreError::unknown_column(Self::TABLE, other)),
        }
    }

    fn set(&mut self, column: &str, cell: &Cell) -> StoreResult<()> {
        match column {
            ID_COLUMN => check_id(Self::TABLE, self.id, cell),
            "caption" => {
                self.caption = optional_text(Self::TABLE, column, Some(cell))?;
                Ok(())
            }
            other => Err(StoreError::unknown_column(Self::TABLE, other)),
        }
    }
}

impl TableRecord for Supercategory {
    const TABLE: Table = Table::Supercategories;

    fn id(&self) -> RowId {
        self.id
    }

    fn from_cells(id: RowId, cells: &Cells) -> StoreResult<Self> {
        check_columns(Self::TABLE, id, cells)?;
        Ok(Self {
            id,
            caption: optional_text(Self::TABLE, "caption", cells.get("caption"))?,
        })
    }

    fn get(&self, column: &str) -> StoreResult<Cell> {
        match column {
            ID_COLUMN => Ok(Cell::Integer(self.id)),
            "caption" => Ok(Cell::from(self.caption.clone())),
            other => Err(StoreError::unknown_column(Self::TABLE, other)),
        }
    }

    fn set(&mut self, column: &str, cell: &Cell) -> StoreResult<()> {
        match column {
            ID_COLUMN => check_id(Self::TABLE, self.id, cell),
            "caption" => {
                self.caption = optional_text(Self::TABLE, column, Some(cell))?;
                Ok(())
            }
            other => Err(StoreError::unknown_column(Self::TABLE, other)),
        }
    }
}

impl TableRecord for Rule {
    const TABLE: Table = Table::Rules;

    fn id(&self) -> RowId {
        self.id
    }

    fn from_cells(id: RowId, cells: &Cells) -> StoreResult<Self> {
        let t = Self::TABLE;
        check_columns(t, id, cells)?;
        Ok(Self {
            id,
            antecedent: optional_text(t, "antecedent", cells.get("antecedent"))?,
            consequent: integer(t, "consequent", cells.get("consequent"))?,
        })
    }

    fn get(&self, column: &str) -> StoreResult<Cell> {
        match column {
            ID_COLUMN => Ok(Cell::Integer(self.id)),
            "antecedent" => Ok(Cell::from(self.antecedent.clone())),
            "consequent" => Ok(Cell::Integer(self.consequent)),
            other => Err(StoreError::unknown_column(Self::TABLE, other)),
        }
    }

    fn set(&mut self, column: &str, cell: &Cell) -> StoreResult<()> {
        let t = Self::TABLE;
        match column {
            ID_COLUMN => check_id(t, self.id, cell)?,
            "antecedent" => self.antecedent = optional_text(t, column, Some(cell))?,
            "consequent" => self.consequent = integer(t, column, Some(cell))?,
            other => return Err(StoreError::unknown_column(t, other)),
        }
        Ok(())
    }
}

impl TableRecord for EntryMetadata {
    const TABLE: Table = Table::EntryMetadata;

    fn id(&self) -> RowId {
        self.id
    }

    fn from_cells(id: RowId, cells: &Cells) -> StoreResult<Self> {
        check_columns(Self::TABLE, id, cells)?;
        Ok(Self {
            id,
            user_chosen_category: optional_integer(
                Self::TABLE,
                "user_chosen_category",
                cells.get("user_chosen_category"),
            )?,
        })
    }

    fn get(&self, column: &str) -> StoreResult<Cell> {
        match column {
            ID_COLUMN => Ok(Cell::Integer(self.id)),
            "user_chosen_category" => Ok(Cell::from(self.user_chosen_category)),
            other => Err(StoreError::unknown_column(Self::TABLE, other)),
        }
    }

    fn set(&mut self, column: &str, cell: &Cell) -> StoreResult<()> {
        match column {
            ID_COLUMN => check_id(Self::TABLE, self.id, cell),
            "user_chosen_category" => {
                self.user_chosen_category = optional_integer(Self::TABLE, column, Some(cell))?;
                Ok(())
            }
            other => Err(StoreError::unknown_column(Self::TABLE, other)),
        }
    }
}

/// A record of any table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum Record {
    /// Row of `entries`.
    Entry(Entry),
    /// Row of `categories`.
    Category(Category),
    /// Row of `supercategories`.
    Supercategory(Supercategory),
    /// Row of `rules`.
    Rule(Rule),
    /// Row of `entry_metadata`.
    EntryMetadata(EntryMetadata),
}

impl Record {
    /// Builds the typed record for `table` from column values.
    pub fn from_cells(table: Table, id: RowId, cells: &Cells) -> StoreResult<Self> {
        Ok(match table {
            Table::Entries => Self::Entry(Entry::from_cells(id, cells)?),
            Table::Categories => Self::Category(Category::from_cells(id, cells)?),
            Table::Supercategories => Self::Supercategory(Supercategory::from_cells(id, cells)?),
            Table::Rules => Self::Rule(Rule::from_cells(id, cells)?),
            Table::EntryMetadata => Self::EntryMetadata(EntryMetadata::from_cells(id, cells)?),
        })
    }

    /// Returns the record's table.
    pub fn table(&self) -> Table {
        match self {
            Self::Entry(_) => Table::Entries,
            Self::Category(_) => Table::Categories,
            Self::Supercategory(_) => Table::Supercategories,
            Self::Rule(_) => Table::Rules,
            Self::EntryMetadata(_) => Table::EntryMetadata,
        }
    }

    /// Returns the row id.
    pub fn id(&self) -> RowId {
        match self {
            Self::Entry(r) => r.id,
            Self::Category(r) => r.id,
            Self::Supercategory(r) => r.id,
            Self::Rule(r) => r.id,
            Self::EntryMetadata(r) => r.id,
        }
    }

    /// Reads one column.
    pub fn get(&self, column: &str) -> StoreResult<Cell> {
        match self {
            Self::Entry(r) => r.get(column),
            Self::Category(r) => r.get(column),
            Self::Supercategory(r) => r.get(column),
            Self::Rule(r) => r.get(column),
            Self::EntryMetadata(r) => r.get(column),
        }
    }

    /// Writes one column.
    pub fn set(&mut self, column: &str, cell: &Cell) -> StoreResult<()> {
        match self {
            Self::Entry(r) => r.set(column, cell),
            Self::Category(r) => r.set(column, cell),
            Self::Supercategory(r) => r.set(column, cell),
            Self::Rule(r) => r.set(column, cell),
            Self::EntryMetadata(r) => r.set(column, cell),
        }
    }

    /// Returns every column of the record.
    pub fn to_cells(&self) -> Cells {
        match self {
            Self::Entry(r) => r.to_cells(),
            Self::Category(r) => r.to_cells(),
            Self::Supercategory(r) => r.to_cells(),
            Self::Rule(r) => r.to_cells(),
            Self::EntryMetadata(r) => r.to_cells(),
        }
    }

    /// Applies several column writes at once.
    ///
    /// Either every write succeeds or the record is left untouched. Returns
    /// the names of the columns whose value changed.
    pub fn apply(&mut self, cells: &Cells) -> StoreResult<Vec<String>> {
        let mut next = self.clone();
        let mut changed = Vec::new();
        for (column, cell) in cells {
            if next.get(column)? != *cell {
                next.set(column, cell)?;
                changed.push(column.clone());
            }
        }
        *self = next;
        Ok(changed)
    }
}

impl From<Entry> for Record {
    fn from(r: Entry) -> Self {
        Self::Entry(r)
    }
}

impl From<Category> for Record {
    fn from(r: Category) -> Self {
        Self::Category(r)
    }
}

impl From<Supercategory> for Record {
    fn from(r: Supercategory) -> Self {
        Self::Supercategory(r)
    }
}

impl From<Rule> for Record {
    fn from(r: Rule) -> Self {
        Self::Rule(r)
    }
}

impl From<EntryMetadata> for Record {
    fn from(r: EntryMetadata) -> Self {
        Self::EntryMetadata(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(pairs: &[(&str, Cell)]) -> Cells {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn entry_from_cells() {
        let entry = Entry::from_cells(
            4,
            &cells(&[
                ("_id", Cell::Integer(4)),
                ("datetime", Cell::from("2013-01-05 10:00")),
                ("value", Cell::Integer(-1250)),
                ("category", Cell::Integer(2)),
            ]),
        )
        .unwrap();
        assert_eq!(entry.id, 4);
        assert_eq!(entry.value, -1250);
        assert_eq!(entry.caption, None);
        assert_eq!(entry.details, None);
    }

    #[test]
    fn missing_required_column_fails() {
        let err = Entry::from_cells(1, &cells(&[("datetime", Cell::from("now"))])).unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn { .. }));

        let err = Rule::from_cells(1, &cells(&[("consequent", Cell::Null)])).unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn { .. }));
    }

    #[test]
    fn id_cell_must_match_row() {
        let err = Category::from_cells(1, &cells(&[("_id", Cell::Integer(2))])).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IdMismatch {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn unknown_column_fails() {
        let err = Category::from_cells(1, &cells(&[("colour", Cell::from("red"))])).unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[test]
    fn to_cells_lists_every_column() {
        let record = Record::from(Rule {
            id: 3,
            antecedent: Some("coffee".into()),
            consequent: 9,
        });
        let all = record.to_cells();
        assert_eq!(all.len(), 3);
        assert_eq!(all["_id"], Cell::Integer(3));
        assert_eq!(all["antecedent"], Cell::from("coffee"));
        assert_eq!(all["consequent"], Cell::Integer(9));
    }

    #[test]
    fn apply_reports_changed_columns() {
        let mut record = Record::from(Category {
            id: 1,
            caption: Some("Food".into()),
        });
        let changed = record
            .apply(&cells(&[("_id", Cell::Integer(1)), ("caption", Cell::from("Groceries"))]))
            .unwrap();
        assert_eq!(changed, vec!["caption".to_string()]);
        assert_eq!(record.get("caption").unwrap(), Cell::from("Groceries"));
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let mut record = Record::from(Entry {
            id: 1,
            datetime: "d".into(),
            caption: None,
            value: 10,
            details: None,
            category: 1,
        });
        let before = record.clone();
        let err = record
            .apply(&cells(&[("caption", Cell::from("x")), ("value", Cell::from("ten"))]))
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        assert_eq!(record, before);
    }

    #[test]
    fn serde_tags_records_by_table() {
        let record = Record::from(Category {
            id: 1,
            caption: None,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["table"], "category");
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
