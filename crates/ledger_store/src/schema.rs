//! Table and column declarations for the ledger schema.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Integer row identifier, unique within a table.
pub type RowId = i64;

/// Name of the row id column present in every table.
pub const ID_COLUMN: &str = "_id";

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// Double precision float.
    Real,
    /// UTF-8 text.
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
        })
    }
}

/// A column of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name as it appears on the wire.
    pub name: &'static str,
    /// Declared type.
    pub ty: ColumnType,
    /// Whether NULL is accepted.
    pub nullable: bool,
}

impl ColumnDef {
    const fn new(name: &'static str, ty: ColumnType, nullable: bool) -> Self {
        Self { name, ty, nullable }
    }
}

const ID: ColumnDef = ColumnDef::new(ID_COLUMN, ColumnType::Integer, false);

const ENTRIES: &[ColumnDef] = &[
    ID,
    ColumnDef::new("datetime", ColumnType::Text, false),
    ColumnDef::new("caption", ColumnType::Text, true),
    ColumnDef::new("value", ColumnType::Integer, false),
    ColumnDef::new("details", ColumnType::Text, true),
    ColumnDef::new("category", ColumnType::Integer, false),
];

const CATEGORIES: &[ColumnDef] = &[ID, ColumnDef::new("caption", ColumnType::Text, true)];

const SUPERCATEGORIES: &[ColumnDef] = &[ID, ColumnDef::new("caption", ColumnType::Text, true)];

const RULES: &[ColumnDef] = &[
    ID,
    ColumnDef::new("antecedent", ColumnType::Text, true),
    ColumnDef::new("consequent", ColumnType::Integer, false),
];

const ENTRY_METADATA: &[ColumnDef] = &[
    ID,
    ColumnDef::new("user_chosen_category", ColumnType::Integer, true),
];

/// The tables of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Ledger entries (transactions).
    Entries,
    /// Spending categories.
    Categories,
    /// Groups of categories.
    Supercategories,
    /// Category suggestion rules.
    Rules,
    /// Per-entry metadata.
    EntryMetadata,
}

impl Table {
    /// Every table, in schema order.
    pub const ALL: [Table; 5] = [
        Table::Entries,
        Table::Categories,
        Table::Supercategories,
        Table::Rules,
        Table::EntryMetadata,
    ];

    /// Returns the wire name of the table.
    pub fn name(self) -> &'static str {
        match self {
            Self::Entries => "entries",
            Self::Categories => "categories",
            Self::Supercategories => "supercategories",
            Self::Rules => "rules",
            Self::EntryMetadata => "entry_metadata",
        }
    }

    /// Resolves a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Returns the declared columns, `_id` first.
    pub fn columns(self) -> &'static [ColumnDef] {
        match self {
            Self::Entries => ENTRIES,
            Self::Categories => CATEGORIES,
            Self::Supercategories => SUPERCATEGORIES,
            Self::Rules => RULES,
            Self::EntryMetadata => ENTRY_METADATA,
        }
    }

    /// Looks up a column by name.
    pub fn column(self, name: &str) -> Option<&'static ColumnDef> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Looks up a column by name, failing with [`StoreError::UnknownColumn`].
    pub fn require_column(self, name: &str) -> StoreResult<&'static ColumnDef> {
        self.column(name)
            .ok_or_else(|| StoreError::unknown_column(self, name))
    }

    /// Iterates over the column names.
    pub fn column_names(self) -> impl Iterator<Item = &'static str> {
        self.columns().iter().map(|c| c.name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| StoreError::UnknownTable { name: s.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for table in Table::ALL {
            assert_eq!(Table::from_name(table.name()), Some(table));
            assert_eq!(table.name().parse::<Table>().unwrap(), table);
        }
        assert!(Table::from_name("accounts").is_none());
        assert!(matches!(
            "accounts".parse::<Table>(),
            Err(StoreError::UnknownTable { .. })
        ));
    }

    #[test]
    fn every_table_leads_with_id() {
        for table in Table::ALL {
            let first = table.columns()[0];
            assert_eq!(first.name, ID_COLUMN);
            assert!(!first.nullable);
        }
    }

    #[test]
    fn entry_columns() {
        let names: Vec<_> = Table::Entries.column_names().collect();
        assert_eq!(
            names,
            ["_id", "datetime", "caption", "value", "details", "category"]
        );
        assert!(Table::Entries.column("caption").unwrap().nullable);
        assert!(!Table::Entries.column("value").unwrap().nullable);
        assert!(matches!(
            Table::Entries.require_column("amount"),
            Err(StoreError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Table::EntryMetadata).unwrap();
        assert_eq!(json, "\"entry_metadata\"");
    }
}
