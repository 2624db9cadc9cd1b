//! Typed column values.

use crate::error::{StoreError, StoreResult};
use crate::schema::{ColumnDef, ColumnType, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column name to value map, ordered by column name.
pub type Cells = BTreeMap<String, Cell>;

/// A single typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// SQL NULL.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
}

impl Cell {
    /// Returns true for [`Cell::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer value, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
        }
    }

    /// Returns true if the value may be stored in `column`.
    pub fn conforms_to(&self, column: &ColumnDef) -> bool {
        match (self, column.ty) {
            (Self::Null, _) => column.nullable,
            (Self::Integer(_), ColumnType::Integer)
            | (Self::Real(_), ColumnType::Real)
            | (Self::Text(_), ColumnType::Text) => true,
            _ => false,
        }
    }

    /// Checks the value against the declared column of `table`.
    pub fn check(&self, table: Table, column: &str) -> StoreResult<()> {
        let def = table.require_column(column)?;
        if self.conforms_to(def) {
            Ok(())
        } else if self.is_null() {
            Err(StoreError::MissingColumn {
                table,
                column: column.to_string(),
            })
        } else {
            Err(StoreError::type_mismatch(table, column, def.ty, self.kind()))
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
