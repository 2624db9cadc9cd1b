//! Delta payloads pushed by the server.
//!
//! A payload holds three sections of entries and an anchor:
//!
//! ```json
//! {
//!   "created": [{"table_name": "categories", "row": 1,
//!                "revisions": {"_id": 1, "caption": 1},
//!                "data": {"_id": 1, "caption": "Food"}}],
//!   "updated": [],
//!   "deleted": [],
//!   "anchor": 7
//! }
//! ```
//!
//! Entries stay as raw JSON inside [`DeltaPayload`] and are decoded one by
//! one with [`DeltaEntry::decode`], so a single malformed entry never
//! prevents the rest of the payload from being applied.

use crate::error::{ProtocolError, ProtocolResult};
use crate::fields;
use crate::operation::OperationKind;
use crate::value::{cell_from_value, cell_to_value};
use ledger_store::{Cells, Record, RowId, Table, ID_COLUMN};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Column name to revision map.
pub type Revisions = BTreeMap<String, i64>;

/// One decoded payload entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaEntry {
    /// Target table.
    pub table: Table,
    /// Target row.
    pub row: RowId,
    /// Revision per named column. Never empty once decoded.
    pub revisions: Revisions,
    /// Values per column. Empty for deletes.
    pub data: Cells,
}

impl DeltaEntry {
    /// Creates an entry without columns.
    pub fn new(table: Table, row: RowId) -> Self {
        Self {
            table,
            row,
            revisions: Revisions::new(),
            data: Cells::new(),
        }
    }

    /// Adds a column with its revision and value.
    #[must_use]
    pub fn with_column(
        mut self,
        column: impl Into<String>,
        revision: i64,
        value: impl Into<ledger_store::Cell>,
    ) -> Self {
        let column = column.into();
        self.revisions.insert(column.clone(), revision);
        self.data.insert(column, value.into());
        self
    }

    /// Adds a revision without a value, as deletes carry.
    #[must_use]
    pub fn with_revision(mut self, column: impl Into<String>, revision: i64) -> Self {
        self.revisions.insert(column.into(), revision);
        self
    }

    /// Decodes and validates one entry of the given section.
    ///
    /// Validation covers the envelope (`table_name`, `row`, `revisions`,
    /// `data`), column names, revision signs, value types, and for creates
    /// that the data forms a complete record whose `_id` matches `row`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] or
    /// [`ProtocolError::InvalidField`] describing the first problem found.
    pub fn decode(kind: OperationKind, value: &Value) -> ProtocolResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid(kind.section(), "entry is not an object"))?;

        let name = map
            .get(fields::TABLE)
            .ok_or(ProtocolError::MissingField(fields::TABLE))?
            .as_str()
            .ok_or_else(|| ProtocolError::invalid(fields::TABLE, "expected string"))?;
        let table = Table::from_name(name)
            .ok_or_else(|| ProtocolError::invalid(fields::TABLE, format!("unknown table {name}")))?;

        let row = map
            .get(fields::ROW)
            .ok_or(ProtocolError::MissingField(fields::ROW))?
            .as_i64()
            .ok_or_else(|| ProtocolError::invalid(fields::ROW, "expected integer"))?;

        let revisions = decode_revisions(
            table,
            map.get(fields::REVISIONS)
                .ok_or(ProtocolError::MissingField(fields::REVISIONS))?,
        )?;

        let data = match kind {
            OperationKind::Delete => Cells::new(),
            OperationKind::Create | OperationKind::Update => decode_data(
                table,
                map.get(fields::DATA)
                    .ok_or(ProtocolError::MissingField(fields::DATA))?,
            )?,
        };

        let entry = Self {
            table,
            row,
            revisions,
            data,
        };
        entry.check_shape(kind)?;
        Ok(entry)
    }

    fn check_shape(&self, kind: OperationKind) -> ProtocolResult<()> {
        if kind == OperationKind::Delete {
            return Ok(());
        }
        if let Some(column) = self.revisions.keys().find(|c| !self.data.contains_key(*c)) {
            return Err(ProtocolError::invalid(
                format!("{}.{column}", fields::DATA),
                "revision without value",
            ));
        }
        if let Some(id) = self.data.get(ID_COLUMN) {
            if id.as_integer() != Some(self.row) {
                return Err(ProtocolError::invalid(
                    format!("{}.{ID_COLUMN}", fields::DATA),
                    format!("does not match row {}", self.row),
                ));
            }
        }
        if kind == OperationKind::Create {
            if let Some(column) = self.data.keys().find(|c| !self.revisions.contains_key(*c)) {
                return Err(ProtocolError::invalid(
                    format!("{}.{column}", fields::REVISIONS),
                    "value without revision",
                ));
            }
            Record::from_cells(self.table, self.row, &self.data)
                .map_err(|e| ProtocolError::invalid(fields::DATA, e.to_string()))?;
        }
        Ok(())
    }

    /// Encodes the entry as JSON. `data` is omitted when empty.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(fields::TABLE.into(), Value::from(self.table.name()));
        map.insert(fields::ROW.into(), Value::from(self.row));
        map.insert(
            fields::REVISIONS.into(),
            Value::Object(
                self.revisions
                    .iter()
                    .map(|(c, r)| (c.clone(), Value::from(*r)))
                    .collect(),
            ),
        );
        if !self.data.is_empty() {
            map.insert(
                fields::DATA.into(),
                Value::Object(
                    self.data
                        .iter()
                        .map(|(c, v)| (c.clone(), cell_to_value(v)))
                        .collect(),
                ),
            );
        }
        Value::Object(map)
    }
}

impl Serialize for DeltaEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn decode_revisions(table: Table, value: &Value) -> ProtocolResult<Revisions> {
    let map = value
        .as_object()
        .ok_or_else(|| ProtocolError::invalid(fields::REVISIONS, "expected object"))?;
    if map.is_empty() {
        return Err(ProtocolError::invalid(fields::REVISIONS, "no columns named"));
    }
    let mut revisions = Revisions::new();
    for (column, revision) in map {
        let field = || format!("{}.{column}", fields::REVISIONS);
        table
            .require_column(column)
            .map_err(|e| ProtocolError::invalid(field(), e.to_string()))?;
        let revision = revision
            .as_i64()
            .ok_or_else(|| ProtocolError::invalid(field(), "expected integer"))?;
        if revision < 0 {
            return Err(ProtocolError::invalid(field(), "negative revision"));
        }
        // An accepted upload moves the revision one further.
        if revision == i64::MAX {
            return Err(ProtocolError::invalid(field(), "revision out of range"));
        }
        revisions.insert(column.clone(), revision);
    }
    Ok(revisions)
}

fn decode_data(table: Table, value: &Value) -> ProtocolResult<Cells> {
    let map = value
        .as_object()
        .ok_or_else(|| ProtocolError::invalid(fields::DATA, "expected object"))?;
    let mut data = Cells::new();
    for (column, value) in map {
        let field = || format!("{}.{column}", fields::DATA);
        let cell = cell_from_value(value)
            .ok_or_else(|| ProtocolError::invalid(field(), "unsupported value"))?;
        cell.check(table, column)
            .map_err(|e| ProtocolError::invalid(field(), e.to_string()))?;
        data.insert(column.clone(), cell);
    }
    Ok(data)
}

fn take_section(map: &mut Map<String, Value>, kind: OperationKind) -> ProtocolResult<Vec<Value>> {
    match map.remove(kind.section()) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(entries)) => Ok(entries),
        Some(_) => Err(ProtocolError::invalid(kind.section(), "expected array")),
    }
}

/// A delta payload with undecoded entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaPayload {
    created: Vec<Value>,
    updated: Vec<Value>,
    deleted: Vec<Value>,
    anchor: Option<Value>,
}

impl DeltaPayload {
    /// Creates an empty payload without an anchor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a payload from JSON bytes.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not JSON or do not form a payload envelope.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Builds a payload from a JSON value.
    ///
    /// Absent sections are empty. Entries are not inspected.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an object or a section is not an array.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::invalid("payload", "expected object"));
        };
        let anchor = map.remove(fields::ANCHOR);
        Ok(Self {
            created: take_section(&mut map, OperationKind::Create)?,
            updated: take_section(&mut map, OperationKind::Update)?,
            deleted: take_section(&mut map, OperationKind::Delete)?,
            anchor,
        })
    }

    /// Sets the anchor.
    #[must_use]
    pub fn with_anchor(mut self, anchor: u64) -> Self {
        self.anchor = Some(Value::from(anchor));
        self
    }

    /// Appends an entry to the section of `kind`.
    #[must_use]
    pub fn with_entry(self, kind: OperationKind, entry: &DeltaEntry) -> Self {
        self.with_raw_entry(kind, entry.to_value())
    }

    /// Appends raw JSON to the section of `kind`.
    #[must_use]
    pub fn with_raw_entry(mut self, kind: OperationKind, value: Value) -> Self {
        self.section_mut(kind).push(value);
        self
    }

    fn section_mut(&mut self, kind: OperationKind) -> &mut Vec<Value> {
        match kind {
            OperationKind::Create => &mut self.created,
            OperationKind::Update => &mut self.updated,
            OperationKind::Delete => &mut self.deleted,
        }
    }

    /// Returns the raw entries of a section in payload order.
    pub fn entries(&self, kind: OperationKind) -> &[Value] {
        match kind {
            OperationKind::Create => &self.created,
            OperationKind::Update => &self.updated,
            OperationKind::Delete => &self.deleted,
        }
    }

    /// Returns the anchor to persist once the payload is applied.
    ///
    /// # Errors
    ///
    /// Fails if the anchor is absent or not a non-negative integer.
    pub fn anchor(&self) -> ProtocolResult<u64> {
        self.anchor
            .as_ref()
            .ok_or(ProtocolError::MissingField(fields::ANCHOR))?
            .as_u64()
            .ok_or_else(|| ProtocolError::invalid(fields::ANCHOR, "expected non-negative integer"))
    }

    /// Returns the number of entries across all sections.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Returns true if no section holds an entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the payload as JSON.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for kind in OperationKind::ALL {
            map.insert(
                kind.section().into(),
                Value::Array(self.entries(kind).to_vec()),
            );
        }
        if let Some(anchor) = &self.anchor {
            map.insert(fields::ANCHOR.into(), anchor.clone());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::Cell;
    use serde_json::json;

    fn category_create() -> Value {
        json!({
            "table_name": "categories",
            "row": 1,
            "revisions": {"_id": 1, "caption": 1},
            "data": {"_id": 1, "caption": "Food"}
        })
    }

    #[test]
    fn decode_create() {
        let entry = DeltaEntry::decode(OperationKind::Create, &category_create()).unwrap();
        assert_eq!(entry.table, Table::Categories);
        assert_eq!(entry.row, 1);
        assert_eq!(entry.revisions["caption"], 1);
        assert_eq!(entry.data["caption"], Cell::from("Food"));
    }

    #[test]
    fn decode_reports_missing_fields() {
        for field in ["table_name", "row", "revisions", "data"] {
            let mut value = category_create();
            value.as_object_mut().unwrap().remove(field);
            let err = DeltaEntry::decode(OperationKind::Create, &value).unwrap_err();
            assert!(
                matches!(err, ProtocolError::MissingField(f) if f == field),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn decode_rejects_schema_violations() {
        let cases = [
            json!({"table_name": "accounts", "row": 1, "revisions": {"_id": 1}, "data": {"_id": 1}}),
            json!({"table_name": "categories", "row": 1, "revisions": {"colour": 1}, "data": {"colour": "red"}}),
            json!({"table_name": "categories", "row": 1, "revisions": {"caption": -1}, "data": {"caption": "x"}}),
            json!({"table_name": "categories", "row": 1, "revisions": {"caption": 1}, "data": {"caption": 5}}),
            json!({"table_name": "categories", "row": 1, "revisions": {}, "data": {}}),
            json!({"table_name": "categories", "row": "one", "revisions": {"caption": 1}, "data": {"caption": "x"}}),
        ];
        for case in cases {
            assert!(
                DeltaEntry::decode(OperationKind::Update, &case).is_err(),
                "accepted {case}"
            );
        }
    }

    #[test]
    fn create_needs_matching_id_and_complete_record() {
        let wrong_id = json!({
            "table_name": "categories", "row": 1,
            "revisions": {"_id": 1}, "data": {"_id": 2}
        });
        assert!(DeltaEntry::decode(OperationKind::Create, &wrong_id).is_err());

        let incomplete = json!({
            "table_name": "entries", "row": 3,
            "revisions": {"caption": 1}, "data": {"caption": "x"}
        });
        assert!(DeltaEntry::decode(OperationKind::Create, &incomplete).is_err());
        assert!(DeltaEntry::decode(OperationKind::Update, &incomplete).is_ok());
    }

    #[test]
    fn revision_without_value_is_rejected() {
        let value = json!({
            "table_name": "categories", "row": 1,
            "revisions": {"caption": 2}, "data": {}
        });
        assert!(DeltaEntry::decode(OperationKind::Update, &value).is_err());
    }

    #[test]
    fn top_revision_is_rejected() {
        let value = json!({
            "table_name": "categories", "row": 1,
            "revisions": {"caption": i64::MAX}, "data": {"caption": "x"}
        });
        let err = DeltaEntry::decode(OperationKind::Update, &value).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");

        let below = json!({
            "table_name": "categories", "row": 1,
            "revisions": {"caption": i64::MAX - 1}, "data": {"caption": "x"}
        });
        assert!(DeltaEntry::decode(OperationKind::Update, &below).is_ok());
    }

    #[test]
    fn update_cannot_move_a_row() {
        let value = json!({
            "table_name": "categories", "row": 1,
            "revisions": {"_id": 2}, "data": {"_id": 9}
        });
        assert!(DeltaEntry::decode(OperationKind::Update, &value).is_err());
    }

    #[test]
    fn delete_ignores_data() {
        let value = json!({"table_name": "categories", "row": 4, "revisions": {"caption": 3}});
        let entry = DeltaEntry::decode(OperationKind::Delete, &value).unwrap();
        assert!(entry.data.is_empty());
        assert_eq!(entry.revisions["caption"], 3);
    }

    #[test]
    fn entry_json_shape() {
        let entry = DeltaEntry::new(Table::Categories, 1)
            .with_column("_id", 1, 1_i64)
            .with_column("caption", 1, "Food");
        assert_eq!(entry.to_value(), category_create());

        let delete = DeltaEntry::new(Table::Rules, 2).with_revision("antecedent", 4);
        assert!(delete.to_value().get("data").is_none());
    }

    #[test]
    fn payload_sections_and_anchor() {
        let payload = DeltaPayload::from_slice(
            br#"{"created": [{"x": 1}], "deleted": [], "anchor": 12}"#,
        )
        .unwrap();
        assert_eq!(payload.entries(OperationKind::Create).len(), 1);
        assert!(payload.entries(OperationKind::Update).is_empty());
        assert_eq!(payload.anchor().unwrap(), 12);
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn payload_anchor_errors() {
        let payload = DeltaPayload::new();
        assert!(matches!(
            payload.anchor(),
            Err(ProtocolError::MissingField("anchor"))
        ));
        let payload = DeltaPayload::from_value(json!({"anchor": -3})).unwrap();
        assert!(matches!(
            payload.anchor(),
            Err(ProtocolError::InvalidField { .. })
        ));
    }

    #[test]
    fn payload_envelope_errors() {
        assert!(DeltaPayload::from_slice(b"[1, 2]").is_err());
        assert!(DeltaPayload::from_slice(b"{\"updated\": 4}").is_err());
        assert!(matches!(
            DeltaPayload::from_slice(b"{nope"),
            Err(ProtocolError::Json(_))
        ));
    }
}
