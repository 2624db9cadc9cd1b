//! Upload payloads sent to the server.

use crate::delta::DeltaEntry;
use crate::error::ProtocolResult;
use crate::fields;
use crate::operation::OperationKind;
use serde::Serialize;
use serde_json::Value;

/// Local changes sent to the server in one exchange.
///
/// Entries share the shape of [`DeltaEntry`]: created rows carry every
/// column, updates carry only the journaled columns, deletes carry
/// revisions without data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadPayload {
    /// The last anchor received from the server.
    pub anchor: u64,
    /// Rows created locally.
    pub created: Vec<DeltaEntry>,
    /// Rows updated locally.
    pub updated: Vec<DeltaEntry>,
    /// Rows deleted locally.
    pub deleted: Vec<DeltaEntry>,
}

impl UploadPayload {
    /// Creates an empty payload for the given anchor.
    pub fn new(anchor: u64) -> Self {
        Self {
            anchor,
            ..Self::default()
        }
    }

    /// Appends an entry to the section of `kind`.
    pub fn push(&mut self, kind: OperationKind, entry: DeltaEntry) {
        match kind {
            OperationKind::Create => self.created.push(entry),
            OperationKind::Update => self.updated.push(entry),
            OperationKind::Delete => self.deleted.push(entry),
        }
    }

    /// Returns the entries of a section.
    pub fn entries(&self, kind: OperationKind) -> &[DeltaEntry] {
        match kind {
            OperationKind::Create => &self.created,
            OperationKind::Update => &self.updated,
            OperationKind::Delete => &self.deleted,
        }
    }

    /// Returns the number of entries across all sections.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Returns true if there is nothing to upload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the payload as JSON.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for kind in OperationKind::ALL {
            map.insert(
                kind.section().into(),
                Value::Array(self.entries(kind).iter().map(DeltaEntry::to_value).collect()),
            );
        }
        map.insert(fields::ANCHOR.into(), Value::from(self.anchor));
        Value::Object(map)
    }

    /// Encodes the payload as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_vec(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
