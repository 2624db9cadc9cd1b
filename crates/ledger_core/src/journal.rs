//! Mutation journal for local changes awaiting upload.
//!
//! Every local create, update and delete leaves an entry here. Entries are
//! coalesced on the way in so that the upload names each change once:
//!
//! - an update of a column is dropped when the same column already has a
//!   pending update, or the row has a pending create
//! - a delete drops the pending creates and updates of its row; if a create
//!   was dropped the delete is dropped too, the row never left the device
//!
//! Uploads are two-phase. [`MutationJournal::begin_upload`] hands out a
//! [`JournalSnapshot`] and marks the covered entries as in flight. In-flight
//! entries are invisible to coalescing, so edits made during an upload are
//! journaled again. [`MutationJournal::acknowledge_through`] removes the
//! covered entries once the server accepted them, and
//! [`MutationJournal::abort_upload`] returns them to pending.

use ledger_protocol::OperationKind;
use ledger_store::{RowId, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One journaled change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonic sequence number.
    pub sequence: u64,
    /// Changed table.
    pub table: Table,
    /// Changed row.
    pub row: RowId,
    /// Changed column, for updates only.
    pub column: Option<String>,
    /// Kind of change.
    pub kind: OperationKind,
}

impl JournalEntry {
    fn is_row(&self, table: Table, row: RowId) -> bool {
        self.table == table && self.row == row
    }
}

/// The journal of local changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationJournal {
    entries: Vec<JournalEntry>,
    next_sequence: u64,
    #[serde(skip)]
    in_flight_through: u64,
}

impl Default for MutationJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_sequence: 1,
            in_flight_through: 0,
        }
    }

    /// Records a change, coalescing with pending entries.
    ///
    /// `column` is only meaningful for updates. Returns the assigned
    /// sequence number, or `None` when the change was absorbed.
    pub fn record(
        &mut self,
        table: Table,
        row: RowId,
        column: Option<&str>,
        kind: OperationKind,
    ) -> Option<u64> {
        let floor = self.in_flight_through;
        let pending = |e: &JournalEntry| e.sequence > floor && e.is_row(table, row);

        let column = match kind {
            OperationKind::Create => {
                if self
                    .entries
                    .iter()
                    .any(|e| pending(e) && e.kind == OperationKind::Create)
                {
                    return None;
                }
                None
            }
            OperationKind::Update => {
                let column = column?;
                let covered = self.entries.iter().any(|e| {
                    pending(e)
                        && (e.kind == OperationKind::Create
                            || (e.kind == OperationKind::Update
                                && e.column.as_deref() == Some(column)))
                });
                if covered {
                    return None;
                }
                Some(column.to_string())
            }
            OperationKind::Delete => {
                let created = self
                    .entries
                    .iter()
                    .any(|e| pending(e) && e.kind == OperationKind::Create);
                let deleted = self
                    .entries
                    .iter()
                    .any(|e| pending(e) && e.kind == OperationKind::Delete);
                self.entries
                    .retain(|e| !(pending(e) && e.kind != OperationKind::Delete));
                if created || deleted {
                    return None;
                }
                None // deletes name the whole row
            }
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push(JournalEntry {
            sequence,
            table,
            row,
            column,
            kind,
        });
        Some(sequence)
    }

    /// Returns and removes every entry.
    pub fn flush(&mut self) -> Vec<JournalEntry> {
        self.in_flight_through = 0;
        std::mem::take(&mut self.entries)
    }

    /// Snapshots all entries for upload and marks them in flight.
    pub fn begin_upload(&mut self) -> JournalSnapshot {
        let snapshot = JournalSnapshot::from_entries(&self.entries);
        self.in_flight_through = self.in_flight_through.max(snapshot.through());
        snapshot
    }

    /// Removes entries up to and including `sequence`.
    ///
    /// Returns the number of entries removed.
    pub fn acknowledge_through(&mut self, sequence: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.sequence > sequence);
        if sequence >= self.in_flight_through {
            self.in_flight_through = 0;
        }
        before - self.entries.len()
    }

    /// Returns in-flight entries to pending.
    pub fn abort_upload(&mut self) {
        self.in_flight_through = 0;
    }

    /// Returns true while an upload is outstanding.
    pub fn is_uploading(&self) -> bool {
        self.in_flight_through > 0
    }

    /// Returns all entries in sequence order.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Iterates over entries not handed out for upload.
    pub fn pending(&self) -> impl Iterator<Item = &JournalEntry> {
        let floor = self.in_flight_through;
        self.entries.iter().filter(move |e| e.sequence > floor)
    }

    /// Returns the sequence the next entry will get.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the journal is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A frozen view of journal entries, grouped for upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalSnapshot {
    through: u64,
    len: usize,
    agenda: BTreeMap<OperationKind, BTreeMap<Table, BTreeSet<RowId>>>,
    columns: BTreeMap<(Table, RowId), BTreeSet<String>>,
}

impl JournalSnapshot {
    /// Groups entries by kind, table and row.
    pub fn from_entries(entries: &[JournalEntry]) -> Self {
        let mut snapshot = Self::default();
        for entry in entries {
            snapshot.through = snapshot.through.max(entry.sequence);
            snapshot.len += 1;
            snapshot
                .agenda
                .entry(entry.kind)
                .or_default()
                .entry(entry.table)
                .or_default()
                .insert(entry.row);
            if let (OperationKind::Update, Some(column)) = (entry.kind, &entry.column) {
                snapshot
                    .columns
                    .entry((entry.table, entry.row))
                    .or_default()
                    .insert(column.clone());
            }
        }
        snapshot
    }

    /// Returns the highest sequence covered, 0 for an empty snapshot.
    pub fn through(&self) -> u64 {
        self.through
    }

    /// Returns the rows with entries of `kind`, per table.
    pub fn agenda(&self, kind: OperationKind) -> impl Iterator<Item = (Table, &BTreeSet<RowId>)> {
        self.agenda
            .get(&kind)
            .into_iter()
            .flat_map(|tables| tables.iter().map(|(table, rows)| (*table, rows)))
    }

    /// Returns the updated columns of a row.
    pub fn columns(&self, table: Table, row: RowId) -> Option<&BTreeSet<String>> {
        self.columns.get(&(table, row))
    }

    /// Returns the number of entries covered.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the snapshot covers nothing.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
