//! Shared transaction coordinator.
//!
//! All writes to the ledger, local edits and sync batches alike, go through
//! one [`SharedTransaction`]. It provides:
//! - **Atomicity**: a batch commits completely or not at all
//! - **Serialization**: a single write lock orders every writer
//! - **Isolation**: readers see the last committed [`State`] and never a
//!   half-applied batch
//! - **Durability** (optional): the committed state is written to a
//!   [`SnapshotFile`] before it becomes visible

use crate::error::{CoreError, CoreResult};
use crate::journal::{JournalEntry, JournalSnapshot, MutationJournal};
use crate::keys::KeyLease;
use crate::revision::RevisionLedger;
use ledger_protocol::OperationKind;
use ledger_store::{Cells, MemoryStore, Record, RecordStore, RowId, SnapshotFile, Table};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Current snapshot format version.
pub const FORMAT_VERSION: u32 = 1;

/// Everything the ledger persists, committed as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    format_version: u32,
    records: MemoryStore,
    revisions: RevisionLedger,
    journal: MutationJournal,
    lease: KeyLease,
    anchor: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            records: MemoryStore::new(),
            revisions: RevisionLedger::new(),
            journal: MutationJournal::new(),
            lease: KeyLease::default(),
            anchor: 0,
        }
    }
}

impl State {
    /// Returns the record store.
    pub fn records(&self) -> &MemoryStore {
        &self.records
    }

    /// Returns the revision ledger.
    pub fn revisions(&self) -> &RevisionLedger {
        &self.revisions
    }

    /// Returns the mutation journal.
    pub fn journal(&self) -> &MutationJournal {
        &self.journal
    }

    /// Returns the key lease.
    pub fn lease(&self) -> KeyLease {
        self.lease
    }

    /// Returns the sync anchor, 0 before the first sync.
    pub fn anchor(&self) -> u64 {
        self.anchor
    }

    /// Checks that a loaded state can be used.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Snapshot`] for an unknown format version.
    pub fn validate(&self) -> CoreResult<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(CoreError::Snapshot {
                message: format!(
                    "unsupported format version {} (expected {FORMAT_VERSION})",
                    self.format_version
                ),
            });
        }
        Ok(())
    }
}

/// Whether local-origin writes of a transaction are journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Record changes in the mutation journal and track revisions.
    Record,
    /// Write without journaling, as for changes that came from the server.
    Suspended,
}

impl From<bool> for JournalMode {
    fn from(journaling: bool) -> Self {
        if journaling {
            Self::Record
        } else {
            Self::Suspended
        }
    }
}

/// One operation of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Insert a record at an explicit row.
    Insert {
        /// Target table.
        table: Table,
        /// Row id.
        row: RowId,
        /// Column values.
        cells: Cells,
    },
    /// Overwrite columns of a record.
    Update {
        /// Target table.
        table: Table,
        /// Row id.
        row: RowId,
        /// Column values.
        cells: Cells,
    },
    /// Delete a record.
    Delete {
        /// Target table.
        table: Table,
        /// Row id.
        row: RowId,
    },
    /// Upsert a revision ledger entry.
    SetRevision {
        /// Target table.
        table: Table,
        /// Row id.
        row: RowId,
        /// Column name.
        column: String,
        /// New revision.
        revision: i64,
    },
    /// Persist the sync anchor.
    SetAnchor(u64),
    /// Drop journal entries the server accepted.
    AcknowledgeJournal {
        /// Highest acknowledged sequence.
        through: u64,
    },
    /// Replace the key lease.
    InstallLease {
        /// First usable key.
        next: RowId,
        /// Exclusive upper bound.
        upper_bound: RowId,
    },
}

/// Outcome of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// A record was inserted at this row.
    Inserted(RowId),
    /// Number of rows or entries touched, 0 for a no-op.
    Affected(usize),
    /// The operation has no count.
    Done,
}

impl OperationResult {
    /// Returns the number of rows affected.
    pub fn rows_affected(&self) -> usize {
        match self {
            Self::Inserted(_) => 1,
            Self::Affected(n) => *n,
            Self::Done => 0,
        }
    }
}

/// A write in progress on a private copy of the state.
///
/// Dropping it without returning `Ok` from the closure passed to
/// [`SharedTransaction::write`] discards every change.
pub struct WriteTxn {
    state: State,
    mode: JournalMode,
}

impl WriteTxn {
    /// Returns the state including this transaction's own writes.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns the journal mode.
    pub fn mode(&self) -> JournalMode {
        self.mode
    }

    /// Inserts a record. Journals a create and tracks every column.
    ///
    /// # Errors
    ///
    /// Fails on a row conflict or invalid cells.
    pub fn insert(&mut self, table: Table, row: RowId, cells: &Cells) -> CoreResult<RowId> {
        self.state.records.insert(table, row, cells)?;
        if self.mode == JournalMode::Record {
            for column in table.column_names() {
                self.state.revisions.ensure_tracked(table, row, column);
            }
            self.state
                .journal
                .record(table, row, None, OperationKind::Create);
        }
        Ok(row)
    }

    /// Updates a record. Journals only the columns whose value changed.
    ///
    /// # Errors
    ///
    /// Fails on invalid cells.
    pub fn update(&mut self, table: Table, row: RowId, cells: &Cells) -> CoreResult<usize> {
        let changed = match (self.mode, self.state.records.get(table, row)?) {
            (JournalMode::Record, Some(mut record)) => record.apply(cells)?,
            _ => Vec::new(),
        };
        let affected = self.state.records.update(table, row, cells)?;
        for column in &changed {
            self.state.revisions.ensure_tracked(table, row, column);
            self.state
                .journal
                .record(table, row, Some(column), OperationKind::Update);
        }
        Ok(affected)
    }

    /// Deletes a record. Revisions stay behind as tombstones.
    ///
    /// # Errors
    ///
    /// Fails if the store fails.
    pub fn delete(&mut self, table: Table, row: RowId) -> CoreResult<usize> {
        let affected = self.state.records.delete(table, row)?;
        if affected > 0 && self.mode == JournalMode::Record {
            self.state
                .journal
                .record(table, row, None, OperationKind::Delete);
        }
        Ok(affected)
    }

    /// Reads a record as of this transaction.
    ///
    /// # Errors
    ///
    /// Fails if the store fails.
    pub fn get(&self, table: Table, row: RowId) -> CoreResult<Option<Record>> {
        Ok(self.state.records.get(table, row)?)
    }

    /// Upserts a revision.
    ///
    /// # Errors
    ///
    /// Fails on a negative revision or unknown column.
    pub fn set_revision(
        &mut self,
        table: Table,
        row: RowId,
        column: &str,
        revision: i64,
    ) -> CoreResult<()> {
        self.state
            .revisions
            .set_revision(table, row, column, revision)
    }

    /// Sets the sync anchor.
    pub fn set_anchor(&mut self, anchor: u64) {
        self.state.anchor = anchor;
    }

    /// Takes a key from the lease.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::OutOfKeys`] when the lease is exhausted.
    pub fn allocate_key(&mut self) -> CoreResult<RowId> {
        self.state.lease.allocate()
    }

    /// Replaces the key lease.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidArgument`] for an unusable range.
    pub fn install_lease(&mut self, next: RowId, upper_bound: RowId) -> CoreResult<()> {
        self.state.lease.install(next, upper_bound)
    }

    /// Returns and clears the whole journal.
    pub fn flush_journal(&mut self) -> Vec<JournalEntry> {
        self.state.journal.flush()
    }

    /// Snapshots the journal for upload.
    pub fn begin_upload(&mut self) -> JournalSnapshot {
        self.state.journal.begin_upload()
    }

    /// Returns in-flight journal entries to pending.
    pub fn abort_upload(&mut self) {
        self.state.journal.abort_upload();
    }

    /// Drops acknowledged journal entries.
    pub fn acknowledge_journal(&mut self, through: u64) -> usize {
        self.state.journal.acknowledge_through(through)
    }

    /// Applies one batch operation.
    ///
    /// # Errors
    ///
    /// Returns the operation's error.
    pub fn apply(&mut self, operation: Operation) -> CoreResult<OperationResult> {
        Ok(match operation {
            Operation::Insert { table, row, cells } => {
                OperationResult::Inserted(self.insert(table, row, &cells)?)
            }
            Operation::Update { table, row, cells } => {
                OperationResult::Affected(self.update(table, row, &cells)?)
            }
            Operation::Delete { table, row } => OperationResult::Affected(self.delete(table, row)?),
            Operation::SetRevision {
                table,
                row,
                column,
                revision,
            } => {
                self.set_revision(table, row, &column, revision)?;
                OperationResult::Done
            }
            Operation::SetAnchor(anchor) => {
                self.set_anchor(anchor);
                OperationResult::Done
            }
            Operation::AcknowledgeJournal { through } => {
                OperationResult::Affected(self.acknowledge_journal(through))
            }
            Operation::InstallLease { next, upper_bound } => {
                self.install_lease(next, upper_bound)?;
                OperationResult::Done
            }
        })
    }
}

/// Serializes writers and publishes committed state to readers.
///
/// # Commit Protocol
///
/// 1. Take the write lock
/// 2. Copy the committed state into a [`WriteTxn`]
/// 3. Run the writer against the copy
/// 4. Save the copy to the snapshot file, if any
/// 5. Swap the copy in as the committed state
///
/// A failure in steps 3 or 4 leaves the committed state untouched.
pub struct SharedTransaction {
    committed: RwLock<Arc<State>>,
    write_lock: Mutex<()>,
    journaling: AtomicBool,
    commits: AtomicU64,
    file: Option<SnapshotFile>,
}

impl SharedTransaction {
    /// Creates a coordinator over an initial state.
    pub fn new(state: State, file: Option<SnapshotFile>) -> Self {
        Self {
            committed: RwLock::new(Arc::new(state)),
            write_lock: Mutex::new(()),
            journaling: AtomicBool::new(true),
            commits: AtomicU64::new(0),
            file,
        }
    }

    /// Returns the last committed state.
    pub fn snapshot(&self) -> Arc<State> {
        Arc::clone(&self.committed.read())
    }

    /// Returns the snapshot file, if the state is persisted.
    pub fn file(&self) -> Option<&SnapshotFile> {
        self.file.as_ref()
    }

    /// Returns the number of commits since creation.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Enables or disables journaling of local writes.
    pub fn set_journaling(&self, enabled: bool) {
        self.journaling.store(enabled, Ordering::SeqCst);
    }

    /// Returns true if local writes are journaled.
    pub fn journaling(&self) -> bool {
        self.journaling.load(Ordering::SeqCst)
    }

    /// Returns the journal mode for local writes.
    pub fn local_mode(&self) -> JournalMode {
        JournalMode::from(self.journaling())
    }

    /// Runs `f` as one atomic write.
    ///
    /// # Errors
    ///
    /// Returns the writer's error, or a store error if persisting fails.
    /// Nothing is committed in either case.
    pub fn write<T, F>(&self, mode: JournalMode, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTxn) -> CoreResult<T>,
    {
        let _guard = self.write_lock.lock();
        let mut txn = WriteTxn {
            state: State::clone(&self.snapshot()),
            mode,
        };
        let value = f(&mut txn)?;
        if let Some(file) = &self.file {
            file.save(&txn.state)?;
        }
        *self.committed.write() = Arc::new(txn.state);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    /// Applies a batch of operations atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BatchFailed`] naming the first failing
    /// operation; no operation of the batch is committed.
    pub fn apply_batch(
        &self,
        operations: Vec<Operation>,
        mode: JournalMode,
    ) -> CoreResult<Vec<OperationResult>> {
        let count = operations.len();
        let results = self.write(mode, |txn| {
            operations
                .into_iter()
                .enumerate()
                .map(|(index, op)| {
                    txn.apply(op)
                        .map_err(|e| CoreError::batch_failed(index, e))
                })
                .collect::<CoreResult<Vec<_>>>()
        })?;
        tracing::debug!(operations = count, mode = ?mode, "committed batch");
        Ok(results)
    }
}

impl std::fmt::Debug for SharedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTransaction")
            .field("commits", &self.commit_count())
            .field("journaling", &self.journaling())
            .field("persisted", &self.file.is_some())
            .finish()
    }
}
