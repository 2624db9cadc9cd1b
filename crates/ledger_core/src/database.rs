//! The ledger database facade.

use crate::config::DbConfig;
use crate::error::{CoreError, CoreResult};
use crate::journal::{JournalEntry, JournalSnapshot};
use crate::keys::KeyLease;
use crate::revision::RevisionSnapshot;
use crate::transaction::{JournalMode, Operation, OperationResult, SharedTransaction, State};
use ledger_store::{Cells, Filter, Record, RecordStore, RowId, SnapshotFile, Table, ID_COLUMN};
use std::path::Path;
use std::sync::Arc;

/// The main ledger database handle.
///
/// `LedgerDb` is the local side of synchronization. It provides:
/// - CRUD on typed records, with row ids drawn from the key lease
/// - Journaling of local changes and revision tracking for their columns
/// - Atomic batches for the sync engine
/// - Optional persistence to a snapshot file
///
/// # Thread Safety
///
/// `LedgerDb` is `Send + Sync`. Writers are serialized; readers see the last
/// committed state.
///
/// # Example
///
/// ```rust
/// use ledger_core::LedgerDb;
/// use ledger_store::{Cell, Cells, Table};
///
/// let db = LedgerDb::open_in_memory().unwrap();
/// db.install_lease(1, 100).unwrap();
///
/// let mut cells = Cells::new();
/// cells.insert("caption".into(), Cell::from("Food"));
/// let row = db.insert(Table::Categories, cells).unwrap();
///
/// assert_eq!(row, 1);
/// assert_eq!(db.journal().len(), 1);
/// ```
pub struct LedgerDb {
    txn: SharedTransaction,
    config: DbConfig,
}

impl LedgerDb {
    /// Opens a database persisted at `path`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Fails if an existing snapshot cannot be read or is unusable.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(DbConfig::new().with_path(path))
    }

    /// Opens a database that lives only in memory.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches [`LedgerDb::open`].
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_config(DbConfig::new())
    }

    /// Opens a database with explicit configuration.
    ///
    /// # Errors
    ///
    /// Fails if an existing snapshot cannot be read or is unusable.
    pub fn open_with_config(config: DbConfig) -> CoreResult<Self> {
        let (state, file) = match &config.path {
            Some(path) => {
                let file = if config.create_dirs {
                    SnapshotFile::open_with_create_dirs(path)?
                } else {
                    SnapshotFile::open(path)?
                };
                let state = file.load::<State>()?.unwrap_or_default();
                state.validate()?;
                tracing::debug!(path = %path.display(), anchor = state.anchor(), "opened ledger");
                (state, Some(file))
            }
            None => (State::default(), None),
        };
        let txn = SharedTransaction::new(state, file);
        txn.set_journaling(config.journaling);
        Ok(Self { txn, config })
    }

    /// Returns the configuration the database was opened with.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Returns the snapshot file path, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.txn.file().map(SnapshotFile::path)
    }

    /// Returns the last committed state.
    pub fn snapshot(&self) -> Arc<State> {
        self.txn.snapshot()
    }

    /// Enables or disables journaling of local writes.
    pub fn set_journaling(&self, enabled: bool) {
        self.txn.set_journaling(enabled);
    }

    /// Returns true if local writes are journaled.
    pub fn journaling(&self) -> bool {
        self.txn.journaling()
    }

    /// Inserts a record at the next key of the lease.
    ///
    /// The key is consumed only if the insert commits.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::OutOfKeys`] when the lease is exhausted, with
    /// [`CoreError::InvalidArgument`] if `cells` names `_id`, or with a store
    /// error for invalid cells.
    pub fn insert(&self, table: Table, cells: Cells) -> CoreResult<RowId> {
        if cells.contains_key(ID_COLUMN) {
            return Err(CoreError::invalid_argument(
                "row ids are assigned from the key lease",
            ));
        }
        self.txn.write(self.txn.local_mode(), |txn| {
            let row = txn.allocate_key()?;
            txn.insert(table, row, &cells)
        })
    }

    /// Updates columns of a record, returning the rows affected.
    ///
    /// # Errors
    ///
    /// Fails with a store error for invalid cells.
    pub fn update(&self, table: Table, row: RowId, cells: Cells) -> CoreResult<usize> {
        self.txn
            .write(self.txn.local_mode(), |txn| txn.update(table, row, &cells))
    }

    /// Deletes a record, returning the rows affected.
    ///
    /// # Errors
    ///
    /// Fails if the store fails.
    pub fn delete(&self, table: Table, row: RowId) -> CoreResult<usize> {
        self.txn
            .write(self.txn.local_mode(), |txn| txn.delete(table, row))
    }

    /// Reads a record.
    ///
    /// # Errors
    ///
    /// Fails if the store fails.
    pub fn get(&self, table: Table, row: RowId) -> CoreResult<Option<Record>> {
        Ok(self.snapshot().records().get(table, row)?)
    }

    /// Returns the selected records ordered by row id.
    ///
    /// # Errors
    ///
    /// Fails if the store fails.
    pub fn query(&self, table: Table, filter: &Filter) -> CoreResult<Vec<Record>> {
        Ok(self.snapshot().records().query(table, filter)?)
    }

    /// Loads the revision ledger into a snapshot.
    pub fn revision_snapshot(&self) -> RevisionSnapshot {
        self.snapshot().revisions().snapshot()
    }

    /// Returns a copy of the journal entries.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.snapshot().journal().entries().to_vec()
    }

    /// Returns and clears the whole journal in one commit.
    ///
    /// # Errors
    ///
    /// Fails if persisting the commit fails.
    pub fn flush_journal(&self) -> CoreResult<Vec<JournalEntry>> {
        self.txn
            .write(JournalMode::Suspended, |txn| Ok(txn.flush_journal()))
    }

    /// Snapshots the journal for upload and marks the entries in flight.
    ///
    /// # Errors
    ///
    /// Fails if persisting the commit fails.
    pub fn begin_upload(&self) -> CoreResult<JournalSnapshot> {
        self.txn
            .write(JournalMode::Suspended, |txn| Ok(txn.begin_upload()))
    }

    /// Returns in-flight journal entries to pending.
    ///
    /// # Errors
    ///
    /// Fails if persisting the commit fails.
    pub fn abort_upload(&self) -> CoreResult<()> {
        self.txn.write(JournalMode::Suspended, |txn| {
            txn.abort_upload();
            Ok(())
        })
    }

    /// Returns the current key lease.
    pub fn lease(&self) -> KeyLease {
        self.snapshot().lease()
    }

    /// Installs a newly granted key lease.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidArgument`] for an unusable range.
    pub fn install_lease(&self, next: RowId, upper_bound: RowId) -> CoreResult<()> {
        self.txn.write(JournalMode::Suspended, |txn| {
            txn.install_lease(next, upper_bound)
        })?;
        tracing::debug!(next, upper_bound, "installed key lease");
        Ok(())
    }

    /// Takes the next key from the lease in its own commit.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::OutOfKeys`] when the lease is exhausted.
    pub fn allocate_key(&self) -> CoreResult<RowId> {
        self.txn
            .write(JournalMode::Suspended, |txn| txn.allocate_key())
    }

    /// Returns the sync anchor.
    pub fn anchor(&self) -> u64 {
        self.snapshot().anchor()
    }

    /// Applies a batch of operations atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BatchFailed`] if any operation fails.
    pub fn apply_batch(
        &self,
        operations: Vec<Operation>,
        mode: JournalMode,
    ) -> CoreResult<Vec<OperationResult>> {
        self.txn.apply_batch(operations, mode)
    }
}

impl std::fmt::Debug for LedgerDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerDb")
            .field("path", &self.path())
            .field("txn", &self.txn)
            .finish()
    }
}
