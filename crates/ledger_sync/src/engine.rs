//! Sync engine state machine.

use crate::applier::{plan, ApplyStats};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::lease::LeaseRenewer;
use crate::marshal::{acknowledgements, marshal};
use crate::transport::SyncTransport;
use ledger_core::{JournalMode, JournalSnapshot, KeyLease, LedgerDb, Operation, OperationResult};
use ledger_store::{Cells, RowId, Table};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is sending local changes and waiting for the delta.
    Uploading,
    /// Engine is applying the delta.
    Applying,
    /// Engine has completed a sync cycle.
    Synced,
    /// Engine encountered an error.
    Error,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Uploading | SyncState::Applying)
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of cycles that failed.
    pub cycles_failed: u64,
    /// Total number of entries uploaded.
    pub entries_uploaded: u64,
    /// Delta application counters over all cycles.
    pub applied: ApplyStats,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Number of entries uploaded.
    pub uploaded: u64,
    /// Number of journal entries acknowledged.
    pub acknowledged: u64,
    /// What the delta did.
    pub applied: ApplyStats,
    /// The anchor after the cycle.
    pub anchor: u64,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

/// The sync engine uploads local changes and applies server deltas.
///
/// One cycle:
/// 1. Hand the pending journal out for upload and marshal it
/// 2. Exchange the upload for a delta
/// 3. Commit, in one batch with journaling suspended, the revision bumps
///    acknowledging the upload, the delta, the new anchor and the removal
///    of the uploaded journal entries
///
/// A failed cycle returns the journal entries to pending and commits
/// nothing, so it can simply be run again.
pub struct SyncEngine<T: SyncTransport> {
    config: SyncConfig,
    db: Arc<LedgerDb>,
    transport: Arc<T>,
    leases: LeaseRenewer<T>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, db: Arc<LedgerDb>, transport: T) -> Self {
        let transport = Arc::new(transport);
        let leases = LeaseRenewer::new(
            Arc::clone(&db),
            Arc::clone(&transport),
            config.lease_timeout,
        );
        Self {
            config,
            db,
            transport,
            leases,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the database.
    pub fn db(&self) -> &Arc<LedgerDb> {
        &self.db
    }

    /// Returns the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels any ongoing sync operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Renews the key lease.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LeaseRenewalFailed`] if no lease was granted.
    pub async fn renew_lease(&self) -> SyncResult<KeyLease> {
        self.leases.renew().await
    }

    /// Inserts a local record, renewing the key lease if it ran out.
    ///
    /// # Errors
    ///
    /// See [`LeaseRenewer::insert_with_renewal`].
    pub async fn insert(&self, table: Table, cells: Cells) -> SyncResult<RowId> {
        self.leases.insert_with_renewal(table, cells).await
    }

    /// Performs one sync cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if a cycle is already
    /// running, otherwise the error that ended the cycle.
    pub async fn sync(&self) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        {
            let mut state = self.state.write();
            if !state.can_start_sync() {
                return Err(SyncError::InvalidStateTransition {
                    from: format!("{:?}", *state),
                    to: "sync".into(),
                });
            }
            *state = SyncState::Uploading;
        }
        self.reset_cancel();
        let mut guard = CycleGuard::new(self);

        let journal = match self.db.begin_upload() {
            Ok(journal) => journal,
            Err(e) => return Err(guard.fail(e.into())),
        };
        guard.uploading = true;

        match self.cycle(&journal, start).await {
            Ok(result) => {
                guard.finish();
                self.set_state(SyncState::Synced);
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.entries_uploaded += result.uploaded;
                    stats.applied.merge(&result.applied);
                    stats.last_sync_time = Some(Instant::now());
                    stats.last_error = None;
                }
                info!(
                    uploaded = result.uploaded,
                    inserted = result.applied.inserted,
                    updated = result.applied.updated,
                    deleted = result.applied.deleted,
                    stale = result.applied.stale,
                    skipped = result.applied.skipped,
                    parse_failures = result.applied.parse_failures,
                    anchor = result.anchor,
                    "sync cycle complete"
                );
                Ok(result)
            }
            Err(e) => Err(guard.fail(e)),
        }
    }

    async fn cycle(&self, journal: &JournalSnapshot, start: Instant) -> SyncResult<SyncCycleResult> {
        let state = self.db.snapshot();
        let mut revisions = state.revisions().snapshot();
        let upload = marshal(journal, &revisions, state.records(), state.anchor())?;

        self.check_cancelled()?;
        let delta = tokio::time::timeout(self.config.request_timeout, self.transport.exchange(&upload))
            .await
            .map_err(|_| SyncError::Timeout)??;
        self.check_cancelled()?;

        self.set_state(SyncState::Applying);
        let mut operations = acknowledgements(&upload)?;
        for op in &operations {
            if let Operation::SetRevision {
                table,
                row,
                column,
                revision,
            } = op
            {
                revisions.set(*table, *row, column.clone(), *revision);
            }
        }

        let current = self.db.snapshot();
        let plan = plan(&delta, &revisions, current.records())?;
        operations.extend(plan.operations);
        if let Some(anchor) = plan.anchor {
            operations.push(Operation::SetAnchor(anchor));
        }
        operations.push(Operation::AcknowledgeJournal {
            through: journal.through(),
        });

        let results = self.db.apply_batch(operations, JournalMode::Suspended)?;
        let acknowledged = results.last().map_or(0, OperationResult::rows_affected);

        Ok(SyncCycleResult {
            uploaded: upload.len() as u64,
            acknowledged: acknowledged as u64,
            applied: plan.stats,
            anchor: self.db.anchor(),
            duration: start.elapsed(),
        })
    }

    fn handle_error(&self, error: &SyncError) {
        self.set_state(SyncState::Error);
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
        stats.last_error = Some(error.to_string());
    }
}

/// Leaves the engine restartable when a cycle ends without completing,
/// including when the `sync` future is dropped mid-exchange.
struct CycleGuard<'a, T: SyncTransport> {
    engine: &'a SyncEngine<T>,
    uploading: bool,
    done: bool,
}

impl<'a, T: SyncTransport> CycleGuard<'a, T> {
    fn new(engine: &'a SyncEngine<T>) -> Self {
        Self {
            engine,
            uploading: false,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
    }

    fn fail(&mut self, error: SyncError) -> SyncError {
        self.release();
        self.engine.handle_error(&error);
        self.done = true;
        error
    }

    fn release(&self) {
        if self.uploading {
            if let Err(abort) = self.engine.db.abort_upload() {
                warn!(error = %abort, "could not return journal entries to pending");
            }
        }
    }
}

impl<T: SyncTransport> Drop for CycleGuard<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            warn!("sync cycle dropped before completion");
            self.release();
            self.engine.handle_error(&SyncError::Cancelled);
        }
    }
}

impl<T: SyncTransport> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("leases", &self.leases)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use ledger_protocol::{DeltaPayload, KeyLeaseResponse};
    use ledger_store::Cell;

    fn engine() -> SyncEngine<MockTransport> {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        SyncEngine::new(SyncConfig::default(), db, MockTransport::new())
    }

    fn caption(text: &str) -> Cells {
        let mut cells = Cells::new();
        cells.insert("caption".into(), Cell::from(text));
        cells
    }

    #[test]
    fn state_predicates() {
        assert!(SyncState::Uploading.is_active());
        assert!(SyncState::Applying.is_active());
        assert!(!SyncState::Synced.is_active());
        assert!(SyncState::Idle.can_start_sync());
        assert!(SyncState::Error.can_start_sync());
        assert!(!SyncState::Applying.can_start_sync());
    }

    #[tokio::test]
    async fn empty_cycle_stores_anchor() {
        let engine = engine();
        engine.transport().push_delta(DeltaPayload::new().with_anchor(5));

        let result = engine.sync().await.unwrap();
        assert_eq!(result.uploaded, 0);
        assert_eq!(result.anchor, 5);
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(engine.stats().cycles_completed, 1);
    }

    #[tokio::test]
    async fn failed_exchange_keeps_journal() {
        let engine = engine();
        engine.transport().push_lease(KeyLeaseResponse::new(1, 10));
        engine.insert(Table::Categories, caption("Food")).await.unwrap();
        engine
            .transport()
            .push_exchange_error(SyncError::transport_retryable("offline"));

        let err = engine.sync().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.state(), SyncState::Error);
        assert_eq!(engine.db().journal().len(), 1);
        assert!(!engine.db().snapshot().journal().is_uploading());
        assert_eq!(engine.stats().cycles_failed, 1);
    }

    #[tokio::test]
    async fn abandoned_cycle_can_be_rerun() {
        let engine = engine();
        engine.transport().push_lease(KeyLeaseResponse::new(1, 10));
        engine.insert(Table::Categories, caption("Food")).await.unwrap();
        engine.transport().push_delta(DeltaPayload::new().with_anchor(2));
        engine.transport().set_delay(Some(Duration::from_millis(500)));

        let abandoned = tokio::time::timeout(Duration::from_millis(20), engine.sync()).await;
        assert!(abandoned.is_err());
        assert_eq!(engine.state(), SyncState::Error);
        assert_eq!(engine.stats().cycles_failed, 1);
        assert!(!engine.db().snapshot().journal().is_uploading());

        engine.transport().set_delay(None);
        let result = engine.sync().await.unwrap();
        assert_eq!(result.uploaded, 1);
        assert_eq!(result.anchor, 2);
        assert_eq!(engine.state(), SyncState::Synced);
        assert!(engine.db().journal().is_empty());
    }

    #[tokio::test]
    async fn slow_exchange_times_out() {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        let config = SyncConfig::default().with_request_timeout(Duration::from_millis(50));
        let engine = SyncEngine::new(config, db, MockTransport::new());
        engine.transport().push_delta(DeltaPayload::new().with_anchor(1));
        engine.transport().set_delay(Some(Duration::from_secs(5)));

        assert!(matches!(engine.sync().await, Err(SyncError::Timeout)));
        assert_eq!(engine.db().anchor(), 0);
    }
}
