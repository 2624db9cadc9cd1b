//! Delta application planning.
//!
//! [`plan`] turns a [`DeltaPayload`] into the operations that bring the
//! local store up to date, without touching the store. The plan is then
//! committed as one batch with journaling suspended.
//!
//! ## Rules
//!
//! - A column changes only when the payload revision is strictly greater
//!   than the recorded one. Equal revisions are already applied.
//! - Sections run created, updated, deleted, each in array order. Later
//!   entries see what earlier entries of the same payload did.
//! - Malformed entries are counted and skipped; they never abort the rest.

use crate::error::SyncResult;
use ledger_core::{CoreError, JournalMode, LedgerDb, Operation, RevisionSnapshot};
use ledger_protocol::{DeltaEntry, DeltaPayload, OperationKind};
use ledger_store::{Cells, RecordStore, RowId, Table};
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome counters of one delta application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Rows created.
    pub inserted: u64,
    /// Rows with at least one column updated.
    pub updated: u64,
    /// Rows deleted.
    pub deleted: u64,
    /// Entries already applied or superseded.
    pub stale: u64,
    /// Entries rejected because of a row conflict.
    pub skipped: u64,
    /// Entries, or the anchor, that could not be decoded.
    pub parse_failures: u64,
}

impl ApplyStats {
    /// Returns true if nothing was skipped or malformed.
    pub fn is_clean(&self) -> bool {
        self.skipped == 0 && self.parse_failures == 0
    }

    /// Returns the number of entries accounted for.
    pub fn entries_seen(&self) -> u64 {
        self.inserted + self.updated + self.deleted + self.stale + self.skipped + self.parse_failures
    }

    /// Adds another report to this one.
    pub fn merge(&mut self, other: &ApplyStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.stale += other.stale;
        self.skipped += other.skipped;
        self.parse_failures += other.parse_failures;
    }
}

/// The operations a delta calls for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaPlan {
    /// Record and revision operations, in application order.
    pub operations: Vec<Operation>,
    /// What the plan does, per entry.
    pub stats: ApplyStats,
    /// The payload anchor, if it was valid.
    pub anchor: Option<u64>,
}

impl DeltaPlan {
    /// Returns true if the plan writes nothing.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.anchor.is_none()
    }
}

/// Plans the application of `payload` against the given revisions and
/// records.
///
/// # Errors
///
/// Fails only if reading `records` fails. Problems with the payload itself
/// end up in [`ApplyStats`].
pub fn plan<S>(
    payload: &DeltaPayload,
    revisions: &RevisionSnapshot,
    records: &S,
) -> SyncResult<DeltaPlan>
where
    S: RecordStore + ?Sized,
{
    let mut planner = Planner {
        records,
        revisions: revisions.clone(),
        present: HashMap::new(),
        plan: DeltaPlan::default(),
    };

    for kind in OperationKind::ALL {
        for (index, value) in payload.entries(kind).iter().enumerate() {
            match DeltaEntry::decode(kind, value) {
                Ok(entry) => planner.entry(kind, &entry)?,
                Err(e) => {
                    debug!(section = kind.section(), index, error = %e, "malformed delta entry");
                    planner.plan.stats.parse_failures += 1;
                }
            }
        }
    }

    match payload.anchor() {
        Ok(anchor) => planner.plan.anchor = Some(anchor),
        Err(e) => {
            debug!(error = %e, "delta without usable anchor");
            planner.plan.stats.parse_failures += 1;
        }
    }

    Ok(planner.plan)
}

/// Plans `payload` against the committed state of `db` and commits the
/// plan, with the payload anchor, as one batch.
///
/// Nothing is journaled. Applying the same payload again is a no-op.
///
/// # Errors
///
/// Returns [`crate::SyncError::Core`] if the batch fails; nothing is
/// committed in that case.
pub fn apply(db: &LedgerDb, payload: &DeltaPayload) -> SyncResult<ApplyStats> {
    let state = db.snapshot();
    let plan = plan(payload, &state.revisions().snapshot(), state.records())?;
    let mut operations = plan.operations;
    if let Some(anchor) = plan.anchor {
        operations.push(Operation::SetAnchor(anchor));
    }
    let count = operations.len();
    db.apply_batch(operations, JournalMode::Suspended)?;
    info!(
        operations = count,
        inserted = plan.stats.inserted,
        updated = plan.stats.updated,
        deleted = plan.stats.deleted,
        stale = plan.stats.stale,
        skipped = plan.stats.skipped,
        parse_failures = plan.stats.parse_failures,
        "applied delta"
    );
    Ok(plan.stats)
}

struct Planner<'a, S: ?Sized> {
    records: &'a S,
    revisions: RevisionSnapshot,
    present: HashMap<(Table, RowId), bool>,
    plan: DeltaPlan,
}

impl<S: RecordStore + ?Sized> Planner<'_, S> {
    fn entry(&mut self, kind: OperationKind, entry: &DeltaEntry) -> SyncResult<()> {
        match kind {
            OperationKind::Create => self.create(entry),
            OperationKind::Update => self.update(entry),
            OperationKind::Delete => self.delete(entry),
        }
    }

    fn create(&mut self, entry: &DeltaEntry) -> SyncResult<()> {
        let (table, row) = (entry.table, entry.row);
        if self.exists(table, row)? {
            debug!(%table, row, "create for existing row");
            self.plan.stats.skipped += 1;
            return Ok(());
        }
        // Row ids are never reused, so revisions left behind by an absent
        // row are tombstones.
        if self.revisions.contains_row(table, row) {
            debug!(%table, row, "create behind tombstone");
            self.plan.stats.stale += 1;
            return Ok(());
        }

        self.plan.operations.push(Operation::Insert {
            table,
            row,
            cells: entry.data.clone(),
        });
        for (column, revision) in &entry.revisions {
            self.set_revision(table, row, column, *revision);
        }
        self.present.insert((table, row), true);
        self.plan.stats.inserted += 1;
        Ok(())
    }

    fn update(&mut self, entry: &DeltaEntry) -> SyncResult<()> {
        let (table, row) = (entry.table, entry.row);
        if !self.exists(table, row)? {
            debug!(%table, row, "update for missing row");
            self.plan.stats.stale += 1;
            return Ok(());
        }
        let newer = self.newer_columns(entry);
        if newer.is_empty() {
            self.plan.stats.stale += 1;
            return Ok(());
        }

        let cells: Cells = newer
            .iter()
            .filter_map(|(column, _)| {
                entry
                    .data
                    .get(column)
                    .map(|cell| (column.clone(), cell.clone()))
            })
            .collect();
        self.plan
            .operations
            .push(Operation::Update { table, row, cells });
        for (column, revision) in newer {
            self.set_revision(table, row, &column, revision);
        }
        self.plan.stats.updated += 1;
        Ok(())
    }

    fn delete(&mut self, entry: &DeltaEntry) -> SyncResult<()> {
        let (table, row) = (entry.table, entry.row);
        let newer = self.newer_columns(entry);
        if newer.is_empty() {
            self.plan.stats.stale += 1;
            return Ok(());
        }

        let removed = self.exists(table, row)?;
        if removed {
            self.plan.operations.push(Operation::Delete { table, row });
        }
        for (column, revision) in newer {
            self.set_revision(table, row, &column, revision);
        }
        self.present.insert((table, row), false);
        if removed {
            self.plan.stats.deleted += 1;
        } else {
            debug!(%table, row, "delete for missing row");
            self.plan.stats.stale += 1;
        }
        Ok(())
    }

    fn newer_columns(&self, entry: &DeltaEntry) -> Vec<(String, i64)> {
        entry
            .revisions
            .iter()
            .filter(|(column, revision)| {
                **revision > self.revisions.revision_of(entry.table, entry.row, column)
            })
            .map(|(column, revision)| (column.clone(), *revision))
            .collect()
    }

    fn exists(&self, table: Table, row: RowId) -> SyncResult<bool> {
        match self.present.get(&(table, row)) {
            Some(present) => Ok(*present),
            None => Ok(self
                .records
                .contains(table, row)
                .map_err(CoreError::from)?),
        }
    }

    fn set_revision(&mut self, table: Table, row: RowId, column: &str, revision: i64) {
        self.revisions.set(table, row, column, revision);
        self.plan.operations.push(Operation::SetRevision {
            table,
            row,
            column: column.to_string(),
            revision,
        });
    }
}
