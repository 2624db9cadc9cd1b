//! Upload marshalling.
//!
//! The outbound counterpart of [`crate::applier`]: journaled changes become
//! an [`UploadPayload`] whose entries look like delta entries.

use crate::error::SyncResult;
use ledger_core::{CoreError, JournalSnapshot, Operation, RevisionSnapshot};
use ledger_protocol::{DeltaEntry, OperationKind, UploadPayload};
use ledger_store::{RecordStore, ID_COLUMN};
use tracing::debug;

/// Builds the upload for a journal snapshot.
///
/// Created rows carry every column, updated rows the journaled columns,
/// deleted rows their recorded revisions without data. Each column carries
/// its current revision. Created or updated rows that no longer exist are
/// left out.
///
/// # Errors
///
/// Fails only if reading `records` fails.
pub fn marshal<S>(
    journal: &JournalSnapshot,
    revisions: &RevisionSnapshot,
    records: &S,
    anchor: u64,
) -> SyncResult<UploadPayload>
where
    S: RecordStore + ?Sized,
{
    let mut upload = UploadPayload::new(anchor);

    for (table, rows) in journal.agenda(OperationKind::Create) {
        for &row in rows {
            let Some(record) = records.get(table, row).map_err(CoreError::from)? else {
                debug!(%table, row, "created row vanished before upload");
                continue;
            };
            let entry = record
                .to_cells()
                .into_iter()
                .fold(DeltaEntry::new(table, row), |entry, (column, cell)| {
                    let revision = revisions.revision_of(table, row, &column);
                    entry.with_column(column, revision, cell)
                });
            upload.push(OperationKind::Create, entry);
        }
    }

    for (table, rows) in journal.agenda(OperationKind::Update) {
        for &row in rows {
            let Some(record) = records.get(table, row).map_err(CoreError::from)? else {
                debug!(%table, row, "updated row vanished before upload");
                continue;
            };
            let Some(columns) = journal.columns(table, row) else {
                continue;
            };
            let mut entry = DeltaEntry::new(table, row);
            for column in columns {
                let cell = record.get(column).map_err(CoreError::from)?;
                entry = entry.with_column(
                    column.clone(),
                    revisions.revision_of(table, row, column),
                    cell,
                );
            }
            upload.push(OperationKind::Update, entry);
        }
    }

    for (table, rows) in journal.agenda(OperationKind::Delete) {
        for &row in rows {
            let entry = match revisions.revisions_for_row(table, row) {
                Some(recorded) if !recorded.is_empty() => recorded
                    .iter()
                    .fold(DeltaEntry::new(table, row), |entry, (column, revision)| {
                        entry.with_revision(column.clone(), *revision)
                    }),
                _ => DeltaEntry::new(table, row).with_revision(ID_COLUMN, 0),
            };
            upload.push(OperationKind::Delete, entry);
        }
    }

    Ok(upload)
}

/// Returns the revision bumps that acknowledge an accepted upload.
///
/// Every column the upload named moves one revision past the value it was
/// sent with.
///
/// # Errors
///
/// Returns [`crate::SyncError::Core`] if a revision is already at the top
/// of the range.
pub fn acknowledgements(upload: &UploadPayload) -> SyncResult<Vec<Operation>> {
    let mut operations = Vec::new();
    for kind in OperationKind::ALL {
        for entry in upload.entries(kind) {
            for (column, revision) in &entry.revisions {
                let revision = revision.checked_add(1).ok_or_else(|| {
                    CoreError::invalid_argument(format!(
                        "revision of {}.{}.{column} cannot advance",
                        entry.table, entry.row
                    ))
                })?;
                operations.push(Operation::SetRevision {
                    table: entry.table,
                    row: entry.row,
                    column: column.clone(),
                    revision,
                });
            }
        }
    }
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{JournalEntry, RevisionSnapshot};
    use ledger_store::{Cell, Cells, MemoryStore, Table};

    fn journal_entry(sequence: u64, table: Table, row: i64, column: Option<&str>, kind: OperationKind) -> JournalEntry {
        JournalEntry {
            sequence,
            table,
            row,
            column: column.map(str::to_string),
            kind,
        }
    }

    fn category(store: &mut MemoryStore, row: i64, caption: &str) {
        let mut cells = Cells::new();
        cells.insert("caption".into(), Cell::from(caption));
        store.insert(Table::Categories, row, &cells).unwrap();
    }

    #[test]
    fn sections_follow_the_journal() {
        let mut store = MemoryStore::new();
        category(&mut store, 1, "Food");
        category(&mut store, 2, "Rent");

        let revisions: RevisionSnapshot = [
            (Table::Categories, 1, "_id".to_string(), 0),
            (Table::Categories, 1, "caption".to_string(), 0),
            (Table::Categories, 2, "caption".to_string(), 3),
            (Table::Categories, 7, "_id".to_string(), 2),
            (Table::Categories, 7, "caption".to_string(), 5),
        ]
        .into_iter()
        .collect();

        let journal = JournalSnapshot::from_entries(&[
            journal_entry(1, Table::Categories, 1, None, OperationKind::Create),
            journal_entry(2, Table::Categories, 2, Some("caption"), OperationKind::Update),
            journal_entry(3, Table::Categories, 7, None, OperationKind::Delete),
        ]);

        let upload = marshal(&journal, &revisions, &store, 11).unwrap();
        assert_eq!(upload.anchor, 11);
        assert_eq!(upload.len(), 3);

        let created = &upload.created[0];
        assert_eq!(created.row, 1);
        assert_eq!(created.data["caption"], Cell::from("Food"));
        assert_eq!(created.data["_id"], Cell::Integer(1));
        assert_eq!(created.revisions.len(), 2);

        let updated = &upload.updated[0];
        assert_eq!(updated.revisions["caption"], 3);
        assert_eq!(updated.data.len(), 1);

        let deleted = &upload.deleted[0];
        assert!(deleted.data.is_empty());
        assert_eq!(deleted.revisions["caption"], 5);
        assert_eq!(deleted.revisions["_id"], 2);
    }

    #[test]
    fn vanished_rows_are_left_out() {
        let journal = JournalSnapshot::from_entries(&[
            journal_entry(1, Table::Categories, 4, None, OperationKind::Create),
            journal_entry(2, Table::Categories, 5, Some("caption"), OperationKind::Update),
        ]);
        let upload = marshal(&journal, &RevisionSnapshot::new(), &MemoryStore::new(), 0).unwrap();
        assert!(upload.is_empty());
    }

    #[test]
    fn delete_without_revisions_names_the_id() {
        let journal = JournalSnapshot::from_entries(&[journal_entry(
            1,
            Table::Rules,
            9,
            None,
            OperationKind::Delete,
        )]);
        let upload = marshal(&journal, &RevisionSnapshot::new(), &MemoryStore::new(), 0).unwrap();
        assert_eq!(upload.deleted[0].revisions[ID_COLUMN], 0);
    }

    #[test]
    fn acknowledgements_bump_every_uploaded_column() {
        let mut upload = UploadPayload::new(0);
        upload.push(
            OperationKind::Update,
            DeltaEntry::new(Table::Categories, 2).with_column("caption", 3, "Rent"),
        );
        upload.push(
            OperationKind::Delete,
            DeltaEntry::new(Table::Rules, 9).with_revision(ID_COLUMN, 0),
        );

        let ops = acknowledgements(&upload).unwrap();
        assert_eq!(
            ops,
            vec![
                Operation::SetRevision {
                    table: Table::Categories,
                    row: 2,
                    column: "caption".into(),
                    revision: 4
                },
                Operation::SetRevision {
                    table: Table::Rules,
                    row: 9,
                    column: ID_COLUMN.into(),
                    revision: 1
                },
            ]
        );
    }

    #[test]
    fn acknowledging_the_top_revision_fails() {
        let mut upload = UploadPayload::new(0);
        upload.push(
            OperationKind::Update,
            DeltaEntry::new(Table::Categories, 2).with_column("caption", i64::MAX, "Rent"),
        );

        let err = acknowledgements(&upload).unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Core(CoreError::InvalidArgument { .. })
        ));
    }
}
