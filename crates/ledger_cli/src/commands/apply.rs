//! Apply command implementation.

use ledger_core::LedgerDb;
use ledger_protocol::DeltaPayload;
use ledger_sync::ApplyStats;
use std::path::Path;

/// Applies the delta payload stored at `path`.
pub fn apply_file(db: &LedgerDb, path: &Path) -> Result<ApplyStats, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let payload = DeltaPayload::from_slice(&bytes)?;
    Ok(ledger_sync::apply(db, &payload)?)
}

/// Runs the apply command.
pub fn run(db: &LedgerDb, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let stats = apply_file(db, path)?;
    println!("Inserted:       {}", stats.inserted);
    println!("Updated:        {}", stats.updated);
    println!("Deleted:        {}", stats.deleted);
    println!("Stale:          {}", stats.stale);
    println!("Skipped:        {}", stats.skipped);
    println!("Parse failures: {}", stats.parse_failures);
    println!("Anchor:         {}", db.anchor());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::DbConfig;
    use ledger_store::Table;
    use tempfile::tempdir;

    #[test]
    fn applies_and_persists() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("ledger.json");
        let delta_path = dir.path().join("delta.json");
        std::fs::write(
            &delta_path,
            r#"{"created": [{"table_name": "categories", "row": 1,
                             "revisions": {"_id": 1, "caption": 1},
                             "data": {"_id": 1, "caption": "Food"}}],
                "anchor": 3}"#,
        )
        .unwrap();

        {
            let db = LedgerDb::open_with_config(DbConfig::new().with_path(&db_path)).unwrap();
            let stats = apply_file(&db, &delta_path).unwrap();
            assert_eq!(stats.inserted, 1);
        }

        let db = LedgerDb::open(&db_path).unwrap();
        assert_eq!(db.anchor(), 3);
        assert!(db.get(Table::Categories, 1).unwrap().is_some());
        assert!(db.journal().is_empty());
    }

    #[test]
    fn rejects_a_broken_envelope() {
        let dir = tempdir().unwrap();
        let delta_path = dir.path().join("delta.json");
        std::fs::write(&delta_path, r#"{"created": 5}"#).unwrap();

        let db = LedgerDb::open_in_memory().unwrap();
        assert!(apply_file(&db, &delta_path).is_err());
    }
}
