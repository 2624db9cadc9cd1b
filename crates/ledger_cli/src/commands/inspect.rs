//! Inspect command implementation.

use ledger_core::LedgerDb;
use ledger_store::Table;
use serde::Serialize;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// Last anchor received from the server.
    pub anchor: u64,
    /// Next key of the lease.
    pub lease_next: i64,
    /// Exclusive upper bound of the lease.
    pub lease_upper_bound: i64,
    /// Keys left in the lease.
    pub lease_remaining: u64,
    /// Number of revision ledger entries.
    pub revision_count: usize,
    /// Number of journal entries.
    pub journal_length: usize,
    /// Rows per table.
    pub tables: Vec<TableStats>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: &'static str,
    /// Number of rows.
    pub rows: usize,
}

/// Gathers the statistics of a database.
pub fn inspect(db: &LedgerDb) -> InspectResult {
    let state = db.snapshot();
    let lease = state.lease();
    InspectResult {
        path: db
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".into()),
        anchor: state.anchor(),
        lease_next: lease.next(),
        lease_upper_bound: lease.upper_bound(),
        lease_remaining: lease.remaining(),
        revision_count: state.revisions().len(),
        journal_length: state.journal().len(),
        tables: Table::ALL
            .into_iter()
            .map(|table| TableStats {
                name: table.name(),
                rows: state.records().len(table),
            })
            .collect(),
    }
}

/// Runs the inspect command.
pub fn run(db: &LedgerDb, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(db);
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Ledger Database Inspection");
    println!("==========================");
    println!();
    println!("Path:   {}", result.path);
    println!("Anchor: {}", result.anchor);
    println!();
    println!("Key lease:");
    println!("  Next:        {}", result.lease_next);
    println!("  Upper bound: {}", result.lease_upper_bound);
    println!("  Remaining:   {}", result.lease_remaining);
    println!();
    println!("Tables:");
    for table in &result.tables {
        println!("  {:<16} {} rows", table.name, table.rows);
    }
    println!();
    println!("Revisions: {}", result.revision_count);
    println!("Journal:   {} entries", result.journal_length);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::{Cell, Cells};

    #[test]
    fn counts_rows_and_lease() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.install_lease(1, 10).unwrap();
        let mut cells = Cells::new();
        cells.insert("caption".into(), Cell::from("Food"));
        db.insert(Table::Categories, cells).unwrap();

        let result = inspect(&db);
        assert_eq!(result.path, "<memory>");
        assert_eq!(result.lease_next, 2);
        assert_eq!(result.lease_remaining, 8);
        assert_eq!(result.journal_length, 1);
        assert_eq!(result.revision_count, 2);
        let categories = result
            .tables
            .iter()
            .find(|t| t.name == "categories")
            .unwrap();
        assert_eq!(categories.rows, 1);
    }
}
