//! Add-category command implementation.

use ledger_core::LedgerDb;
use ledger_store::{Cell, Cells, Table};

/// Runs the add-category command.
pub fn run(db: &LedgerDb, caption: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut cells = Cells::new();
    cells.insert("caption".into(), Cell::from(caption));
    let row = db.insert(Table::Categories, cells).map_err(|e| {
        if e.is_out_of_keys() {
            "key lease exhausted; run grant-lease first".into()
        } else {
            Box::<dyn std::error::Error>::from(e)
        }
    })?;
    println!("Category {row} added");
    Ok(())
}
