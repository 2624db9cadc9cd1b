//! Journal command implementation.

use ledger_core::LedgerDb;

/// Runs the journal command.
pub fn run(db: &LedgerDb, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entries = db.journal();
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            if entries.is_empty() {
                println!("Journal is empty");
            }
            for entry in &entries {
                println!(
                    "{:>6}  {}  {:<16} {:>8}  {}",
                    entry.sequence,
                    entry.kind.to_code(),
                    entry.table,
                    entry.row,
                    entry.column.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}
