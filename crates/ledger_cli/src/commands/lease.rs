//! Grant-lease command implementation.

use ledger_core::LedgerDb;

/// Runs the grant-lease command.
pub fn run(db: &LedgerDb, next: i64, upper: i64) -> Result<(), Box<dyn std::error::Error>> {
    db.install_lease(next, upper)?;
    let lease = db.lease();
    println!(
        "Lease {}..{} installed ({} keys)",
        lease.next(),
        lease.upper_bound(),
        lease.remaining()
    );
    Ok(())
}
