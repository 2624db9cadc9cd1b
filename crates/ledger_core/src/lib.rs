//! # Ledger Core
//!
//! Local bookkeeping for an offline-first ledger.
//!
//! This crate provides:
//! - [`RevisionLedger`] and [`RevisionSnapshot`] - per-column revisions that
//!   decide which side of a sync wins
//! - [`MutationJournal`] - local changes awaiting upload, coalesced
//! - [`KeyLease`] - collision-free row ids while offline
//! - [`SharedTransaction`] - atomic, serialized batches
//! - [`LedgerDb`] - the facade tying them to a record store
//!
//! ## Invariants
//!
//! - Revisions are never negative and never removed
//! - A key is handed out at most once
//! - A batch commits completely or not at all
//! - Writes that came from the server are never journaled
//!
//! No networking happens here; see `ledger_sync`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod journal;
mod keys;
mod revision;
mod transaction;

pub use config::DbConfig;
pub use database::LedgerDb;
pub use error::{CoreError, CoreResult};
pub use journal::{JournalEntry, JournalSnapshot, MutationJournal};
pub use keys::KeyLease;
pub use revision::{RevisionLedger, RevisionSnapshot};
pub use transaction::{
    JournalMode, Operation, OperationResult, SharedTransaction, State, WriteTxn, FORMAT_VERSION,
};

// Re-export store and protocol types used in this crate's API.
pub use ledger_protocol::OperationKind;
pub use ledger_store::{Cell, Cells, Filter, Record, RowId, Table};
