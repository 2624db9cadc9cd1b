//! # Ledger Sync Engine
//!
//! Synchronization between a local ledger database and a sync server.
//!
//! This crate provides:
//! - [`plan`] and [`apply`] - the delta applier, turning server deltas
//!   into batch operations by per-column revision comparison
//! - [`marshal`] - the upload of journaled local changes
//! - [`LeaseRenewer`] - single-flight key lease renewal
//! - [`SyncEngine`] - the upload, exchange, apply cycle
//! - [`SyncTransport`] - the network abstraction, with [`MockTransport`]
//!
//! ## Architecture
//!
//! Each cycle is one exchange: the device uploads what its journal holds
//! and the server answers with everything the device has not seen since
//! its anchor. The answer is applied as a single atomic batch that also
//! acknowledges the upload.
//!
//! ## Key Invariants
//!
//! - A column changes only for a strictly newer revision
//! - Applying the same delta twice changes nothing the second time
//! - A malformed entry never aborts the rest of a delta
//! - Server changes are never journaled
//! - A failed cycle commits nothing and can be retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod engine;
mod error;
mod lease;
mod marshal;
mod transport;

pub use applier::{apply, plan, ApplyStats, DeltaPlan};
pub use config::SyncConfig;
pub use engine::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use lease::LeaseRenewer;
pub use marshal::{acknowledgements, marshal};
pub use transport::{MockTransport, SyncTransport};
