//! # Ledger Sync Protocol
//!
//! Wire types for ledger synchronization.
//!
//! This crate provides:
//! - [`DeltaPayload`] and [`DeltaEntry`] for changes pushed by the server
//! - [`UploadPayload`] for local changes sent to the server
//! - [`KeyLeaseResponse`] for row id ranges granted by the server
//! - [`OperationKind`] shared with the mutation journal
//!
//! Payloads are JSON. Decoding checks every entry against the ledger schema
//! so that consumers only ever see typed [`ledger_store::Cell`] values.
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod delta;
mod error;
mod lease;
mod operation;
mod upload;
mod value;

pub use delta::{DeltaEntry, DeltaPayload, Revisions};
pub use error::{ProtocolError, ProtocolResult};
pub use lease::KeyLeaseResponse;
pub use operation::OperationKind;
pub use upload::UploadPayload;
pub use value::{cell_from_value, cell_to_value};

/// Field names used on the wire.
pub mod fields {
    /// Table name of an entry.
    pub const TABLE: &str = "table_name";
    /// Row id of an entry.
    pub const ROW: &str = "row";
    /// Column to revision map of an entry.
    pub const REVISIONS: &str = "revisions";
    /// Column to value map of an entry.
    pub const DATA: &str = "data";
    /// Sync anchor of a payload.
    pub const ANCHOR: &str = "anchor";
    /// First usable key of a lease.
    pub const NEXT_KEY: &str = "next_key";
    /// Exclusive upper bound of a lease.
    pub const UPPER_BOUND: &str = "upper_bound";
}
