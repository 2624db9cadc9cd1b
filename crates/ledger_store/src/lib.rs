//! # Ledger Store
//!
//! Typed record storage for the offline ledger.
//!
//! This crate is the leaf of the workspace. It knows the ledger's tables and
//! their columns, and it stores typed records keyed by `(table, row id)`.
//! It knows nothing about revisions, journals or synchronization.
//!
//! ## Design Principles
//!
//! - Every table has its own record struct; column access by name goes
//!   through [`Cell`], which is checked against the column's declared type
//! - [`RecordStore`] is the interface the sync core consumes
//! - Stores are plain values (`Clone`) so a transaction can stage writes on
//!   a copy and publish it atomically
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - ordered in-memory tables
//! - [`SnapshotFile`] - atomic whole-file persistence for serialized snapshots
//!
//! ## Example
//!
//! ```rust
//! use ledger_store::{Cell, Cells, MemoryStore, RecordStore, Table};
//!
//! let mut store = MemoryStore::new();
//! let mut cells = Cells::new();
//! cells.insert("caption".into(), Cell::from("Food"));
//! store.insert(Table::Categories, 1, &cells).unwrap();
//! assert!(store.contains(Table::Categories, 1).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cell;
mod error;
mod file;
mod memory;
mod record;
mod schema;

pub use backend::{Filter, RecordStore};
pub use cell::{Cell, Cells};
pub use error::{StoreError, StoreResult};
pub use file::SnapshotFile;
pub use memory::MemoryStore;
pub use record::{Category, Entry, EntryMetadata, Record, Rule, Supercategory, TableRecord};
pub use schema::{ColumnDef, ColumnType, RowId, Table, ID_COLUMN};
