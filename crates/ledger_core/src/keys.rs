//! Key leases for offline row id allocation.

use crate::error::{CoreError, CoreResult};
use ledger_store::RowId;
use serde::{Deserialize, Serialize};

/// A range of row ids the server granted to this device.
///
/// The range is `next..upper_bound`; the upper bound is exclusive. The
/// lease is exhausted once `next == upper_bound`. A fresh database holds an
/// exhausted lease until the first one is installed.
///
/// # Invariants
///
/// - `next <= upper_bound`
/// - `next` never decreases, across allocations and installs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLease {
    next: RowId,
    upper_bound: RowId,
}

impl KeyLease {
    /// Creates a lease over `next..upper_bound`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidArgument`] if `next > upper_bound`.
    pub fn new(next: RowId, upper_bound: RowId) -> CoreResult<Self> {
        check_range(next, upper_bound)?;
        Ok(Self { next, upper_bound })
    }

    /// Returns the next key to be handed out.
    pub fn next(&self) -> RowId {
        self.next
    }

    /// Returns the exclusive upper bound.
    pub fn upper_bound(&self) -> RowId {
        self.upper_bound
    }

    /// Returns the number of keys left.
    pub fn remaining(&self) -> u64 {
        self.upper_bound.abs_diff(self.next)
    }

    /// Returns true if no key is left.
    pub fn is_exhausted(&self) -> bool {
        self.next >= self.upper_bound
    }

    /// Hands out the next key.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::OutOfKeys`] without advancing when exhausted.
    pub fn allocate(&mut self) -> CoreResult<RowId> {
        if self.is_exhausted() {
            return Err(CoreError::OutOfKeys);
        }
        let key = self.next;
        self.next += 1;
        Ok(key)
    }

    /// Replaces the lease with a newly granted range.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidArgument`] if the range is inverted or
    /// starts below keys that may already have been handed out.
    pub fn install(&mut self, next: RowId, upper_bound: RowId) -> CoreResult<()> {
        check_range(next, upper_bound)?;
        if next < self.next {
            return Err(CoreError::invalid_argument(format!(
                "lease starting at {next} overlaps keys below {}",
                self.next
            )));
        }
        self.next = next;
        self.upper_bound = upper_bound;
        Ok(())
    }
}

fn check_range(next: RowId, upper_bound: RowId) -> CoreResult<()> {
    if next > upper_bound {
        return Err(CoreError::invalid_argument(format!(
            "lease start {next} exceeds upper bound {upper_bound}"
        )));
    }
    Ok(())
}
