//! Key lease responses.

use crate::error::{ProtocolError, ProtocolResult};
use crate::fields;
use ledger_store::RowId;
use serde::{Deserialize, Serialize};

/// A range of row ids granted by the server: `next_key..upper_bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLeaseResponse {
    /// First key the device may use.
    pub next_key: RowId,
    /// Exclusive upper bound of the range.
    pub upper_bound: RowId,
}

impl KeyLeaseResponse {
    /// Creates a response.
    pub fn new(next_key: RowId, upper_bound: RowId) -> Self {
        Self {
            next_key,
            upper_bound,
        }
    }

    /// Parses and validates a response from JSON bytes.
    ///
    /// # Errors
    ///
    /// Fails on invalid JSON, missing fields, or an inverted range.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        let response: Self = serde_json::from_slice(bytes)?;
        response.validate()?;
        Ok(response)
    }

    /// Checks `next_key <= upper_bound`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] for an inverted range.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.next_key > self.upper_bound {
            return Err(ProtocolError::invalid(
                fields::NEXT_KEY,
                format!(
                    "{} exceeds {} {}",
                    self.next_key,
                    fields::UPPER_BOUND,
                    self.upper_bound
                ),
            ));
        }
        Ok(())
    }

    /// Returns the number of keys in the range.
    pub fn len(&self) -> u64 {
        self.upper_bound.abs_diff(self.next_key)
    }

    /// Returns true if the range grants no key.
    pub fn is_empty(&self) -> bool {
        self.next_key >= self.upper_bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_range() {
        let lease = KeyLeaseResponse::from_slice(br#"{"next_key": 100, "upper_bound": 200}"#).unwrap();
        assert_eq!(lease, KeyLeaseResponse::new(100, 200));
        assert_eq!(lease.len(), 100);
        assert!(!lease.is_empty());
    }

    #[test]
    fn rejects_inverted_range() {
        let err = KeyLeaseResponse::from_slice(br#"{"next_key": 5, "upper_bound": 4}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { .. }));
    }

    #[test]
    fn empty_range_is_valid() {
        let lease = KeyLeaseResponse::from_slice(br#"{"next_key": 5, "upper_bound": 5}"#).unwrap();
        assert!(lease.is_empty());
    }

    #[test]
    fn missing_field_is_json_error() {
        assert!(matches!(
            KeyLeaseResponse::from_slice(br#"{"next_key": 5}"#),
            Err(ProtocolError::Json(_))
        ));
    }
}
