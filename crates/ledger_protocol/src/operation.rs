//! Kinds of change exchanged during sync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a row change.
///
/// The same three kinds name the sections of a payload and the entries of
/// the local mutation journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    /// A row was created.
    #[serde(rename = "c")]
    Create,
    /// Columns of a row were updated.
    #[serde(rename = "u")]
    Update,
    /// A row was deleted.
    #[serde(rename = "d")]
    Delete,
}

impl OperationKind {
    /// Every kind, in the order payload sections are processed.
    pub const ALL: [OperationKind; 3] = [Self::Create, Self::Update, Self::Delete];

    /// Converts to the single-letter journal code.
    pub fn to_code(self) -> char {
        match self {
            Self::Create => 'c',
            Self::Update => 'u',
            Self::Delete => 'd',
        }
    }

    /// Converts from a journal code.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'c' => Some(Self::Create),
            'u' => Some(Self::Update),
            'd' => Some(Self::Delete),
            _ => None,
        }
    }

    /// Returns the payload section holding entries of this kind.
    pub fn section(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}
