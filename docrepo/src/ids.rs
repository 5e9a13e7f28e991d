//! Identifiers for sessions and documents
//!
//! Session ids follow the [TypeID specification](https://github.com/jetpack-io/typeid/blob/main/spec/SPEC.md)
//! so they read well in logs:
//!
//! ```rust
//! use docrepo::ids::SessionId;
//!
//! let id = SessionId::new();
//! assert!(id.as_str().starts_with("txn_"));
//! ```
//!
//! Document ids are UUIDv7 rendered as 32 lowercase hex characters. They sort
//! by creation time, which keeps insertion order and id order aligned.

use mti::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Identifier of a store session (and of the transaction it runs)
///
/// Format: `txn_<base32-encoded-uuidv7>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(MagicTypeId);

impl SessionId {
    /// The prefix used for session IDs
    pub const PREFIX: &'static str = "txn";

    /// Creates a new, time-sortable session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>())
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the prefix portion of the ID.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.0.prefix().as_str()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mti = MagicTypeId::from_str(s).map_err(SessionIdError::Parse)?;

        if mti.prefix().as_str() != Self::PREFIX {
            return Err(SessionIdError::InvalidPrefix {
                expected: Self::PREFIX.to_string(),
                actual: mti.prefix().as_str().to_string(),
            });
        }

        Ok(Self(mti))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Error type for session ID parsing.
#[derive(Debug, thiserror::Error)]
pub enum SessionIdError {
    /// The ID could not be parsed as a valid TypeID.
    #[error("failed to parse session ID: {0}")]
    Parse(#[from] MagicTypeIdError),

    /// The prefix was not the expected value.
    #[error("invalid prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        /// The expected prefix.
        expected: String,
        /// The actual prefix found.
        actual: String,
    },
}

/// Generate a new document identity value.
pub fn new_document_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}
