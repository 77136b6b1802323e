//! Validated log identifier.
//!
//! [`LogId`] names both an event log and the notification channel that
//! signals changes to it. Channel names are PostgreSQL identifiers, so the
//! same limits apply to log ids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Longest identifier PostgreSQL accepts without truncation (`NAMEDATALEN - 1`).
pub const MAX_LOG_ID_BYTES: usize = 63;

/// Name of an event log.
///
/// Non-empty, at most [`MAX_LOG_ID_BYTES`] bytes, and free of NUL bytes.
/// Construct with [`LogId::new`] or [`str::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogId(String);

impl LogId {
    /// Validates and wraps a log name.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidLogId`] if the name is empty, longer
    /// than [`MAX_LOG_ID_BYTES`], or contains a NUL byte.
    pub fn new(name: impl Into<String>) -> Result<Self, BackendError> {
        let name = name.into();
        if name.is_empty() {
            return Err(BackendError::InvalidLogId("log id must not be empty".to_string()));
        }
        if name.len() > MAX_LOG_ID_BYTES {
            return Err(BackendError::InvalidLogId(format!(
                "log id is {} bytes, limit is {MAX_LOG_ID_BYTES}",
                name.len()
            )));
        }
        if name.contains('\0') {
            return Err(BackendError::InvalidLogId(
                "log id must not contain NUL".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Returns the log name, which is also its channel name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LogId {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LogId {
    type Error = BackendError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LogId> for String {
    fn from(id: LogId) -> Self {
        id.0
    }
}

impl AsRef<str> for LogId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_name() {
        let Ok(id) = LogId::new("orders") else {
            panic!("valid log id rejected");
        };
        assert_eq!(id.as_str(), "orders");
        assert_eq!(id.to_string(), "orders");
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(LogId::new(""), Err(BackendError::InvalidLogId(_))));
    }

    #[test]
    fn rejects_names_past_identifier_limit() {
        let at_limit = "a".repeat(MAX_LOG_ID_BYTES);
        assert!(LogId::new(at_limit).is_ok());

        let over = "a".repeat(MAX_LOG_ID_BYTES + 1);
        assert!(matches!(LogId::new(over), Err(BackendError::InvalidLogId(_))));
    }

    #[test]
    fn limit_counts_bytes_not_chars() {
        // 32 two-byte characters = 64 bytes
        let name = "é".repeat(32);
        assert!(LogId::new(name).is_err());
    }

    #[test]
    fn rejects_nul() {
        assert!(LogId::new("a\0b").is_err());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: Result<LogId, _> = serde_json::from_str("\"chat-room-1\"");
        assert!(ok.is_ok());

        let bad: Result<LogId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn parse_matches_new() {
        let parsed: Result<LogId, _> = "doc/42".parse();
        let Ok(parsed) = parsed else {
            panic!("parse failed");
        };
        assert_eq!(parsed.as_str(), "doc/42");
    }
}
