//! Error taxonomy for the registry.
//!
//! Four classes, each with a distinct process exit code so shell callers can
//! distinguish caller-fixable mistakes from relational violations and from
//! store trouble:
//!
//! | class        | exit | retryable |
//! |--------------|------|-----------|
//! | `Validation` | 1    | no        |
//! | `State`      | 1    | no        |
//! | `Integrity`  | 2    | no        |
//! | `Store`      | 3    | only lock timeouts |
//!
//! Validation, state, and integrity errors are deterministic: they are
//! rejected before commit and retrying without changing the input cannot
//! succeed. Only `Store { retryable: true }` (the SQLite busy/locked class)
//! is worth retrying with backoff.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Malformed input: bad enum value, negative hours, duplicate id,
    /// self-dependency. Rejected before any transaction opens.
    #[error("validation error: {0}")]
    Validation(String),

    /// Illegal state transition or write-once violation.
    #[error("invalid transition for '{id}': cannot {requested} while {current}")]
    State {
        id: String,
        current: String,
        requested: String,
    },

    /// Would-be cycle, dangling reference, or delete-with-incoming-edges.
    /// Cycle messages embed the full offending path.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// I/O failure, lock timeout, disk full. `retryable` is true only for
    /// the lock-timeout class.
    #[error("store error: {message}")]
    Store { message: String, retryable: bool },
}

impl RegistryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { retryable: true, .. })
    }

    /// Process exit code for the command front-end.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::State { .. } => 1,
            Self::Integrity(_) => 2,
            Self::Store { .. } => 3,
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _) => match code.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    Self::busy(err.to_string())
                }
                rusqlite::ErrorCode::ConstraintViolation => Self::Integrity(err.to_string()),
                _ => Self::store(err.to_string()),
            },
            _ => Self::store(err.to_string()),
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::store(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RegistryError::validation("x").exit_code(), 1);
        assert_eq!(
            RegistryError::State {
                id: "a".into(),
                current: "blocked".into(),
                requested: "complete".into(),
            }
            .exit_code(),
            1
        );
        assert_eq!(RegistryError::integrity("x").exit_code(), 2);
        assert_eq!(RegistryError::store("x").exit_code(), 3);
    }

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(RegistryError::busy("locked").is_retryable());
        assert!(!RegistryError::store("disk full").is_retryable());
        assert!(!RegistryError::validation("bad").is_retryable());
    }

    #[test]
    fn test_state_error_names_both_states() {
        let err = RegistryError::State {
            id: "proj".into(),
            current: "blocked".into(),
            requested: "complete".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("blocked"));
        assert!(msg.contains("complete"));
    }
}
