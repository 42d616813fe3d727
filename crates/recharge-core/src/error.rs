//! Core error types for recharge-core.
//!
//! Every fallible engine operation returns [`CoreError`]. The variants map
//! one-to-one onto how a caller is expected to react: reject the input,
//! show "no active timer", retry later, or just log.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for recharge-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or out-of-range input. The operation did not touch the store.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// No record exists for the user.
    #[error("No recharge record for user '{user_id}'")]
    NotFound { user_id: String },

    /// The persistence layer could not be read or written.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A notification could not be delivered. Never fatal.
    #[error("Notification failed: {0}")]
    Notification(#[from] NotificationError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    pub fn not_found(user_id: impl Into<String>) -> Self {
        CoreError::NotFound {
            user_id: user_id.into(),
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::StoreUnavailable(_) | CoreError::Notification(_)
        )
    }
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Reported amount is above the user's capacity.
    #[error("amount {amount} is out of range 0..={max_capacity}")]
    AmountOutOfRange { amount: u32, max_capacity: u32 },

    /// Carry time does not fit inside one recharge unit.
    #[error("carry of {carry_secs}s is out of range 0..={unit_secs}s")]
    CarryOutOfRange { carry_secs: u32, unit_secs: u64 },

    /// Capacity must be positive and below the hard limit.
    #[error("capacity {capacity} is out of range 1..={limit}")]
    CapacityOutOfRange { capacity: u32, limit: u32 },

    /// Recharge rate must be positive.
    #[error("recharge rate must be at least one minute per unit")]
    ZeroRate,

    /// Not a known IANA time zone.
    #[error("unknown time zone '{0}'")]
    UnknownTimezone(String),

    /// User identifiers must be non-empty.
    #[error("user id must not be empty")]
    EmptyUserId,

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to read or write the backing file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize records.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored row could not be decoded into a record.
    #[error("Corrupt record for user '{user_id}': {message}")]
    CorruptRecord { user_id: String, message: String },

    /// Compare-and-swap kept losing to concurrent writers.
    #[error("Too much contention updating user '{user_id}' ({attempts} attempts)")]
    Contention { user_id: String, attempts: u32 },

    /// The in-process store lock was poisoned by a panicking writer.
    #[error("Store lock poisoned")]
    Poisoned,

    /// A store call running on the blocking pool panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Background(String),
}

/// Notification delivery errors.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// The channel has no destination configured.
    #[error("{channel} is not configured")]
    NotConfigured { channel: String },

    /// The remote endpoint rejected the message.
    #[error("{channel} rejected notification (HTTP {status}): {body}")]
    Rejected {
        channel: String,
        status: u16,
        body: String,
    },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Delivery did not finish in time.
    #[error("notification timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created.
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_converts_into_invalid_input() {
        let err: CoreError = ValidationError::ZeroRate.into();
        assert!(matches!(err, CoreError::InvalidInput(ValidationError::ZeroRate)));
        assert!(!err.is_transient());
    }

    #[test]
    fn store_errors_are_transient() {
        let err: CoreError = StoreError::Locked.into();
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Store unavailable: Database is locked");
    }

    #[test]
    fn amount_message_names_the_range() {
        let err = ValidationError::AmountOutOfRange {
            amount: 101,
            max_capacity: 100,
        };
        assert_eq!(err.to_string(), "amount 101 is out of range 0..=100");
    }
}
