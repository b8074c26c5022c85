use crate::context::Interrupted;
use crate::fatal::Severity;
use crate::presence::store::StoreError;
use thiserror::Error;

/// Presence tracker errors
///
/// `FieldAbsent` and `MalformedValue` are separate so callers can tell a
/// vehicle with no recorded transition from corrupt data.
#[derive(Error, Debug)]
pub enum PresenceError {
    /// Connection was closed
    #[error("Store not connected")]
    NotConnected,

    /// Caller cancelled the call
    #[error("Store call cancelled")]
    Cancelled,

    /// Caller's deadline passed
    #[error("Store call timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// Transport or command failure
    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    /// No members to pick from
    #[error("Could not get random member from set {0}: set is empty")]
    EmptySet(String),

    /// Hash has no such field
    #[error("Field {field} does not exist in hash {key}")]
    FieldAbsent { key: String, field: String },

    /// Field exists but is not a time in the requested layout
    #[error("Failed to parse field {field} of hash {key} as time ({value:?}): {source}")]
    MalformedValue {
        key: String,
        field: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl From<StoreError> for PresenceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotConnected => PresenceError::NotConnected,
            other => PresenceError::Store(other),
        }
    }
}

impl From<Interrupted> for PresenceError {
    fn from(err: Interrupted) -> Self {
        match err {
            Interrupted::Cancelled => PresenceError::Cancelled,
            Interrupted::TimedOut(limit) => PresenceError::TimedOut(limit),
        }
    }
}

impl Severity for PresenceError {
    fn is_fatal(&self) -> bool {
        false
    }
}
