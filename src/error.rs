//! Error types for installation attempts.
//!
//! Every failure a strategy can produce is classified into one of the
//! variants below. Errors are recorded per attempt inside a
//! [`ResolutionResult`](crate::resolution::ResolutionResult) and never cross
//! the resolver boundary as a propagated `Err`; callers read the aggregate.
//!
//! Variants carry owned message strings (rather than source errors) so that
//! recorded attempts stay `Clone` and comparable in tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A classified installation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum InstallError {
    /// A capability the strategy requires is absent from the environment
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),

    /// Name resolution, connection, or transfer failures
    #[error("network error: {0}")]
    Network(String),

    /// Destination not writable, or elevation required for the chosen scope
    #[error("permission error: {0}")]
    Permission(String),

    /// The requested module (or version) is absent from the package source
    #[error("not found: {0}")]
    NotFound(String),

    /// Staging succeeded but the copy into the destination did not complete
    #[error("partial write: {0}")]
    PartialWrite(String),

    /// Anything that defies classification
    #[error("{0}")]
    Unknown(String),
}

/// Result type alias for installation operations
pub type Result<T> = std::result::Result<T, InstallError>;

// Convenient error constructors
impl InstallError {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionUnmet(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a permission error
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a partial-write error
    pub fn partial_write(msg: impl Into<String>) -> Self {
        Self::PartialWrite(msg.into())
    }

    /// Create an unclassified error
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Classify an I/O error, keeping the operation context in the message.
    pub fn from_io(context: &str, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        let msg = format!("{}: {}", context, err);
        match err.kind() {
            ErrorKind::PermissionDenied => Self::Permission(msg),
            ErrorKind::NotFound => Self::NotFound(msg),
            ErrorKind::TimedOut | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                Self::Network(msg)
            }
            _ => Self::Unknown(msg),
        }
    }

    /// Short identifier for the error class, used in structured events.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PreconditionUnmet(_) => "precondition-unmet",
            Self::Network(_) => "network",
            Self::Permission(_) => "permission",
            Self::NotFound(_) => "not-found",
            Self::PartialWrite(_) => "partial-write",
            Self::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstallError::network("connection timed out");
        assert_eq!(err.to_string(), "network error: connection timed out");

        let err = InstallError::not_found("no module named Foo");
        assert_eq!(err.to_string(), "not found: no module named Foo");
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(
            InstallError::permission("denied"),
            InstallError::Permission(_)
        ));
        assert!(matches!(
            InstallError::partial_write("copy interrupted"),
            InstallError::PartialWrite(_)
        ));
    }

    #[test]
    fn test_from_io_classification() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            InstallError::from_io("writing manifest", &denied),
            InstallError::Permission(_)
        ));

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            InstallError::from_io("reading staging dir", &missing),
            InstallError::NotFound(_)
        ));

        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(matches!(
            InstallError::from_io("fetching", &timeout),
            InstallError::Network(_)
        ));
    }

    #[test]
    fn test_from_io_keeps_context() {
        let err = std::io::Error::other("disk full");
        let classified = InstallError::from_io("copying Foo/1.0", &err);
        assert!(classified.to_string().contains("copying Foo/1.0"));
        assert!(classified.to_string().contains("disk full"));
    }

    #[test]
    fn test_kind_identifiers() {
        assert_eq!(InstallError::network("x").kind(), "network");
        assert_eq!(InstallError::unknown("x").kind(), "unknown");
        assert_eq!(InstallError::precondition("x").kind(), "precondition-unmet");
    }

    #[test]
    fn test_serialization_round_trip() {
        let err = InstallError::not_found("VMware.PowerCLI");
        let json = serde_json::to_string(&err).expect("serialize");
        let back: InstallError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err, back);
    }
}
