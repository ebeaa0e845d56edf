//! Error types for publish and dispatch operations.
//!
//! Classifies delivery outcomes so the dispatch cycle can report and log
//! them without ever letting a destination failure escape the cycle
//! boundary.

use std::fmt;

use thiserror::Error;

/// Result type alias for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Failure taxonomy for pushing one page to one site.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Destination rejected the credentials (401/403).
    #[error("authentication failed: HTTP {status}")]
    AuthenticationFailure {
        /// HTTP status returned by the destination
        status: u16,
    },

    /// Destination answered with a non-success application error, e.g.
    /// validation or a duplicate-slug conflict.
    #[error("remote rejected: HTTP {status}")]
    RemoteRejected {
        /// HTTP status returned by the destination
        status: u16,
        /// Response body, truncated for logging
        body: String,
    },

    /// Network, connection, or timeout error before a response arrived.
    #[error("transport failure: {message}")]
    TransportFailure {
        /// Description of the transport problem
        message: String,
    },

    /// Destination acknowledged success but the response could not be
    /// interpreted (missing or malformed locator).
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what could not be parsed
        message: String,
    },

    /// Work item store operation failed during dispatch.
    #[error("storage error: {message}")]
    Storage {
        /// Storage error message
        message: String,
    },

    /// Invalid client or site configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl PublishError {
    /// Creates an authentication failure from a status code.
    pub fn authentication(status: u16) -> Self {
        Self::AuthenticationFailure { status }
    }

    /// Creates a remote rejection from an HTTP response.
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::RemoteRejected { status, body: body.into() }
    }

    /// Creates a transport failure from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure { message: message.into() }
    }

    /// Creates an unexpected-response error from a message.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse { message: message.into() }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// The report/metric category of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AuthenticationFailure { .. } => FailureKind::Authentication,
            Self::RemoteRejected { .. } => FailureKind::Rejected,
            Self::TransportFailure { .. } => FailureKind::Transport,
            Self::UnexpectedResponse { .. } => FailureKind::Unexpected,
            Self::Storage { .. } => FailureKind::Storage,
            Self::Configuration { .. } => FailureKind::Configuration,
        }
    }
}

impl From<dripfeed_core::CoreError> for PublishError {
    fn from(err: dripfeed_core::CoreError) -> Self {
        Self::Storage { message: err.to_string() }
    }
}

/// Category of publish failure for cycle reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credential rejection.
    Authentication,
    /// Application-level rejection by the destination.
    Rejected,
    /// Network or timeout problem.
    Transport,
    /// Unparsable success response.
    Unexpected,
    /// Store operation failed.
    Storage,
    /// Configuration problem.
    Configuration,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Rejected => write!(f, "rejected"),
            Self::Transport => write!(f, "transport"),
            Self::Unexpected => write!(f, "unexpected"),
            Self::Storage => write!(f, "storage"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_their_kind() {
        assert_eq!(PublishError::authentication(401).kind(), FailureKind::Authentication);
        assert_eq!(PublishError::rejected(422, "dup slug").kind(), FailureKind::Rejected);
        assert_eq!(PublishError::transport("timeout").kind(), FailureKind::Transport);
        assert_eq!(PublishError::unexpected("no link").kind(), FailureKind::Unexpected);
    }

    #[test]
    fn error_display_format() {
        assert_eq!(PublishError::authentication(403).to_string(), "authentication failed: HTTP 403");
        assert_eq!(
            PublishError::rejected(409, "taken").to_string(),
            "remote rejected: HTTP 409"
        );
    }
}
