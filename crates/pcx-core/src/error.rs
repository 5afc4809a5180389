//! Error types for VPC peering connection management
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for peering connection operations
pub type Result<T> = std::result::Result<T, Error>;

/// AWS error code returned when a peering connection ID does not exist
pub const ERR_CODE_PEERING_CONNECTION_NOT_FOUND: &str = "InvalidVpcPeeringConnectionID.NotFound";

/// AWS error code returned for an illegal status transition
pub const ERR_CODE_INVALID_STATE_TRANSITION: &str = "InvalidStateTransition";

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Error reported by the EC2 API, classified by its error code
    #[error("{code}: {message}")]
    Api {
        /// AWS error code (e.g. "InvalidStateTransition")
        code: String,
        /// AWS error message
        message: String,
    },

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Waiting for a status gave up after the configured timeout
    #[error(
        "timeout while waiting for state to become '{expected}' (last state: '{last_state}', timeout: {timeout:?})"
    )]
    Timeout {
        /// Last status observed before the timeout
        last_state: String,
        /// Comma separated list of target statuses
        expected: String,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The status left the pending set without reaching a target
    #[error("unexpected state '{state}', wanted target '{expected}'")]
    UnexpectedState {
        /// The status that was observed
        state: String,
        /// Comma separated list of target statuses
        expected: String,
    },

    /// The peering connection reached the `failed` status
    #[error("{0}")]
    PeeringFailed(String),

    /// Peering options can only be modified on an active connection
    #[error(
        "Unable to modify peering options. The VPC Peering Connection \"{0}\" is not active. Please set `auto_accept` attribute to `true`, or activate VPC Peering Connection manually."
    )]
    NotActive(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error with context attached by a handler
    #[error("{context}: {source}")]
    Context {
        /// What was being done
        context: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an API error from an AWS error code and message
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Wrap this error with a description of the failed step
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any `Context` layers
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// AWS error code, if this is an API error
    pub fn code(&self) -> Option<&str> {
        match self.root() {
            Self::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// True when the API error code equals `code`
    pub fn code_equals(&self, code: &str) -> bool {
        self.code() == Some(code)
    }

    /// True when the API error code equals `code` and its message contains `needle`
    ///
    /// An empty `needle` matches any message.
    pub fn message_contains(&self, code: &str, needle: &str) -> bool {
        match self.root() {
            Self::Api { code: c, message } => c == code && message.contains(needle),
            _ => false,
        }
    }

    /// True for "not found" errors, whether synthetic or reported by AWS
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
            || self.code_equals(ERR_CODE_PEERING_CONNECTION_NOT_FOUND)
    }

    /// True when waiting gave up on the timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Extension for attaching handler context to results
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a lazily built context message
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_matching_sees_through_context() {
        let err = Error::api(
            ERR_CODE_INVALID_STATE_TRANSITION,
            "Invalid state transition for pcx-0000000000000000, attempted to transition from failed to deleting",
        )
        .context("deleting EC2 VPC Peering Connection (pcx-0000000000000000)");

        assert!(err.code_equals(ERR_CODE_INVALID_STATE_TRANSITION));
        assert!(err.message_contains(ERR_CODE_INVALID_STATE_TRANSITION, "to deleting"));
        assert!(!err.message_contains(ERR_CODE_INVALID_STATE_TRANSITION, "to active"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(Error::not_found("pcx-1").is_not_found());
        assert!(Error::api(ERR_CODE_PEERING_CONNECTION_NOT_FOUND, "gone").is_not_found());
        assert!(!Error::api("UnauthorizedOperation", "denied").is_not_found());
    }

    #[test]
    fn test_context_display() {
        let err = Error::PeeringFailed("Overlapping CIDR".to_string())
            .context("error waiting for EC2 VPC Peering Connection (pcx-1) create");
        assert_eq!(
            err.to_string(),
            "error waiting for EC2 VPC Peering Connection (pcx-1) create: Overlapping CIDR"
        );
    }
}
