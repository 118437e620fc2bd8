/// Unified error handling for triplegate
///
/// Only transport-level failures count as failures for routing. A member that
/// answers with any HTTP status (including 4xx/5xx) produced a `BackendResponse`,
/// never a `GatewayError`.
use std::fmt;
use thiserror::Error;

pub use crate::config::ConfigError;

/// Main error type for triplegate operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Registry namespace/service could not be resolved
    #[error("Discovery error: {message}")]
    Discovery { message: String },

    /// A single member call never produced an HTTP reply
    #[error(transparent)]
    Network(#[from] NetworkFailure),

    /// Every member of a read fan-out failed at the transport level
    #[error("All nodes failed to respond ({} failures)", failures.len())]
    AllNodesFailed { failures: Vec<NetworkFailure> },

    /// The control plane refused or failed a redeploy request
    #[error("Recovery error: {message}")]
    Recovery { message: String },

    /// A member address that is not an absolute http(s) URL
    #[error("Invalid endpoint '{address}': {reason}")]
    InvalidEndpoint { address: String, reason: String },

    /// The inbound request could not be turned into a forwardable request
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Transport-level failure talking to one cluster member: DNS, connect, reset,
/// timeout or a body that could not be read to the end.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Network failure talking to {endpoint}: {reason}")]
pub struct NetworkFailure {
    pub endpoint: String,
    pub reason: String,
}

impl NetworkFailure {
    pub fn new<E: Into<String>, R: Into<String>>(endpoint: E, reason: R) -> Self {
        Self {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for triplegate operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        GatewayError::Discovery {
            message: message.into(),
        }
    }

    pub fn recovery<S: Into<String>>(message: S) -> Self {
        GatewayError::Recovery {
            message: message.into(),
        }
    }

    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        GatewayError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        GatewayError::Internal {
            message: message.into(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GatewayError::Config(_) => ErrorSeverity::Critical,
            GatewayError::Internal { .. } => ErrorSeverity::Critical,
            GatewayError::AllNodesFailed { .. } => ErrorSeverity::Error,
            GatewayError::Discovery { .. } => ErrorSeverity::Error,
            GatewayError::InvalidEndpoint { .. } => ErrorSeverity::Error,
            GatewayError::Network(_) => ErrorSeverity::Warning,
            GatewayError::Recovery { .. } => ErrorSeverity::Warning,
            GatewayError::InvalidRequest { .. } => ErrorSeverity::Info,
        }
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about recoverable issues
    Info,
}

impl ErrorSeverity {
    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Critical | ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Info => log::Level::Info,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
