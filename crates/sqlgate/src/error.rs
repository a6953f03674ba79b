use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unified error type for all datasource operations
#[derive(Error, Debug)]
pub enum DataError {
    /// No datasource is registered under the requested id
    #[error("Unknown datasource: {0}")]
    NotFound(String),

    /// Statement rejected by the read-only keyword screen
    #[error("Forbidden SQL operation: {0}")]
    Security(String),

    /// Query execution failed in the driver or database
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Query exceeded the datasource statement timeout
    #[error("Query timeout after {0}ms")]
    QueryTimeout(u64),

    /// No pooled connection became available in time
    #[error("Timed out acquiring a connection for '{datasource}' after {timeout_ms}ms")]
    PoolTimeout { datasource: String, timeout_ms: u64 },

    /// Connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection lost or closed unexpectedly
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Invalid statement parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid datasource configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No strategy factory is registered for the dialect
    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    /// `init` called on a strategy or registry that is already set up
    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    /// Used before `initialize`/`init`
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Used after shutdown
    #[error("Datasource closed: {0}")]
    Closed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller-facing error categories
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown datasource id
    NotFound,
    /// Rejected by the read-only screen; retrying the same input cannot succeed
    Security,
    /// Driver, connectivity or pool failure
    Query,
    /// Datasource or registry has been shut down
    Closed,
    /// Bad descriptor or unsupported dialect
    Configuration,
    /// Lifecycle misuse (double init, use before init)
    Lifecycle,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Security => write!(f, "security"),
            ErrorKind::Query => write!(f, "query"),
            ErrorKind::Closed => write!(f, "closed"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Lifecycle => write!(f, "lifecycle"),
        }
    }
}

impl DataError {
    /// Create a "not found" error for a datasource id
    pub fn not_found(datasource_id: impl Into<String>) -> Self {
        DataError::NotFound(datasource_id.into())
    }

    /// Create a security rejection naming the offending token
    pub fn security(token: impl Into<String>) -> Self {
        DataError::Security(token.into())
    }

    /// Create a query failure carrying the driver message
    pub fn query_failed(msg: impl Into<String>) -> Self {
        DataError::QueryFailed(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        DataError::InvalidConfiguration(msg.into())
    }

    /// Classify this error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::NotFound(_) => ErrorKind::NotFound,
            DataError::Security(_) => ErrorKind::Security,
            DataError::QueryFailed(_)
            | DataError::QueryTimeout(_)
            | DataError::PoolTimeout { .. }
            | DataError::ConnectionFailed(_)
            | DataError::ConnectionLost(_)
            | DataError::InvalidQuery(_)
            | DataError::Internal(_) => ErrorKind::Query,
            DataError::Closed(_) => ErrorKind::Closed,
            DataError::InvalidConfiguration(_) | DataError::UnsupportedDialect(_) => {
                ErrorKind::Configuration
            }
            DataError::AlreadyInitialized(_) | DataError::NotInitialized(_) => {
                ErrorKind::Lifecycle
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
