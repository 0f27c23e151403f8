//! Error types for db-steward.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for db-steward operations.
#[derive(Error, Debug)]
pub enum StewardError {
    /// Malformed call input (empty statement, missing connection parameters, etc.)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connect or reconnect failure, carrying the driver's native message.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Nonzero native error code after a statement attempt.
    #[error("DB: [{database}] Query: [{sql}] failed. MySQL error: [{code} : {message}]")]
    Query {
        code: u32,
        message: String,
        database: String,
        sql: String,
    },

    /// The accelerated-write channel refused to open an index.
    #[error("Index open error: {0}")]
    IndexOpen(String),

    /// The accelerated-write channel rejected a write.
    #[error("Index write error: {0}")]
    IndexWrite(String),

    /// Configuration errors (invalid config file, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local file I/O errors (script files, checkpoints).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StewardError {
    /// Creates an invalid-argument error with the given message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error from a native diagnostic.
    pub fn query(
        code: u32,
        message: impl Into<String>,
        database: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self::Query {
            code,
            message: message.into(),
            database: database.into(),
            sql: sql.into(),
        }
    }

    /// Creates an index-open error with the given message.
    pub fn index_open(msg: impl Into<String>) -> Self {
        Self::IndexOpen(msg.into())
    }

    /// Creates an index-write error with the given message.
    pub fn index_write(msg: impl Into<String>) -> Self {
        Self::IndexWrite(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the native error code for query errors.
    pub fn native_code(&self) -> Option<u32> {
        match self {
            Self::Query { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "Invalid Argument",
            Self::Connection(_) => "Connection Error",
            Self::Query { .. } => "Query Error",
            Self::IndexOpen(_) => "Index Open Error",
            Self::IndexWrite(_) => "Index Write Error",
            Self::Config(_) => "Configuration Error",
            Self::Io(_) => "I/O Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using StewardError.
pub type Result<T> = std::result::Result<T, StewardError>;
