//! Error types with credential sanitization.
//!
//! Every failure the loader can produce is a variant of [`BatchSqlError`].
//! Driver errors travel unchanged as the `#[source]` of the variant that
//! wraps them. Connection strings and passwords are never part of an error
//! message; use [`redact_connection_string`] before putting one in context.

use thiserror::Error;

/// Main error type for batch loading operations.
///
/// # Categories
/// - Validation: [`Injection`](Self::Injection)
/// - Connection: [`Connection`](Self::Connection), [`NotConnected`](Self::NotConnected)
/// - Execution: [`Execution`](Self::Execution), [`Timeout`](Self::Timeout)
/// - Transaction: [`Transaction`](Self::Transaction)
/// - Input: [`Input`](Self::Input), [`EmptyInput`](Self::EmptyInput),
///   [`FileNotFound`](Self::FileNotFound), [`InvalidArgument`](Self::InvalidArgument)
#[derive(Debug, Error)]
pub enum BatchSqlError {
    /// An identifier contains a denylisted character or `--`
    #[error("Identifier [{name}] contains [{offending}]")]
    Injection {
        /// The rejected identifier
        name: String,
        /// The denylisted text it contains
        offending: String,
    },

    /// Database connection could not be opened (credentials sanitized)
    #[error("Database connection failed: {context}")]
    Connection {
        /// What was being connected to, without credentials
        context: String,
        /// Underlying driver error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An operation required an open connection and none was available
    #[error("Database connection status is incorrect")]
    NotConnected,

    /// The driver rejected a statement
    #[error("Statement execution failed: {context}")]
    Execution {
        /// Which statement or step failed
        context: String,
        /// Underlying driver error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A statement did not finish within the configured query timeout
    #[error("Statement timed out after {elapsed_ms} ms")]
    Timeout {
        /// Configured timeout that was exceeded
        elapsed_ms: u128,
    },

    /// A bulk load failed; the open sub-batch was rolled back
    #[error(
        "Bulk load aborted: {rolled_back_rows} uncommitted row(s) rolled back, {committed_rows} row(s) already committed"
    )]
    Transaction {
        /// Rows in windows committed before the failure
        committed_rows: u64,
        /// Rows of the open window, including the failing one
        rolled_back_rows: u64,
        /// What aborted the load
        #[source]
        source: Box<BatchSqlError>,
    },

    /// Malformed caller input
    #[error("Invalid input: {message}")]
    Input {
        /// What was wrong with the input
        message: String,
    },

    /// Blank input where content is required
    #[error("Input is empty: {what}")]
    EmptyInput {
        /// The input that was empty
        what: String,
    },

    /// Input file does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was looked up
        path: String,
    },

    /// A required argument was absent
    #[error("Invalid argument: {name}")]
    InvalidArgument {
        /// Name of the missing argument
        name: String,
    },

    /// The caller cancelled a long-running operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration or connection string error
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration
        message: String,
    },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        /// Operation that failed
        context: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// CSV payload could not be parsed
    #[error("CSV parsing failed: {context}")]
    Csv {
        /// Where parsing failed
        context: String,
        /// Underlying parser error
        #[source]
        source: csv::Error,
    },
}

/// Convenience type alias for Results with BatchSqlError
pub type Result<T> = std::result::Result<T, BatchSqlError>;

/// Masks the password in either connection string form.
///
/// Handles `Server=..;Pwd=..;` key/value strings as well as `mysql://` URLs.
/// Anything that is neither is fully redacted.
///
/// # Example
///
/// ```rust
/// use batchsql_core::error::redact_connection_string;
///
/// let s = redact_connection_string("Server=db;Database=app;Uid=root;Pwd=secret;");
/// assert_eq!(s, "Server=db;Database=app;Uid=root;Pwd=****;");
///
/// let u = redact_connection_string("mysql://root:secret@db:3306/app");
/// assert_eq!(u, "mysql://root:****@db:3306/app");
/// ```
pub fn redact_connection_string(connection_string: &str) -> String {
    if connection_string.contains("://") {
        return match url::Url::parse(connection_string) {
            Ok(mut parsed_url) => {
                if parsed_url.password().is_some() {
                    let _ = parsed_url.set_password(Some("****"));
                }
                parsed_url.to_string()
            }
            Err(_) => "<redacted>".to_string(),
        };
    }

    if !connection_string.contains('=') {
        return "<redacted>".to_string();
    }

    let mut redacted = String::with_capacity(connection_string.len());
    for pair in connection_string.split_inclusive(';') {
        let (body, terminator) = match pair.strip_suffix(';') {
            Some(body) => (body, ";"),
            None => (pair, ""),
        };
        match body.split_once('=') {
            Some((key, _)) if is_password_key(key) => {
                redacted.push_str(key);
                redacted.push_str("=****");
            }
            _ => redacted.push_str(body),
        }
        redacted.push_str(terminator);
    }
    redacted
}

pub(crate) fn is_password_key(key: &str) -> bool {
    matches!(key.trim().to_ascii_lowercase().as_str(), "pwd" | "password")
}

impl BatchSqlError {
    /// Creates a connection error with sanitized context
    pub fn connection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an execution error carrying the driver error verbatim
    pub fn execution_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Execution {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Creates an empty-input error
    pub fn empty_input(what: impl Into<String>) -> Self {
        Self::EmptyInput { what: what.into() }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wraps a failure raised inside an open bulk-load window.
    pub fn transaction_aborted(committed_rows: u64, rolled_back_rows: u64, source: Self) -> Self {
        Self::Transaction {
            committed_rows,
            rolled_back_rows,
            source: Box::new(source),
        }
    }

    /// Whether the failure happened before anything reached the database.
    pub fn is_pre_flight(&self) -> bool {
        matches!(
            self,
            Self::Injection { .. }
                | Self::Input { .. }
                | Self::EmptyInput { .. }
                | Self::FileNotFound { .. }
                | Self::InvalidArgument { .. }
                | Self::Configuration { .. }
        )
    }
}
