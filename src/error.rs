//! Error type shared by the whole access layer
//!
//! Callers only ever see two conditions: a query that was expected to return a
//! row found none ([`Error::NotFound`]), or the store reported a failure
//! ([`Error::Database`]). The store message is carried verbatim; this layer
//! does not sub-classify it.

use diesel::result::Error as DieselError;
use thiserror::Error;

/// Errors produced by [`Connection`](crate::Connection), statements and rows
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A single-row query matched zero rows
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other failure surfaced by the store or by value decoding
    #[error("database error: {0}")]
    Database(String),
}

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Create a generic database error with the given message
    pub fn database(message: impl Into<String>) -> Self {
        Error::Database(message.into())
    }

    /// Check whether this is the "row not found" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// The underlying message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Error::NotFound(msg) | Error::Database(msg) => msg,
        }
    }
}

impl From<DieselError> for Error {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Error::NotFound("query returned no rows".to_string()),
            DieselError::DatabaseError(_, info) => Error::Database(info.message().to_string()),
            other => Error::Database(other.to_string()),
        }
    }
}

impl From<diesel::ConnectionError> for Error {
    fn from(err: diesel::ConnectionError) -> Self {
        Error::Database(format!("connection failed: {}", err))
    }
}
