//! Error types for the resource adapter
//!
//! This module defines all error types that can occur while caching statements,
//! driving transaction state transitions, and talking to the physical connection.

use thiserror::Error;

use crate::state_manager::{TransactionAction, TransactionState};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the resource adapter
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    // =========================================================================
    // Transaction State Errors
    // =========================================================================
    /// The action is not permitted from the current transaction state
    #[error("illegal transaction state transition: {action} is not allowed from {state}")]
    IllegalTransition {
        action: TransactionAction,
        state: TransactionState,
    },

    /// A connection-level operation is not permitted in the current state
    #[error("operation '{operation}' is not permitted for transaction state {state}")]
    InvalidTransactionState {
        operation: &'static str,
        state: TransactionState,
    },

    /// Cleanup was requested while a transaction was still active
    #[error("cannot clean up a managed connection while it is still in a transaction ({state})")]
    CleanupInTransaction { state: TransactionState },

    // =========================================================================
    // XA Errors
    // =========================================================================
    /// XA protocol violation (wrong xid, unsupported flag combination)
    #[error("XA protocol error: {0}")]
    XaProtocol(String),

    /// Two-phase commit requested from a one-phase resource
    #[error("two-phase commit is not supported by a one-phase resource")]
    TwoPhaseNotSupported,

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Internal cache invariant violated, usually from unserialized concurrent use
    #[error("statement cache corrupted: {0}")]
    StructuralCorruption(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Error reported by the database driver
    #[error("database error {code}{}: {message}",
        sql_state.as_ref().map(|s| format!(" (SQLSTATE {})", s)).unwrap_or_default())]
    Database {
        code: i32,
        sql_state: Option<String>,
        message: String,
    },

    /// The physical connection is no longer usable
    #[error("stale connection: {0}")]
    StaleConnection(String),

    /// The managed connection was destroyed
    #[error("connection closed")]
    ConnectionClosed,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration property
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a new database error
    pub fn database(code: i32, sql_state: Option<&str>, message: impl Into<String>) -> Self {
        Error::Database {
            code,
            sql_state: sql_state.map(str::to_string),
            message: message.into(),
        }
    }

    /// Vendor error code, if this is a database error
    pub fn error_code(&self) -> Option<i32> {
        match self {
            Error::Database { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// SQLSTATE, if this is a database error that carries one
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Error::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if this is an illegal transaction state transition
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, Error::IllegalTransition { .. })
    }

    /// Check if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::StaleConnection(_) | Error::ConnectionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_transition_display() {
        let err = Error::IllegalTransition {
            action: TransactionAction::XaEnd,
            state: TransactionState::NoTransactionActive,
        };
        assert_eq!(
            err.to_string(),
            "illegal transaction state transition: XA_END is not allowed from NO_TRANSACTION_ACTIVE"
        );
        assert!(err.is_illegal_transition());
    }

    #[test]
    fn test_database_error_display() {
        let err = Error::database(-4470, Some("08003"), "connection closed");
        assert_eq!(
            err.to_string(),
            "database error -4470 (SQLSTATE 08003): connection closed"
        );
        assert_eq!(err.error_code(), Some(-4470));
        assert_eq!(err.sql_state(), Some("08003"));

        let err = Error::database(17002, None, "io error");
        assert_eq!(err.to_string(), "database error 17002: io error");
        assert_eq!(err.sql_state(), None);
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::StaleConnection("gone".to_string()).is_connection_error());
        assert!(!Error::TwoPhaseNotSupported.is_connection_error());
    }
}
