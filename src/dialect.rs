//! Vendor dialects
//!
//! A dialect is the set of vendor-specific behaviour a managed connection
//! needs: which error codes mean the connection or statement is gone, how to
//! recognise authentication failures, and hooks run when a connection is set
//! up, when a statement goes back into the cache, and when a connection is
//! cleaned up. One dialect is chosen per data source.

use crate::connection::PhysicalConnection;
use crate::error::{Error, Result};

/// SQLSTATE class for connection exceptions
const SQLSTATE_CONNECTION_CLASS: &str = "08";

/// SQLSTATE class for invalid authorization
const SQLSTATE_AUTHORIZATION_CLASS: &str = "28";

/// Vendor-specific behaviour for one kind of database
#[async_trait::async_trait]
pub trait Dialect<C: PhysicalConnection>: Send + Sync {
    /// Dialect name, for diagnostics
    fn name(&self) -> &str;

    /// Vendor error codes meaning the connection is no longer usable
    fn stale_connection_codes(&self) -> &[i32] {
        &[]
    }

    /// Vendor error codes meaning a cached statement is no longer usable
    fn stale_statement_codes(&self) -> &[i32] {
        &[]
    }

    /// Whether an error means the connection is stale
    ///
    /// Matches the vendor codes and any SQLSTATE in class `08`.
    fn is_stale_connection(&self, error: &Error) -> bool {
        match error {
            Error::StaleConnection(_) | Error::ConnectionClosed => true,
            Error::Database { code, sql_state, .. } => {
                self.stale_connection_codes().contains(code)
                    || sql_state
                        .as_deref()
                        .is_some_and(|s| s.starts_with(SQLSTATE_CONNECTION_CLASS))
            }
            _ => false,
        }
    }

    /// Whether an error means a cached statement is stale
    fn is_stale_statement(&self, error: &Error) -> bool {
        error
            .error_code()
            .is_some_and(|code| self.stale_statement_codes().contains(&code))
    }

    /// Whether an error is an authentication failure (SQLSTATE class `28`)
    fn is_auth_exception(&self, error: &Error) -> bool {
        error
            .sql_state()
            .is_some_and(|s| s.starts_with(SQLSTATE_AUTHORIZATION_CLASS))
    }

    /// Prepare a newly created connection
    async fn do_connection_setup(&self, _conn: &mut C) -> Result<()> {
        Ok(())
    }

    /// Reset a statement before it goes back into the cache
    async fn do_statement_cleanup(&self, _statement: &mut C::Statement) -> Result<()> {
        Ok(())
    }

    /// Reset vendor session state at cleanup
    ///
    /// Returns `true` if anything was changed.
    async fn do_connection_cleanup(&self, _conn: &mut C) -> Result<bool> {
        Ok(false)
    }
}

/// Dialect for databases without vendor-specific handling
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl<C: PhysicalConnection> Dialect<C> for GenericDialect {
    fn name(&self) -> &str {
        "generic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopConnection;

    #[async_trait::async_trait]
    impl PhysicalConnection for NoopConnection {
        type Statement = ();

        async fn commit(&mut self) -> Result<()> {
            Ok(())
        }
        async fn rollback(&mut self) -> Result<()> {
            Ok(())
        }
        async fn set_auto_commit(&mut self, _auto_commit: bool) -> Result<()> {
            Ok(())
        }
        async fn close_statement(&mut self, _statement: ()) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct CodedDialect;

    impl Dialect<NoopConnection> for CodedDialect {
        fn name(&self) -> &str {
            "coded"
        }

        fn stale_connection_codes(&self) -> &[i32] {
            &[-4499, 17002]
        }

        fn stale_statement_codes(&self) -> &[i32] {
            &[-514]
        }
    }

    #[test]
    fn test_generic_stale_by_sql_state() {
        let dialect = GenericDialect;
        let d: &dyn Dialect<NoopConnection> = &dialect;
        assert!(d.is_stale_connection(&Error::database(0, Some("08006"), "broken pipe")));
        assert!(!d.is_stale_connection(&Error::database(0, Some("42000"), "syntax")));
        assert!(d.is_stale_connection(&Error::ConnectionClosed));
        assert_eq!(d.name(), "generic");
    }

    #[test]
    fn test_vendor_codes() {
        let d = CodedDialect;
        assert!(d.is_stale_connection(&Error::database(17002, None, "io error")));
        assert!(!d.is_stale_connection(&Error::database(1, None, "constraint")));
        assert!(d.is_stale_statement(&Error::database(-514, None, "package not found")));
        assert!(!d.is_stale_statement(&Error::database(17002, None, "io error")));
    }

    #[test]
    fn test_auth_exception() {
        let d = CodedDialect;
        assert!(d.is_auth_exception(&Error::database(1017, Some("28000"), "bad password")));
        assert!(!d.is_auth_exception(&Error::database(1017, None, "bad password")));
    }
}
