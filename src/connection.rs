//! Physical connection abstraction
//!
//! The adapter never talks to a database itself. A driver exposes each of its
//! connections through [`PhysicalConnection`], and the managed connection and
//! transaction coordinators drive it through this trait.

use crate::constants::{Holdability, IsolationLevel};
use crate::error::Result;

/// A driver-level database connection
#[async_trait::async_trait]
pub trait PhysicalConnection: Send {
    /// The driver's prepared/callable statement handle
    type Statement: Send;

    /// Commit the current database transaction
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the current database transaction
    async fn rollback(&mut self) -> Result<()>;

    /// Switch auto-commit mode
    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    /// Close a statement that is no longer cached
    async fn close_statement(&mut self, statement: Self::Statement) -> Result<()>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;

    /// Set the transaction isolation level
    async fn set_transaction_isolation(&mut self, _level: IsolationLevel) -> Result<()> {
        Ok(())
    }

    /// Set the default cursor holdability
    async fn set_holdability(&mut self, _holdability: Holdability) -> Result<()> {
        Ok(())
    }

    /// Set the current schema
    async fn set_schema(&mut self, _schema: Option<&str>) -> Result<()> {
        Ok(())
    }

    /// Whether the database has an implicit unit of work open
    ///
    /// `None` means the driver cannot tell.
    async fn in_database_unit_of_work(&mut self) -> Result<Option<bool>> {
        Ok(None)
    }
}
