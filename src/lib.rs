#![warn(missing_docs)]

//! # rsadapter
//!
//! Connection-side core of a relational resource adapter: the pieces that sit
//! between a connection pool / transaction manager and a database driver.
//!
//! The adapter does not speak any database protocol. Drivers plug in through
//! the [`PhysicalConnection`] trait and vendor quirks through [`Dialect`].
//!
//! ## Features
//!
//! - **Statement Caching** - Bounded per-connection cache of prepared and
//!   callable statements with bucketed LRU eviction
//! - **Transaction State Machine** - Every begin/commit/rollback/XA call is
//!   validated against the connection's current state
//! - **Local Transactions** - Application-demarcated transactions driven
//!   through auto-commit
//! - **One-Phase XA** - Non-XA connections enlisted as the single one-phase
//!   participant of a global transaction
//! - **Async/await** - Built on Tokio
//!
//! ## Statement Cache
//!
//! ```rust
//! use rsadapter::{StatementCache, StatementCacheKey, StatementKind};
//!
//! let mut cache = StatementCache::new(3);
//! let key = StatementCacheKey::new("SELECT name FROM emp WHERE id = ?", StatementKind::Prepared);
//!
//! // A statement going back into the cache; anything evicted must be closed
//! assert!(cache.add(key.clone(), "stmt-1").is_none());
//!
//! // A cached statement handed out is removed from the cache
//! assert_eq!(cache.remove(&key), Some("stmt-1"));
//! assert!(cache.is_empty());
//! ```
//!
//! ## Managed Connections
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rsadapter::{Config, GenericDialect, ManagedConnection, PhysicalConnection};
//!
//! # async fn example<C: PhysicalConnection + 'static>(driver_conn: C) -> rsadapter::Result<()> {
//! let config: Config = "statementCacheSize=20;commitOrRollbackOnCleanup=rollback".parse()?;
//! let mc = ManagedConnection::new(driver_conn, config, Arc::new(GenericDialect)).await?;
//!
//! // Application-demarcated local transaction
//! let tx = mc.local_transaction();
//! tx.begin().await?;
//! mc.check_execute().await?;
//! tx.commit().await?;
//!
//! // Back to the pool
//! mc.cleanup().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## One-Phase XA
//!
//! ```rust,no_run
//! use rsadapter::{EndFlag, ManagedConnection, PhysicalConnection, StartFlag, Xid};
//!
//! # async fn example<C: PhysicalConnection>(mc: ManagedConnection<C>) -> rsadapter::Result<()> {
//! let xa = mc.xa_resource();
//! let xid = Xid::new(0x57415344, b"gtrid-1".to_vec(), b"bqual-1".to_vec());
//!
//! xa.start(&xid, StartFlag::NoFlags).await?;
//! mc.check_execute().await?;
//! xa.end(&xid, EndFlag::Success).await?;
//! xa.commit(&xid, true).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache_key;
pub mod config;
pub mod connection;
pub mod constants;
pub mod dialect;
pub mod error;
pub mod managed_connection;
pub mod state_manager;
pub mod statement_cache;
pub mod transaction;

// Re-exports for convenience
pub use cache_key::{SqljSection, StatementCacheKey, StatementKind};
pub use config::{CleanupAction, Config, DEFAULT_STATEMENT_CACHE_SIZE};
pub use connection::PhysicalConnection;
pub use constants::{Concurrency, Holdability, IsolationLevel, ResultSetType};
pub use dialect::{Dialect, GenericDialect};
pub use error::{Error, Result};
pub use managed_connection::ManagedConnection;
pub use state_manager::{StateManager, TransactionAction, TransactionState};
pub use statement_cache::{CacheKey, StatementCache, BUCKET_SIZE};
pub use transaction::{EndFlag, LocalTransaction, OnePhaseXaResource, StartFlag, Xid};
