//! Managed connections
//!
//! A [`ManagedConnection`] owns one physical connection together with the
//! state that belongs to it: the statement cache, the transaction state
//! machine, and the session properties (auto-commit, isolation level,
//! holdability, schema) that feed into statement cache keys.
//!
//! The handle is cheap to clone; all clones share the same connection. The
//! pool guarantees that only one unit of work uses a managed connection at a
//! time, so the inner mutex is never contended in normal operation.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::cache_key::{StatementCacheKey, StatementKind};
use crate::config::{CleanupAction, Config};
use crate::connection::PhysicalConnection;
use crate::constants::{Concurrency, Holdability, IsolationLevel, ResultSetType};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::state_manager::{StateManager, TransactionAction, TransactionState};
use crate::statement_cache::StatementCache;
use crate::transaction::{LocalTransaction, OnePhaseXaResource, Xid};

/// State shared by all clones of a managed connection
pub(crate) struct ManagedInner<C: PhysicalConnection> {
    conn: Option<C>,
    pub(crate) config: Config,
    pub(crate) state: StateManager,
    statement_cache: Option<StatementCache<StatementCacheKey, C::Statement>>,
    auto_commit: bool,
    isolation: Option<IsolationLevel>,
    holdability: Holdability,
    schema: Option<String>,
    pub(crate) xid: Option<Xid>,
}

impl<C: PhysicalConnection> ManagedInner<C> {
    /// The physical connection, unless the managed connection was destroyed
    pub(crate) fn conn(&mut self) -> Result<&mut C> {
        self.conn.as_mut().ok_or(Error::ConnectionClosed)
    }

    pub(crate) fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub(crate) async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.conn()?.set_auto_commit(auto_commit).await?;
        self.auto_commit = auto_commit;
        Ok(())
    }

    /// Put auto-commit back to the configured default
    pub(crate) async fn restore_auto_commit(&mut self) -> Result<()> {
        let default = self.config.auto_commit;
        if self.auto_commit != default {
            tracing::trace!(auto_commit = default, "Restoring default auto-commit");
            self.set_auto_commit(default).await?;
        }
        Ok(())
    }

    /// Close statements that left the cache; failures are logged
    async fn close_statements(&mut self, statements: Vec<C::Statement>) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        for statement in statements {
            if let Err(e) = conn.close_statement(statement).await {
                tracing::warn!(error = %e, "Failed to close statement");
            }
        }
    }

    /// Bring the statement cache in line with the configured size
    async fn apply_cache_size(&mut self) {
        let new_size = self.config.statement_cache_size;

        let discards = match self.statement_cache.take() {
            None if new_size > 0 => {
                tracing::debug!(size = new_size, "Enabling statement cache");
                self.statement_cache = Some(StatementCache::new(new_size));
                Vec::new()
            }
            None => Vec::new(),
            Some(cache) if cache.max_size() == new_size => {
                self.statement_cache = Some(cache);
                Vec::new()
            }
            Some(mut cache) if new_size == 0 => {
                tracing::debug!("Disabling statement cache");
                cache.remove_all()
            }
            Some(cache) => {
                tracing::debug!(from = cache.max_size(), to = new_size, "Resizing statement cache");
                let mut resized = StatementCache::new(new_size);
                let overflow = resized.add_all(cache);
                self.statement_cache = Some(resized);
                overflow
            }
        };

        self.close_statements(discards).await;
    }

    fn key(&self, sql: &str, kind: StatementKind, result_set_type: ResultSetType, concurrency: Concurrency) -> StatementCacheKey {
        let isolation = match (self.config.cache_isolation_level, self.isolation) {
            (true, Some(level)) => level as i32,
            _ => 0,
        };
        StatementCacheKey::new(sql, kind)
            .with_result_set_type(result_set_type)
            .with_concurrency(concurrency)
            .with_holdability(self.holdability)
            .with_isolation(isolation)
            .with_schema(self.schema.as_deref())
    }
}

/// A physical connection managed by the pool
///
/// # Example
///
/// ```rust,ignore
/// let mc = ManagedConnection::new(driver_conn, Config::new(), Arc::new(GenericDialect)).await?;
///
/// let key = mc.prepared_key("SELECT name FROM emp WHERE id = ?", ResultSetType::ForwardOnly, Concurrency::ReadOnly).await;
/// let stmt = match mc.get_statement(&key).await? {
///     Some(stmt) => stmt,
///     None => driver_prepare(&key)?,
/// };
/// // ... execute ...
/// mc.cache_statement(stmt, key).await?;
/// ```
pub struct ManagedConnection<C: PhysicalConnection> {
    inner: Arc<Mutex<ManagedInner<C>>>,
    dialect: Arc<dyn Dialect<C>>,
}

impl<C: PhysicalConnection> Clone for ManagedConnection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            dialect: Arc::clone(&self.dialect),
        }
    }
}

impl<C: PhysicalConnection> ManagedConnection<C> {
    /// Wrap a newly opened physical connection
    ///
    /// Runs the dialect's connection setup and applies the configured
    /// isolation level and auto-commit mode. The connection is closed if any of these steps fails.
    pub async fn new(mut conn: C, config: Config, dialect: Arc<dyn Dialect<C>>) -> Result<Self> {
        if let Err(e) = setup_connection(&mut conn, &config, dialect.as_ref()).await {
            tracing::debug!(error = %e, dialect = dialect.name(), "Connection setup failed, closing");
            if let Err(close_err) = conn.close().await {
                tracing::warn!(error = %close_err, "Failed to close connection after setup failure");
            }
            return Err(e);
        }

        let statement_cache = config
            .is_statement_caching_enabled()
            .then(|| StatementCache::new(config.statement_cache_size));

        tracing::debug!(
            dialect = dialect.name(),
            statement_cache_size = config.statement_cache_size,
            "Managed connection created"
        );

        let inner = ManagedInner {
            conn: Some(conn),
            auto_commit: config.auto_commit,
            isolation: config.isolation_level,
            holdability: Holdability::default(),
            schema: None,
            xid: None,
            state: StateManager::new(),
            statement_cache,
            config,
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            dialect,
        })
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ManagedInner<C>> {
        self.inner.lock().await
    }

    /// The vendor dialect
    pub fn dialect(&self) -> &dyn Dialect<C> {
        self.dialect.as_ref()
    }

    /// Current configuration
    pub async fn config(&self) -> Config {
        self.inner.lock().await.config.clone()
    }

    /// Replace the configuration
    ///
    /// A changed statement cache size takes effect on the next cache access.
    pub async fn reconfigure(&self, config: Config) {
        let mut inner = self.inner.lock().await;
        tracing::debug!(config = %config, "Managed connection reconfigured");
        inner.config = config;
    }

    // =========================================================================
    // Statement Cache
    // =========================================================================

    /// Take a cached statement matching `key` out of the cache
    pub async fn get_statement(&self, key: &StatementCacheKey) -> Result<Option<C::Statement>> {
        let mut inner = self.inner.lock().await;
        inner.conn()?;
        inner.apply_cache_size().await;

        let statement = inner.statement_cache.as_mut().and_then(|cache| cache.remove(key));
        if statement.is_some() {
            tracing::trace!(sql = key.sql(), "Matching statement found in cache");
        } else {
            tracing::trace!(sql = key.sql(), "No matching statement in cache");
        }
        Ok(statement)
    }

    /// Return a statement to the cache
    ///
    /// The statement is closed instead when caching is disabled or the
    /// dialect fails to reset it. Any statement the cache evicts to make room
    /// is closed as well.
    pub async fn cache_statement(&self, mut statement: C::Statement, key: StatementCacheKey) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.conn()?;
        inner.apply_cache_size().await;

        if inner.statement_cache.is_none() {
            inner.close_statements(vec![statement]).await;
            return Ok(());
        }

        if let Err(e) = self.dialect.do_statement_cleanup(&mut statement).await {
            tracing::warn!(error = %e, sql = key.sql(), "Statement cleanup failed, closing instead of caching");
            inner.close_statements(vec![statement]).await;
            return Ok(());
        }

        tracing::trace!(sql = key.sql(), "Caching statement");
        let discarded = inner
            .statement_cache
            .as_mut()
            .and_then(|cache| cache.add(key, statement));
        if let Some(discarded) = discarded {
            inner.close_statements(vec![discarded]).await;
        }
        Ok(())
    }

    /// Close and remove every cached statement
    pub async fn clear_statement_cache(&self) {
        let mut inner = self.inner.lock().await;
        let statements = match inner.statement_cache.as_mut() {
            Some(cache) => cache.remove_all(),
            None => {
                tracing::debug!("Statement cache is disabled");
                return;
            }
        };
        inner.close_statements(statements).await;
    }

    /// Number of cached statements (0 when caching is disabled)
    pub async fn cached_statement_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.statement_cache.as_ref().map_or(0, |cache| cache.len())
    }

    /// Whether statement caching is currently enabled
    pub async fn is_statement_caching_enabled(&self) -> bool {
        self.inner.lock().await.config.is_statement_caching_enabled()
    }

    /// Cache key for a prepared statement under the current session properties
    pub async fn prepared_key(&self, sql: &str, result_set_type: ResultSetType, concurrency: Concurrency) -> StatementCacheKey {
        self.inner
            .lock()
            .await
            .key(sql, StatementKind::Prepared, result_set_type, concurrency)
    }

    /// Cache key for a callable statement under the current session properties
    pub async fn callable_key(&self, sql: &str, result_set_type: ResultSetType, concurrency: Concurrency) -> StatementCacheKey {
        self.inner
            .lock()
            .await
            .key(sql, StatementKind::Callable, result_set_type, concurrency)
    }

    // =========================================================================
    // Session Properties
    // =========================================================================

    /// Set the transaction isolation level
    pub async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.conn()?.set_transaction_isolation(level).await?;
        inner.isolation = Some(level);
        Ok(())
    }

    /// Set the default cursor holdability
    pub async fn set_holdability(&self, holdability: Holdability) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.conn()?.set_holdability(holdability).await?;
        inner.holdability = holdability;
        Ok(())
    }

    /// Set the current schema
    pub async fn set_schema(&self, schema: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.conn()?.set_schema(schema).await?;
        inner.schema = schema.map(str::to_string);
        Ok(())
    }

    /// Current auto-commit mode
    pub async fn auto_commit(&self) -> bool {
        self.inner.lock().await.auto_commit
    }

    // =========================================================================
    // Transaction State
    // =========================================================================

    /// Current transaction state
    pub async fn transaction_state(&self) -> TransactionState {
        self.inner.lock().await.state.state()
    }

    /// Diagnostic name of the current transaction state
    pub async fn transaction_state_name(&self) -> &'static str {
        self.inner.lock().await.state.state_name()
    }

    /// Overwrite the transaction state without validation
    ///
    /// Used when a connection handle is reassociated from another managed
    /// connection and carries that connection's transaction state with it.
    pub async fn set_state_unconditionally(&self, state: TransactionState) {
        self.inner.lock().await.state.set_unconditionally(state);
    }

    /// Check that a new connection handle may be created
    pub async fn check_handle_allowed(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.conn.as_ref().ok_or(Error::ConnectionClosed)?;
        match inner.state.state() {
            TransactionState::NoTransactionActive
            | TransactionState::LocalTransactionActive
            | TransactionState::GlobalTransactionActive => Ok(()),
            state => Err(Error::InvalidTransactionState {
                operation: "get_connection",
                state,
            }),
        }
    }

    /// Check that work may run inside the current transaction
    pub async fn check_execute(&self) -> Result<()> {
        self.inner.lock().await.state.check_valid(TransactionAction::Execute)
    }

    /// Application-demarcated local transaction on this connection
    pub fn local_transaction(&self) -> LocalTransaction<C> {
        LocalTransaction::new(self.clone())
    }

    /// One-phase XA resource for this connection
    pub fn xa_resource(&self) -> OnePhaseXaResource<C> {
        OnePhaseXaResource::new(self.clone())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Reset the connection before it goes back to the pool
    ///
    /// Cleaning up inside a transaction is a caller error: the work is rolled
    /// back, the state is reset, and [`Error::CleanupInTransaction`] is
    /// returned.
    pub async fn cleanup(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.conn()?;

        let state = inner.state.state();
        if matches!(
            state,
            TransactionState::GlobalTransactionActive
                | TransactionState::LocalTransactionActive
                | TransactionState::TransactionEnding
        ) {
            if !inner.auto_commit {
                if let Err(e) = inner.conn()?.rollback().await {
                    tracing::warn!(error = %e, "Rollback failed during cleanup");
                }
            }
            inner.state.apply(TransactionAction::McCleanup)?;
            inner.xid = None;
            if let Err(e) = inner.restore_auto_commit().await {
                tracing::warn!(error = %e, "Failed to restore auto-commit during cleanup");
            }
            tracing::warn!(state = state.as_str(), "Cleanup requested while still in a transaction");
            return Err(Error::CleanupInTransaction { state });
        }

        resolve_implicit_transaction(&mut inner).await?;

        if let Some(conn) = inner.conn.as_mut() {
            if self.dialect.do_connection_cleanup(conn).await? {
                tracing::trace!(dialect = self.dialect.name(), "Vendor session state reset");
            }
        }
        inner.state.apply(TransactionAction::McCleanup)?;
        inner.xid = None;
        inner.restore_auto_commit().await
    }

    /// Roll back any open work, close cached statements and the connection
    ///
    /// Every later operation fails with [`Error::ConnectionClosed`].
    pub async fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.conn.is_none() {
            return Ok(());
        }

        let state = inner.state.state();
        if state != TransactionState::NoTransactionActive && !inner.auto_commit {
            if let Err(e) = inner.conn()?.rollback().await {
                tracing::warn!(error = %e, state = state.as_str(), "Rollback failed during destroy");
            }
        }
        inner.state.apply(TransactionAction::McCleanup)?;
        inner.xid = None;

        if let Some(cache) = inner.statement_cache.as_mut() {
            let statements = cache.remove_all();
            inner.close_statements(statements).await;
        }

        let result = match inner.conn.take() {
            Some(mut conn) => conn.close().await,
            None => Ok(()),
        };
        tracing::debug!("Managed connection destroyed");
        result
    }

    /// Whether the error means this connection must be discarded
    pub fn is_stale(&self, error: &Error) -> bool {
        self.dialect.is_stale_connection(error)
    }

    /// Transaction state and statement cache layout, for tracing only
    pub async fn dump(&self) -> String {
        let inner = self.inner.lock().await;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "ManagedConnection dialect={} state={} autoCommit={} closed={}",
            self.dialect.name(),
            inner.state.state_name(),
            inner.auto_commit,
            inner.conn.is_none()
        );
        match &inner.statement_cache {
            Some(cache) => out.push_str(&cache.dump()),
            None => out.push_str("Statement cache disabled\n"),
        }
        out
    }
}

async fn setup_connection<C: PhysicalConnection>(conn: &mut C, config: &Config, dialect: &dyn Dialect<C>) -> Result<()> {
    dialect.do_connection_setup(conn).await?;
    if let Some(level) = config.isolation_level {
        conn.set_transaction_isolation(level).await?;
    }
    conn.set_auto_commit(config.auto_commit).await
}

/// Commit or roll back a unit of work the database started on its own
///
/// With `commit_or_rollback_on_cleanup` set, the action runs when the driver
/// reports an open unit of work, or, when it cannot tell, whenever auto-commit
/// is off. Without it, a detected unit of work is rolled back.
async fn resolve_implicit_transaction<C: PhysicalConnection>(inner: &mut ManagedInner<C>) -> Result<()> {
    let action = inner.config.commit_or_rollback_on_cleanup;
    let auto_commit = inner.auto_commit;
    let conn = inner.conn()?;
    let in_uow = conn.in_database_unit_of_work().await?;

    let action = match (in_uow, action) {
        (Some(true), Some(action)) => action,
        (Some(true), None) => CleanupAction::Rollback,
        (None, Some(action)) if !auto_commit => {
            let result = match action {
                CleanupAction::Commit => conn.commit().await,
                CleanupAction::Rollback => conn.rollback().await,
            };
            if let Err(e) = result {
                tracing::debug!(error = %e, action = action.as_str(), "Failed to resolve possible implicit transaction");
            }
            return Ok(());
        }
        _ => return Ok(()),
    };

    tracing::info!(action = action.as_str(), "Resolving implicit database transaction at cleanup");
    match action {
        CleanupAction::Commit => conn.commit().await,
        CleanupAction::Rollback => conn.rollback().await,
    }
}
