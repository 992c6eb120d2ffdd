//! Managed connection configuration and property string parsing
//!
//! Supports semicolon-separated `key=value` property lists, as found in data
//! source definitions:
//! - `statementCacheSize=20`
//! - `statementCacheSize=20;commitOrRollbackOnCleanup=rollback`
//! - `isolationLevel=TRANSACTION_READ_COMMITTED;autoCommit=false`
//!
//! Keys are matched case-insensitively.

use std::fmt;
use std::str::FromStr;

use crate::constants::IsolationLevel;
use crate::error::{Error, Result};

/// Default statement cache size per connection
pub const DEFAULT_STATEMENT_CACHE_SIZE: usize = 10;

/// How to resolve a database unit of work still open at cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// Commit the implicit transaction
    Commit,
    /// Roll back the implicit transaction
    Rollback,
}

impl CleanupAction {
    /// Property value
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupAction::Commit => "commit",
            CleanupAction::Rollback => "rollback",
        }
    }
}

impl FromStr for CleanupAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "commit" => Ok(CleanupAction::Commit),
            "rollback" => Ok(CleanupAction::Rollback),
            other => Err(Error::InvalidConfig(format!(
                "commitOrRollbackOnCleanup must be commit or rollback, got '{}'",
                other
            ))),
        }
    }
}

/// Configuration for a managed connection.
///
/// # Examples
///
/// ```rust
/// use rsadapter::{CleanupAction, Config, IsolationLevel};
///
/// let config = Config::new()
///     .statement_cache_size(50)
///     .cache_isolation_level(true)
///     .isolation_level(IsolationLevel::ReadCommitted)
///     .commit_or_rollback_on_cleanup(CleanupAction::Rollback);
///
/// let parsed: Config = "statementCacheSize=50;statementCacheIsolationLevel=true;\
///     isolationLevel=TRANSACTION_READ_COMMITTED;commitOrRollbackOnCleanup=rollback"
///     .parse()
///     .unwrap();
/// assert_eq!(config, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Statements cached per connection (0 = disabled)
    pub statement_cache_size: usize,
    /// Whether the isolation level is part of the statement cache key
    pub cache_isolation_level: bool,
    /// Resolution for an implicit database unit of work at cleanup
    pub commit_or_rollback_on_cleanup: Option<CleanupAction>,
    /// Isolation level applied when the connection is set up
    pub isolation_level: Option<IsolationLevel>,
    /// Default auto-commit mode
    pub auto_commit: bool,
}

impl Config {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the statement cache size
    ///
    /// Set to 0 to disable statement caching.
    pub fn statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    /// Include the isolation level in statement cache keys
    pub fn cache_isolation_level(mut self, enabled: bool) -> Self {
        self.cache_isolation_level = enabled;
        self
    }

    /// Resolve implicit units of work at cleanup
    pub fn commit_or_rollback_on_cleanup(mut self, action: CleanupAction) -> Self {
        self.commit_or_rollback_on_cleanup = Some(action);
        self
    }

    /// Set the isolation level applied at setup
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Set the default auto-commit mode
    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Check if statement caching is enabled
    pub fn is_statement_caching_enabled(&self) -> bool {
        self.statement_cache_size > 0
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            statement_cache_size: DEFAULT_STATEMENT_CACHE_SIZE,
            cache_isolation_level: false,
            commit_or_rollback_on_cleanup: None,
            isolation_level: None,
            auto_commit: true,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::InvalidConfig(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

/// Parse a `key=value;key=value` property list
///
/// An empty string yields the defaults.
impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut config = Config::default();

        for pair in s.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }

            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::InvalidConfig(format!("expected key=value, got '{}'", pair))
            })?;
            let key = key.trim();
            let value = value.trim();

            match key.to_ascii_lowercase().as_str() {
                "statementcachesize" => {
                    config.statement_cache_size = value.parse().map_err(|_| {
                        Error::InvalidConfig(format!("invalid statementCacheSize: '{}'", value))
                    })?;
                }
                "statementcacheisolationlevel" => {
                    config.cache_isolation_level = parse_bool(key, value)?;
                }
                "commitorrollbackoncleanup" => {
                    config.commit_or_rollback_on_cleanup = Some(value.parse()?);
                }
                "isolationlevel" => {
                    config.isolation_level = Some(IsolationLevel::parse(value).ok_or_else(|| {
                        Error::InvalidConfig(format!("invalid isolationLevel: '{}'", value))
                    })?);
                }
                "autocommit" => {
                    config.auto_commit = parse_bool(key, value)?;
                }
                _ => {
                    return Err(Error::InvalidConfig(format!(
                        "unknown property: '{}'",
                        key
                    )));
                }
            }
        }

        Ok(config)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "statementCacheSize={};statementCacheIsolationLevel={};autoCommit={}",
            self.statement_cache_size, self.cache_isolation_level, self.auto_commit
        )?;
        if let Some(level) = self.isolation_level {
            write!(f, ";isolationLevel={}", level)?;
        }
        if let Some(action) = self.commit_or_rollback_on_cleanup {
            write!(f, ";commitOrRollbackOnCleanup={}", action.as_str())?;
        }
        Ok(())
    }
}
