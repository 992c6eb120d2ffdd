//! Statement cache keys
//!
//! A [`StatementCacheKey`] captures everything that makes two prepared
//! statements interchangeable: the SQL text plus the execution attributes the
//! statement was created with. Two keys are equal only when every attribute
//! matches, so a statement prepared with a scrollable cursor is never handed
//! out to a caller that asked for a forward-only one.
//!
//! SQLJ statements (static SQL bound into a database package) additionally
//! carry the package section they were compiled into.
//!
//! # Example
//!
//! ```rust
//! use rsadapter::{StatementCacheKey, StatementKind, ResultSetType};
//!
//! let a = StatementCacheKey::new("SELECT * FROM emp WHERE id = ?", StatementKind::Prepared)
//!     .with_result_set_type(ResultSetType::ScrollInsensitive)
//!     .with_schema(Some("HR"));
//! let b = StatementCacheKey::new("SELECT * FROM emp WHERE id = ?", StatementKind::Prepared)
//!     .with_result_set_type(ResultSetType::ScrollInsensitive)
//!     .with_schema(Some("HR"));
//! assert_eq!(a, b);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::constants::{Concurrency, Holdability, ResultSetType};
use crate::statement_cache::CacheKey;

/// The kind of statement a key identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// `prepareStatement`
    Prepared,
    /// `prepareCall`
    Callable,
    /// SQLJ prepared statement bound to a package section
    SqljPrepared,
    /// SQLJ callable statement bound to a package section
    SqljCallable,
}

impl StatementKind {
    /// Whether this kind carries SQLJ section metadata
    pub fn is_sqlj(&self) -> bool {
        matches!(self, StatementKind::SqljPrepared | StatementKind::SqljCallable)
    }
}

/// SQLJ package section a static statement was compiled into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqljSection {
    /// Package consistency token
    pub consistency_token: [u8; 8],
    /// Package name
    pub package_name: String,
    /// Section number within the package
    pub section_number: i32,
}

impl SqljSection {
    /// Create a section descriptor
    pub fn new(consistency_token: [u8; 8], package_name: impl Into<String>, section_number: i32) -> Self {
        Self {
            consistency_token,
            package_name: package_name.into(),
            section_number,
        }
    }

    /// Consistency token as an integer; tokens are compared by value
    pub fn token_value(&self) -> u64 {
        u64::from_be_bytes(self.consistency_token)
    }
}

/// Key identifying a cached statement
///
/// The hash is computed once at construction from the SQL text (and, for SQLJ
/// keys, the section number and package name). Builder methods consume the key,
/// so a key cannot change after it is handed to a cache.
#[derive(Debug, Clone)]
pub struct StatementCacheKey {
    sql: String,
    kind: StatementKind,
    result_set_type: ResultSetType,
    concurrency: Concurrency,
    holdability: Holdability,
    auto_generated_keys: i32,
    isolation: i32,
    schema: Option<String>,
    section: Option<SqljSection>,
    suffix: Option<String>,
    hash: u64,
}

impl StatementCacheKey {
    /// Create a key with default execution attributes
    ///
    /// Defaults: forward-only, read-only, cursors held over commit, no
    /// generated keys, isolation unset (0), no schema.
    pub fn new(sql: impl Into<String>, kind: StatementKind) -> Self {
        let sql = sql.into();
        let hash = sql_hash(&sql);
        Self {
            sql,
            kind,
            result_set_type: ResultSetType::default(),
            concurrency: Concurrency::default(),
            holdability: Holdability::default(),
            auto_generated_keys: 0,
            isolation: 0,
            schema: None,
            section: None,
            suffix: None,
            hash,
        }
    }

    /// Create a SQLJ key bound to a package section
    ///
    /// `callable` selects between [`StatementKind::SqljCallable`] and
    /// [`StatementKind::SqljPrepared`]. The optional suffix is supplied by the
    /// driver to tell apart otherwise identical sections.
    pub fn sqlj(
        sql: impl Into<String>,
        callable: bool,
        section: SqljSection,
        suffix: Option<String>,
    ) -> Self {
        let kind = if callable {
            StatementKind::SqljCallable
        } else {
            StatementKind::SqljPrepared
        };
        let mut key = Self::new(sql, kind);
        key.hash = key
            .hash
            .wrapping_add(section.section_number as u64)
            .wrapping_add(sql_hash(&section.package_name));
        key.section = Some(section);
        key.suffix = suffix;
        key
    }

    /// Set the result set type
    pub fn with_result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.result_set_type = result_set_type;
        self
    }

    /// Set the concurrency mode
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the cursor holdability
    pub fn with_holdability(mut self, holdability: Holdability) -> Self {
        self.holdability = holdability;
        self
    }

    /// Set the auto-generated-keys flag the statement was prepared with
    pub fn with_auto_generated_keys(mut self, auto_generated_keys: i32) -> Self {
        self.auto_generated_keys = auto_generated_keys;
        self
    }

    /// Set the isolation level (0 = unset)
    pub fn with_isolation(mut self, isolation: i32) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set the owning schema
    pub fn with_schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(str::to_string);
        self
    }

    /// SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Statement kind
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Result set type
    pub fn result_set_type(&self) -> ResultSetType {
        self.result_set_type
    }

    /// Concurrency mode
    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Cursor holdability
    pub fn holdability(&self) -> Holdability {
        self.holdability
    }

    /// Isolation level (0 = unset)
    pub fn isolation(&self) -> i32 {
        self.isolation
    }

    /// Owning schema
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// SQLJ section, for SQLJ keys
    pub fn section(&self) -> Option<&SqljSection> {
        self.section.as_ref()
    }

    /// Driver-supplied suffix, for SQLJ keys
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// The precomputed hash
    pub fn hash_code(&self) -> u64 {
        self.hash
    }
}

/// Polynomial hash of the SQL text; stable across processes and toolchains
fn sql_hash(s: &str) -> u64 {
    s.bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64))
}

impl PartialEq for StatementCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.kind == other.kind
            && self.result_set_type == other.result_set_type
            && self.concurrency == other.concurrency
            && self.holdability == other.holdability
            && self.auto_generated_keys == other.auto_generated_keys
            && self.isolation == other.isolation
            && self.sql == other.sql
            && self.schema == other.schema
            && match (&self.section, &other.section) {
                (Some(a), Some(b)) => {
                    a.section_number == b.section_number
                        && a.token_value() == b.token_value()
                        && a.package_name == b.package_name
                }
                (None, None) => true,
                _ => false,
            }
            && self.suffix == other.suffix
    }
}

impl Eq for StatementCacheKey {}

impl Hash for StatementCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl CacheKey for StatementCacheKey {
    fn cache_hash(&self) -> u64 {
        self.hash
    }
}

impl fmt::Display for StatementCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} {} {} isolation={}",
            self.kind,
            self.result_set_type.as_str(),
            self.concurrency.as_str(),
            self.holdability.as_str(),
            self.isolation
        )?;
        if let Some(schema) = &self.schema {
            write!(f, " schema={}", schema)?;
        }
        if let Some(section) = &self.section {
            write!(
                f,
                " package={} section={} token={:016x}",
                section.package_name,
                section.section_number,
                section.token_value()
            )?;
        }
        if let Some(suffix) = &self.suffix {
            write!(f, " suffix={}", suffix)?;
        }
        write!(f, ": {}", self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> SqljSection {
        SqljSection::new([0, 0, 0, 0, 0, 0, 0x12, 0x34], "PKG1", 3)
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = StatementCacheKey::new("SELECT 1", StatementKind::Prepared);
        let b = StatementCacheKey::new("SELECT 1", StatementKind::Callable);
        // Hash depends only on the SQL text for plain keys
        assert_eq!(a.hash_code(), b.hash_code());
        assert_eq!(a.hash_code(), sql_hash("SELECT 1"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_sqlj_hash_includes_section() {
        let plain = StatementCacheKey::new("SELECT 1", StatementKind::SqljPrepared);
        let sqlj = StatementCacheKey::sqlj("SELECT 1", false, section(), None);
        assert_eq!(
            sqlj.hash_code(),
            plain
                .hash_code()
                .wrapping_add(3)
                .wrapping_add(sql_hash("PKG1"))
        );
        assert_eq!(sqlj.kind(), StatementKind::SqljPrepared);
    }

    #[test]
    fn test_sqlj_equality() {
        let a = StatementCacheKey::sqlj("CALL p(?)", true, section(), Some("x".to_string()));
        let b = StatementCacheKey::sqlj("CALL p(?)", true, section(), Some("x".to_string()));
        assert_eq!(a, b);

        let other_token = SqljSection::new([0, 0, 0, 0, 0, 0, 0x12, 0x35], "PKG1", 3);
        let c = StatementCacheKey::sqlj("CALL p(?)", true, other_token, Some("x".to_string()));
        assert_ne!(a, c);

        let d = StatementCacheKey::sqlj("CALL p(?)", true, section(), None);
        assert_ne!(a, d);
    }

    #[test]
    fn test_schema_none_matches_only_none() {
        let a = StatementCacheKey::new("SELECT 1", StatementKind::Prepared);
        let b = StatementCacheKey::new("SELECT 1", StatementKind::Prepared).with_schema(Some("APP"));
        assert_ne!(a, b);
        assert_eq!(a, StatementCacheKey::new("SELECT 1", StatementKind::Prepared).with_schema(None));
    }

    #[test]
    fn test_token_value() {
        assert_eq!(section().token_value(), 0x1234);
    }

    #[test]
    fn test_display() {
        let key = StatementCacheKey::new("SELECT 1", StatementKind::Prepared).with_schema(Some("APP"));
        let text = key.to_string();
        assert!(text.contains("TYPE_FORWARD_ONLY"));
        assert!(text.contains("schema=APP"));
        assert!(text.ends_with(": SELECT 1"));
    }
}
