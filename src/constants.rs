//! JDBC statement and connection constants
//!
//! The numeric values match `java.sql.ResultSet` and `java.sql.Connection`, so
//! keys built from a driver's raw integers compare equal to keys built from
//! these enums.

use std::fmt;

use crate::error::Error;

// =============================================================================
// Result Set Type
// =============================================================================

/// Scrollability of the result sets a statement produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ResultSetType {
    /// Cursor moves forward only
    #[default]
    ForwardOnly = 1003,
    /// Scrollable, not sensitive to concurrent changes
    ScrollInsensitive = 1004,
    /// Scrollable, sensitive to concurrent changes
    ScrollSensitive = 1005,
}

impl ResultSetType {
    /// Name used in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSetType::ForwardOnly => "TYPE_FORWARD_ONLY",
            ResultSetType::ScrollInsensitive => "TYPE_SCROLL_INSENSITIVE",
            ResultSetType::ScrollSensitive => "TYPE_SCROLL_SENSITIVE",
        }
    }
}

impl TryFrom<i32> for ResultSetType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1003 => Ok(ResultSetType::ForwardOnly),
            1004 => Ok(ResultSetType::ScrollInsensitive),
            1005 => Ok(ResultSetType::ScrollSensitive),
            _ => Err(Error::InvalidConfig(format!("unknown result set type: {}", value))),
        }
    }
}

// =============================================================================
// Concurrency
// =============================================================================

/// Whether result sets can be updated through the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Concurrency {
    /// Read-only result set
    #[default]
    ReadOnly = 1007,
    /// Updatable result set
    Updatable = 1008,
}

impl Concurrency {
    /// Name used in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            Concurrency::ReadOnly => "CONCUR_READ_ONLY",
            Concurrency::Updatable => "CONCUR_UPDATABLE",
        }
    }
}

impl TryFrom<i32> for Concurrency {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1007 => Ok(Concurrency::ReadOnly),
            1008 => Ok(Concurrency::Updatable),
            _ => Err(Error::InvalidConfig(format!("unknown concurrency mode: {}", value))),
        }
    }
}

// =============================================================================
// Holdability
// =============================================================================

/// Whether cursors survive a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Holdability {
    /// Cursors stay open across commit
    #[default]
    HoldCursorsOverCommit = 1,
    /// Cursors are closed on commit
    CloseCursorsAtCommit = 2,
}

impl Holdability {
    /// Name used in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            Holdability::HoldCursorsOverCommit => "HOLD_CURSORS_OVER_COMMIT",
            Holdability::CloseCursorsAtCommit => "CLOSE_CURSORS_AT_COMMIT",
        }
    }
}

impl TryFrom<i32> for Holdability {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Holdability::HoldCursorsOverCommit),
            2 => Ok(Holdability::CloseCursorsAtCommit),
            _ => Err(Error::InvalidConfig(format!("unknown holdability: {}", value))),
        }
    }
}

// =============================================================================
// Isolation Level
// =============================================================================

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum IsolationLevel {
    /// Transactions not supported
    None = 0,
    /// Dirty reads allowed
    ReadUncommitted = 1,
    /// Only committed data is read
    ReadCommitted = 2,
    /// Rows read stay stable for the transaction
    RepeatableRead = 4,
    /// Full serializability
    Serializable = 8,
}

impl IsolationLevel {
    /// Property name, as accepted by [`crate::Config`] parsing
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::None => "TRANSACTION_NONE",
            IsolationLevel::ReadUncommitted => "TRANSACTION_READ_UNCOMMITTED",
            IsolationLevel::ReadCommitted => "TRANSACTION_READ_COMMITTED",
            IsolationLevel::RepeatableRead => "TRANSACTION_REPEATABLE_READ",
            IsolationLevel::Serializable => "TRANSACTION_SERIALIZABLE",
        }
    }

    /// Parse a property name (`TRANSACTION_READ_COMMITTED`) or numeric value (`2`)
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(n) = value.parse::<i32>() {
            return Self::try_from(n).ok();
        }
        [
            IsolationLevel::None,
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ]
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(value))
    }
}

impl TryFrom<i32> for IsolationLevel {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(IsolationLevel::None),
            1 => Ok(IsolationLevel::ReadUncommitted),
            2 => Ok(IsolationLevel::ReadCommitted),
            4 => Ok(IsolationLevel::RepeatableRead),
            8 => Ok(IsolationLevel::Serializable),
            _ => Err(Error::InvalidConfig(format!("unknown isolation level: {}", value))),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jdbc_values() {
        assert_eq!(ResultSetType::ForwardOnly as i32, 1003);
        assert_eq!(Concurrency::Updatable as i32, 1008);
        assert_eq!(Holdability::CloseCursorsAtCommit as i32, 2);
        assert_eq!(IsolationLevel::Serializable as i32, 8);
    }

    #[test]
    fn test_try_from_i32() {
        assert_eq!(ResultSetType::try_from(1004).unwrap(), ResultSetType::ScrollInsensitive);
        assert_eq!(Concurrency::try_from(1007).unwrap(), Concurrency::ReadOnly);
        assert_eq!(Holdability::try_from(1).unwrap(), Holdability::HoldCursorsOverCommit);
        assert!(ResultSetType::try_from(0).is_err());
        assert!(IsolationLevel::try_from(3).is_err());
    }

    #[test]
    fn test_isolation_parse() {
        assert_eq!(
            IsolationLevel::parse("TRANSACTION_READ_COMMITTED"),
            Some(IsolationLevel::ReadCommitted)
        );
        assert_eq!(
            IsolationLevel::parse("transaction_serializable"),
            Some(IsolationLevel::Serializable)
        );
        assert_eq!(IsolationLevel::parse("4"), Some(IsolationLevel::RepeatableRead));
        assert_eq!(IsolationLevel::parse("bogus"), None);
    }
}
