//! Transactions, isolation levels and row locking.

mod lock;

pub use lock::*;

use std::fmt;
use std::str::FromStr;

use crate::error::{LobError, SqlState};

/// Transaction identifier, unique for the lifetime of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read-uncommitted",
            IsolationLevel::ReadCommitted => "read-committed",
            IsolationLevel::RepeatableRead => "repeatable-read",
            IsolationLevel::Serializable => "serializable",
        }
    }

    /// Whether read locks are kept until the transaction ends.
    pub fn holds_read_locks(&self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = LobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "read-uncommitted" | "ur" => Ok(IsolationLevel::ReadUncommitted),
            "read-committed" | "cs" => Ok(IsolationLevel::ReadCommitted),
            "repeatable-read" | "rs" => Ok(IsolationLevel::RepeatableRead),
            "serializable" | "rr" => Ok(IsolationLevel::Serializable),
            _ => Err(LobError::with_message(
                SqlState::InvalidApiParameter,
                format!("Unknown isolation level: {}", s),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_parse() {
        assert_eq!(
            "repeatable_read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!("RS".parse::<IsolationLevel>().unwrap(), IsolationLevel::RepeatableRead);
        assert_eq!("ur".parse::<IsolationLevel>().unwrap(), IsolationLevel::ReadUncommitted);
        let err = "chaos".parse::<IsolationLevel>().unwrap_err();
        assert_eq!(err.state, SqlState::InvalidApiParameter);
        assert!(IsolationLevel::Serializable.holds_read_locks());
        assert!(!IsolationLevel::ReadUncommitted.holds_read_locks());
    }
}
