//! Minimal keyed row store that fetched LOBs are read from.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LobError, LobResult, SqlState};

/// Address of a stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub table: Arc<str>,
    pub id: i64,
}

impl RowKey {
    pub fn new(table: &str, id: i64) -> Self {
        Self {
            table: Arc::from(table.to_ascii_uppercase()),
            id,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table, self.id)
    }
}

/// Column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Integer(i64),
    Varchar(String),
    Blob(Bytes),
    Clob(Arc<str>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Varchar(_) => "VARCHAR",
            Value::Blob(_) => "BLOB",
            Value::Clob(_) => "CLOB",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Column name to value. Column names are case-insensitive and stored upper case.
pub type Row = BTreeMap<String, Value>;

/// Normalizes a column name.
pub fn column_name(name: &str) -> String {
    name.to_ascii_uppercase()
}

/// Committed and uncommitted rows, visible to every connection.
///
/// Isolation comes from row locks, not from versioning: a write is visible as
/// soon as it is applied and undone on rollback.
#[derive(Debug, Default)]
pub struct RowStore {
    rows: DashMap<RowKey, Row>,
}

impl RowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RowKey) -> Option<Row> {
        self.rows.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.rows.contains_key(key)
    }

    /// Inserts a new row. Fails with `23505` if the key exists.
    pub fn insert(&self, key: RowKey, row: Row) -> LobResult<()> {
        match self.rows.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(e) => Err(LobError::with_message(
                SqlState::DuplicateKey,
                format!("The row {} already exists.", e.key()),
            )),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(row);
                Ok(())
            }
        }
    }

    /// Replaces a row and returns the previous one.
    pub fn put(&self, key: RowKey, row: Row) -> Option<Row> {
        self.rows.insert(key, row)
    }

    pub fn remove(&self, key: &RowKey) -> Option<Row> {
        self.rows.remove(key).map(|(_, row)| row)
    }

    /// Reads a single column. Fails with `02000` or `42X04` when missing.
    pub fn column(&self, key: &RowKey, column: &str) -> LobResult<Value> {
        let row = self.rows.get(key).ok_or_else(|| {
            LobError::with_message(SqlState::RowNotFound, format!("No row {}.", key))
        })?;
        row.get(&column_name(column)).cloned().ok_or_else(|| {
            LobError::with_message(
                SqlState::ColumnNotFound,
                format!("Column {} is not in row {}.", column_name(column), key),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
