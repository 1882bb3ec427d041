//! Per-session transaction context.

use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::database::Database;
use crate::error::{LobError, LobResult, SqlState};
use crate::lob::{Blob, Clob, LobCell, LobId, LobKind, LockBinding};
use crate::storage::LobStorage;
use crate::table::{column_name, Row, RowKey, Value};
use crate::txn::{IsolationLevel, LockGroup, LockMode, TxnId};

#[derive(Debug)]
struct Transaction {
    id: TxnId,
    /// LOBs created or fetched in this transaction, freed when it ends.
    lobs: Vec<Weak<LobCell>>,
    /// Before-images in the order they were taken.
    undo: Vec<(RowKey, Option<Row>)>,
}

/// A connection to a [`Database`].
///
/// A transaction starts with the first operation that needs one and ends with
/// [`Connection::commit`] or [`Connection::rollback`]. Dropping the connection
/// rolls back.
#[derive(Debug)]
pub struct Connection {
    db: Arc<Database>,
    isolation: IsolationLevel,
    txn: Option<Transaction>,
}

impl Connection {
    pub(crate) fn new(db: Arc<Database>, isolation: IsolationLevel) -> Self {
        Self {
            db,
            isolation,
            txn: None,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Identifier of the active transaction, if any.
    pub fn txn_id(&self) -> Option<TxnId> {
        self.txn.as_ref().map(|t| t.id)
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// Changes the isolation level, committing the active transaction first.
    pub fn set_isolation(&mut self, level: IsolationLevel) -> LobResult<()> {
        if self.txn.is_some() {
            self.commit()?;
        }
        self.isolation = level;
        Ok(())
    }

    fn begin(&mut self) -> &mut Transaction {
        let db = &self.db;
        self.txn.get_or_insert_with(|| {
            let id = db.next_txn_id();
            debug!("Started {}", id);
            Transaction {
                id,
                lobs: Vec::new(),
                undo: Vec::new(),
            }
        })
    }

    fn new_cell(&mut self, kind: LobKind, lob_id: LobId, storage: LobStorage) -> Arc<LobCell> {
        let policy = self.db.free_policy();
        let txn = self.begin();
        let cell = Arc::new(LobCell::new(lob_id, kind, txn.id, policy, storage));
        txn.lobs.push(Arc::downgrade(&cell));
        cell
    }

    fn empty_storage(&self) -> LobStorage {
        LobStorage::new(
            Arc::clone(self.db.spill_directory()),
            self.db.config().spill_threshold,
        )
    }

    fn filled_storage(&self, data: &[u8]) -> LobResult<LobStorage> {
        Ok(LobStorage::from_bytes(
            Arc::clone(self.db.spill_directory()),
            self.db.config().spill_threshold,
            data,
        )?)
    }

    /// Creates an empty BLOB owned by the current transaction.
    pub fn create_blob(&mut self) -> LobResult<Blob> {
        let id = self.db.next_lob_id();
        let storage = self.empty_storage();
        Ok(Blob::from_cell(self.new_cell(LobKind::Blob, id, storage)))
    }

    /// Creates an empty CLOB owned by the current transaction.
    pub fn create_clob(&mut self) -> LobResult<Clob> {
        let id = self.db.next_lob_id();
        let storage = self.empty_storage();
        Ok(Clob::from_cell(self.new_cell(LobKind::Clob, id, storage)))
    }

    fn lock_row(&mut self, key: &RowKey, mode: LockMode) -> LobResult<TxnId> {
        let txn = self.begin().id;
        self.db.locks().acquire(txn, LockGroup::Transaction, key, mode)?;
        Ok(txn)
    }

    /// Inserts a new row. Fails with `23505` if the key exists.
    pub fn insert(&mut self, table: &str, id: i64, row: Row) -> LobResult<()> {
        let key = RowKey::new(table, id);
        self.lock_row(&key, LockMode::Exclusive)?;
        let row: Row = row.into_iter().map(|(c, v)| (column_name(&c), v)).collect();
        self.db.rows().insert(key.clone(), row)?;
        self.begin().undo.push((key, None));
        Ok(())
    }

    /// Sets one column of an existing row.
    pub fn update(&mut self, table: &str, id: i64, column: &str, value: Value) -> LobResult<()> {
        let key = RowKey::new(table, id);
        self.lock_row(&key, LockMode::Exclusive)?;
        let mut row = self.db.rows().get(&key).ok_or_else(|| {
            LobError::with_message(SqlState::RowNotFound, format!("No row {}.", key))
        })?;
        let before = row.clone();
        row.insert(column_name(column), value);
        self.db.rows().put(key.clone(), row);
        self.begin().undo.push((key, Some(before)));
        Ok(())
    }

    /// Sets one column, inserting the row if it does not exist.
    pub fn upsert(&mut self, table: &str, id: i64, column: &str, value: Value) -> LobResult<()> {
        let key = RowKey::new(table, id);
        self.lock_row(&key, LockMode::Exclusive)?;
        if self.db.rows().contains(&key) {
            self.update(table, id, column, value)
        } else {
            let mut row = Row::new();
            row.insert(column_name(column), value);
            self.insert(table, id, row)
        }
    }

    /// Deletes a row. Fails with `02000` if it does not exist.
    pub fn delete(&mut self, table: &str, id: i64) -> LobResult<()> {
        let key = RowKey::new(table, id);
        self.lock_row(&key, LockMode::Exclusive)?;
        let before = self.db.rows().remove(&key).ok_or_else(|| {
            LobError::with_message(SqlState::RowNotFound, format!("No row {}.", key))
        })?;
        self.begin().undo.push((key, Some(before)));
        Ok(())
    }

    /// Reads a row under the read locking rules of the isolation level.
    pub fn select(&mut self, table: &str, id: i64) -> LobResult<Row> {
        let key = RowKey::new(table, id);
        let txn = self.begin().id;
        let locks = Arc::clone(self.db.locks());
        let group = match self.isolation {
            IsolationLevel::ReadUncommitted => None,
            level if level.holds_read_locks() => Some(LockGroup::Transaction),
            _ => Some(LockGroup::Statement),
        };
        if let Some(group) = group {
            locks.acquire(txn, group, &key, LockMode::Shared)?;
        }
        let row = self.db.rows().get(&key);
        if group == Some(LockGroup::Statement) {
            locks.release_group(txn, LockGroup::Statement);
        }
        row.ok_or_else(|| LobError::with_message(SqlState::RowNotFound, format!("No row {}.", key)))
    }

    /// Takes the read lock a fetched LOB holds and reads the column.
    ///
    /// Under Repeatable Read and Serializable the lock belongs to the
    /// transaction. Otherwise it belongs to the LOB and is released by
    /// `free()`.
    fn fetch_column(&mut self, table: &str, id: i64, column: &str) -> LobResult<(LobId, LockGroup, Value)> {
        let key = RowKey::new(table, id);
        let lob_id = self.db.next_lob_id();
        let group = if self.isolation.holds_read_locks() {
            LockGroup::Transaction
        } else {
            LockGroup::Lob(lob_id)
        };
        let txn = self.begin().id;
        let locks = self.db.locks();
        locks.acquire(txn, group, &key, LockMode::Shared)?;

        match self.db.rows().column(&key, column) {
            Ok(Value::Null) => {
                self.release_lob_group(txn, group);
                Ok((lob_id, group, Value::Null))
            }
            Ok(value) => Ok((lob_id, group, value)),
            Err(e) => {
                self.release_lob_group(txn, group);
                Err(e)
            }
        }
    }

    fn release_lob_group(&self, txn: TxnId, group: LockGroup) {
        if let LockGroup::Lob(_) = group {
            self.db.locks().release_group(txn, group);
        }
    }

    fn bind(&self, cell: &LobCell, group: LockGroup) {
        cell.bind(LockBinding {
            locks: Arc::clone(self.db.locks()),
            group,
        });
    }

    /// Fetches a BLOB column. Returns `None` for SQL NULL.
    pub fn fetch_blob(&mut self, table: &str, id: i64, column: &str) -> LobResult<Option<Blob>> {
        let (lob_id, group, value) = self.fetch_column(table, id, column)?;
        let txn = self.begin().id;
        let data = match value {
            Value::Null => return Ok(None),
            Value::Blob(data) => data,
            other => {
                self.release_lob_group(txn, group);
                return Err(type_mismatch(column, "BLOB", &other));
            }
        };
        let storage = match self.filled_storage(&data) {
            Ok(storage) => storage,
            Err(e) => {
                self.release_lob_group(txn, group);
                return Err(e);
            }
        };
        let cell = self.new_cell(LobKind::Blob, lob_id, storage);
        self.bind(&cell, group);
        debug!("Fetched {} from {}({}).{} in {}", lob_id, table, id, column, txn);
        Ok(Some(Blob::from_cell(cell)))
    }

    /// Fetches a CLOB column. Returns `None` for SQL NULL.
    pub fn fetch_clob(&mut self, table: &str, id: i64, column: &str) -> LobResult<Option<Clob>> {
        let (lob_id, group, value) = self.fetch_column(table, id, column)?;
        let txn = self.begin().id;
        let text = match value {
            Value::Null => return Ok(None),
            Value::Clob(text) => text,
            Value::Varchar(text) => Arc::from(text),
            other => {
                self.release_lob_group(txn, group);
                return Err(type_mismatch(column, "CLOB", &other));
            }
        };
        let storage = match self.filled_storage(text.as_bytes()) {
            Ok(storage) => storage,
            Err(e) => {
                self.release_lob_group(txn, group);
                return Err(e);
            }
        };
        let cell = self.new_cell(LobKind::Clob, lob_id, storage);
        self.bind(&cell, group);
        debug!("Fetched {} from {}({}).{} in {}", lob_id, table, id, column, txn);
        Ok(Some(Clob::from_cell(cell)))
    }

    /// Commits the transaction: frees its LOBs and releases its locks.
    pub fn commit(&mut self) -> LobResult<()> {
        if let Some(txn) = self.txn.take() {
            let (freed, released) = self.end(&txn);
            info!(
                "Committed {} ({} LOBs freed, {} locks released)",
                txn.id, freed, released
            );
        }
        Ok(())
    }

    /// Rolls back the transaction: restores changed rows, frees its LOBs and
    /// releases its locks.
    pub fn rollback(&mut self) -> LobResult<()> {
        if let Some(txn) = self.txn.take() {
            let rows = self.db.rows();
            for (key, before) in txn.undo.iter().rev() {
                match before {
                    Some(row) => {
                        rows.put(key.clone(), row.clone());
                    }
                    None => {
                        rows.remove(key);
                    }
                }
            }
            let (freed, released) = self.end(&txn);
            info!(
                "Rolled back {} ({} row changes undone, {} LOBs freed, {} locks released)",
                txn.id,
                txn.undo.len(),
                freed,
                released
            );
        }
        Ok(())
    }

    fn end(&self, txn: &Transaction) -> (usize, usize) {
        let mut freed = 0;
        for cell in txn.lobs.iter().filter_map(Weak::upgrade) {
            if !cell.is_freed() {
                cell.free();
                freed += 1;
            }
        }
        let released = self.db.locks().release_txn(txn.id);
        (freed, released)
    }

    /// Rolls back any active transaction and closes the connection.
    pub fn close(mut self) -> LobResult<()> {
        self.rollback()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.txn.is_some() {
            let _ = self.rollback();
        }
    }
}

fn type_mismatch(column: &str, wanted: &str, found: &Value) -> LobError {
    LobError::with_message(
        SqlState::ColumnTypeMismatch,
        format!(
            "Column {} holds {}, not {}.",
            column_name(column),
            found.type_name(),
            wanted
        ),
    )
}
