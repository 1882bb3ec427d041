//! Engine root shared by every connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::connection::Connection;
use crate::error::{LobError, LobResult, SqlState};
use crate::lob::{FreePolicy, LobId};
use crate::storage::SpillDirectory;
use crate::table::RowStore;
use crate::txn::{IsolationLevel, RowLockManager, TxnId};

/// Row store, lock manager and spill directory of one engine instance.
#[derive(Debug)]
pub struct Database {
    config: Config,
    rows: RowStore,
    locks: Arc<RowLockManager>,
    spill: Arc<SpillDirectory>,
    policy: FreePolicy,
    next_txn: AtomicU64,
    next_lob: AtomicU64,
}

impl Database {
    /// Opens the engine, creating the spill directory and removing spill files
    /// left behind by an earlier process.
    pub fn open(config: Config) -> LobResult<Arc<Self>> {
        let spill = SpillDirectory::open(&config.spill_dir).map_err(|e| {
            LobError::with_message(
                SqlState::StreamingIo,
                format!(
                    "Cannot open spill directory {}: {}",
                    config.spill_dir.display(),
                    e
                ),
            )
        })?;
        let removed = spill.collect_orphans()?;
        if removed > 0 {
            info!("Removed {} stale spill files from {}", removed, config.spill_dir.display());
        }

        Ok(Arc::new(Self {
            locks: Arc::new(RowLockManager::new(config.lock_timeout)),
            policy: config.free_policy(),
            rows: RowStore::new(),
            spill,
            next_txn: AtomicU64::new(1),
            next_lob: AtomicU64::new(1),
            config,
        }))
    }

    /// Opens a connection at the default isolation level.
    pub fn connect(self: &Arc<Self>) -> Connection {
        Connection::new(Arc::clone(self), IsolationLevel::default())
    }

    /// Opens a connection at `isolation`.
    pub fn connect_with(self: &Arc<Self>, isolation: IsolationLevel) -> Connection {
        Connection::new(Arc::clone(self), isolation)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rows(&self) -> &RowStore {
        &self.rows
    }

    pub fn locks(&self) -> &Arc<RowLockManager> {
        &self.locks
    }

    pub fn spill_directory(&self) -> &Arc<SpillDirectory> {
        &self.spill
    }

    pub fn free_policy(&self) -> FreePolicy {
        self.policy
    }

    pub(crate) fn next_txn_id(&self) -> TxnId {
        TxnId(self.next_txn.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_lob_id(&self) -> LobId {
        LobId(self.next_lob.fetch_add(1, Ordering::Relaxed))
    }
}
