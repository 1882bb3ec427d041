//! Row lock manager with bounded blocking waits.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::TxnId;
use crate::error::{LobError, LobResult, SqlState};
use crate::lob::LobId;
use crate::table::RowKey;

/// Lock mode on a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Owner of a lock within a transaction. Locks in a `Lob` group can be released
/// before the transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockGroup {
    Transaction,
    /// Released when the current statement completes.
    Statement,
    Lob(LobId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Holder {
    txn: TxnId,
    group: LockGroup,
    mode: LockMode,
}

impl Holder {
    fn conflicts_with(&self, txn: TxnId, mode: LockMode) -> bool {
        self.txn != txn && (self.mode == LockMode::Exclusive || mode == LockMode::Exclusive)
    }
}

/// Shared/exclusive row locks keyed by [`RowKey`].
#[derive(Debug)]
pub struct RowLockManager {
    locks: Mutex<HashMap<RowKey, Vec<Holder>>>,
    released: Condvar,
    timeout: Duration,
}

impl RowLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquires `mode` on `key` for `txn`, blocking while another transaction
    /// holds a conflicting lock. Fails with `40XL1` once the timeout elapses.
    pub fn acquire(&self, txn: TxnId, group: LockGroup, key: &RowKey, mode: LockMode) -> LobResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut locks = self.locks.lock();
        let mut waited = false;

        loop {
            let blocked = locks
                .get(key)
                .map(|holders| holders.iter().any(|h| h.conflicts_with(txn, mode)))
                .unwrap_or(false);

            if !blocked {
                let holder = Holder { txn, group, mode };
                let holders = locks.entry(key.clone()).or_default();
                if !holders.contains(&holder) {
                    holders.push(holder);
                }
                if waited {
                    debug!("{} acquired {:?} lock on {} after waiting", txn, mode, key);
                }
                return Ok(());
            }

            if !waited {
                debug!("{} waiting for {:?} lock on {}", txn, mode, key);
                waited = true;
            }

            if self.released.wait_until(&mut locks, deadline).timed_out() {
                let still_blocked = locks
                    .get(key)
                    .map(|holders| holders.iter().any(|h| h.conflicts_with(txn, mode)))
                    .unwrap_or(false);
                if still_blocked {
                    warn!(
                        "{} timed out after {:?} waiting for {:?} lock on {}",
                        txn, self.timeout, mode, key
                    );
                    return Err(LobError::with_message(
                        SqlState::LockTimeout,
                        format!("A lock could not be obtained on {} within {:?}.", key, self.timeout),
                    ));
                }
            }
        }
    }

    /// Releases every lock `txn` holds in `group`.
    pub fn release_group(&self, txn: TxnId, group: LockGroup) -> usize {
        self.release_where(|h| h.txn == txn && h.group == group)
    }

    /// Releases every lock held by `txn`.
    pub fn release_txn(&self, txn: TxnId) -> usize {
        self.release_where(|h| h.txn == txn)
    }

    fn release_where(&self, matches: impl Fn(&Holder) -> bool) -> usize {
        let mut locks = self.locks.lock();
        let mut released = 0;
        locks.retain(|_, holders| {
            let before = holders.len();
            holders.retain(|h| !matches(h));
            released += before - holders.len();
            !holders.is_empty()
        });
        drop(locks);
        if released > 0 {
            self.released.notify_all();
        }
        released
    }

    /// Number of locks currently held by `txn`.
    pub fn held_by(&self, txn: TxnId) -> usize {
        self.locks
            .lock()
            .values()
            .flat_map(|holders| holders.iter())
            .filter(|h| h.txn == txn)
            .count()
    }

    /// Whether any transaction holds a lock on `key`.
    pub fn is_locked(&self, key: &RowKey) -> bool {
        self.locks.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn key(id: i64) -> RowKey {
        RowKey::new("T", id)
    }

    #[test]
    fn test_shared_locks_are_compatible() {
        let manager = RowLockManager::new(Duration::from_millis(50));
        manager
            .acquire(TxnId(1), LockGroup::Transaction, &key(1), LockMode::Shared)
            .unwrap();
        manager
            .acquire(TxnId(2), LockGroup::Transaction, &key(1), LockMode::Shared)
            .unwrap();
        assert_eq!(manager.held_by(TxnId(1)), 1);
        assert_eq!(manager.held_by(TxnId(2)), 1);
    }

    #[test]
    fn test_exclusive_conflict_times_out() {
        let manager = RowLockManager::new(Duration::from_millis(50));
        manager
            .acquire(TxnId(1), LockGroup::Lob(LobId(7)), &key(1), LockMode::Shared)
            .unwrap();
        let err = manager
            .acquire(TxnId(2), LockGroup::Transaction, &key(1), LockMode::Exclusive)
            .unwrap_err();
        assert_eq!(err.state, SqlState::LockTimeout);
        assert_eq!(err.sql_state(), "40XL1");
    }

    #[test]
    fn test_same_transaction_never_conflicts() {
        let manager = RowLockManager::new(Duration::from_millis(50));
        manager
            .acquire(TxnId(1), LockGroup::Lob(LobId(1)), &key(1), LockMode::Shared)
            .unwrap();
        manager
            .acquire(TxnId(1), LockGroup::Transaction, &key(1), LockMode::Exclusive)
            .unwrap();
        assert_eq!(manager.held_by(TxnId(1)), 2);
    }

    #[test]
    fn test_release_group_keeps_transaction_locks() {
        let manager = RowLockManager::new(Duration::from_millis(50));
        manager
            .acquire(TxnId(1), LockGroup::Lob(LobId(3)), &key(1), LockMode::Shared)
            .unwrap();
        manager
            .acquire(TxnId(1), LockGroup::Transaction, &key(2), LockMode::Shared)
            .unwrap();

        assert_eq!(manager.release_group(TxnId(1), LockGroup::Lob(LobId(3))), 1);
        assert!(!manager.is_locked(&key(1)));
        assert!(manager.is_locked(&key(2)));

        assert_eq!(manager.release_txn(TxnId(1)), 1);
        assert!(!manager.is_locked(&key(2)));
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let manager = Arc::new(RowLockManager::new(Duration::from_secs(5)));
        manager
            .acquire(TxnId(1), LockGroup::Transaction, &key(1), LockMode::Exclusive)
            .unwrap();

        let waiter = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager.acquire(TxnId(2), LockGroup::Transaction, &key(1), LockMode::Shared)
            })
        };

        thread::sleep(Duration::from_millis(50));
        manager.release_txn(TxnId(1));
        waiter.join().unwrap().unwrap();
        assert_eq!(manager.held_by(TxnId(2)), 1);
    }
}
