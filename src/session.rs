//! Sessions of the HTTP surface: one connection plus the LOBs it handed out.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::connection::Connection;
use crate::database::Database;
use crate::error::{LobError, LobResult, SqlState};
use crate::lob::{Blob, Clob, LobId, LobKind};
use crate::storage::StorageKind;
use crate::txn::IsolationLevel;

/// A LOB handed out to a session.
#[derive(Debug, Clone)]
pub enum LobHandle {
    Blob(Blob),
    Clob(Clob),
}

impl LobHandle {
    pub fn id(&self) -> LobId {
        match self {
            LobHandle::Blob(b) => b.id(),
            LobHandle::Clob(c) => c.id(),
        }
    }

    pub fn kind(&self) -> LobKind {
        match self {
            LobHandle::Blob(_) => LobKind::Blob,
            LobHandle::Clob(_) => LobKind::Clob,
        }
    }

    /// Length in bytes (BLOB) or characters (CLOB).
    pub fn length(&self) -> LobResult<u64> {
        match self {
            LobHandle::Blob(b) => b.length(),
            LobHandle::Clob(c) => c.length(),
        }
    }

    pub fn storage_kind(&self) -> Option<StorageKind> {
        match self {
            LobHandle::Blob(b) => b.storage_kind(),
            LobHandle::Clob(c) => c.storage_kind(),
        }
    }

    pub fn is_freed(&self) -> bool {
        match self {
            LobHandle::Blob(b) => b.is_freed(),
            LobHandle::Clob(c) => c.is_freed(),
        }
    }

    pub fn free(&self) -> LobResult<()> {
        match self {
            LobHandle::Blob(b) => b.free(),
            LobHandle::Clob(c) => c.free(),
        }
    }
}

/// One client session.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub created: DateTime<Utc>,
    conn: Connection,
    lobs: BTreeMap<LobId, LobHandle>,
}

impl Session {
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.conn.isolation()
    }

    /// Identifier of the active transaction, if any.
    pub fn txn_id(&self) -> Option<u64> {
        self.conn.txn_id().map(|t| t.0)
    }

    pub fn register(&mut self, lob: LobHandle) -> LobHandle {
        self.lobs.insert(lob.id(), lob.clone());
        lob
    }

    /// Looks up a LOB this session was given. Unknown ids fail with `XJ215`,
    /// like a locator that is no longer valid.
    pub fn lob(&self, id: LobId) -> LobResult<LobHandle> {
        self.lobs.get(&id).cloned().ok_or_else(|| {
            LobError::with_message(
                SqlState::LobObjectInvalid,
                format!("{} is not a valid LOB of session {}.", id, self.id),
            )
        })
    }

    pub fn lob_count(&self) -> usize {
        self.lobs.len()
    }

    /// Frees a LOB and forgets its id; later lookups fail with `XJ215`.
    pub fn free_lob(&mut self, id: LobId) -> LobResult<LobHandle> {
        let lob = self.lob(id)?;
        lob.free()?;
        self.lobs.remove(&id);
        Ok(lob)
    }

    /// Commits the connection. Every LOB handed out belongs to the ending
    /// transaction, so all of them are forgotten.
    pub fn commit(&mut self) -> LobResult<()> {
        self.conn.commit()?;
        self.lobs.clear();
        Ok(())
    }

    pub fn rollback(&mut self) -> LobResult<()> {
        self.conn.rollback()?;
        self.lobs.clear();
        Ok(())
    }

    /// Changes the isolation level; the implicit commit forgets the LOBs.
    pub fn set_isolation(&mut self, level: IsolationLevel) -> LobResult<()> {
        self.conn.set_isolation(level)?;
        self.lobs.clear();
        Ok(())
    }
}

/// Registry of open sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    db: Arc<Database>,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            sessions: DashMap::new(),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Opens a session at `isolation`.
    pub fn open(&self, isolation: IsolationLevel) -> Arc<Mutex<Session>> {
        let id = Uuid::new_v4().simple().to_string();
        let session = Arc::new(Mutex::new(Session {
            id: id.clone(),
            created: Utc::now(),
            conn: self.db.connect_with(isolation),
            lobs: BTreeMap::new(),
        }));
        self.sessions.insert(id.clone(), Arc::clone(&session));
        info!("Opened session {} at {}", id, isolation);
        session
    }

    /// Returns a session. Unknown ids fail with `08003`.
    pub fn get(&self, id: &str) -> LobResult<Arc<Mutex<Session>>> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| {
                LobError::with_message(
                    SqlState::NoCurrentConnection,
                    format!("No session {}.", id),
                )
            })
    }

    /// Removes a session. The caller rolls it back.
    pub fn remove(&self, id: &str) -> LobResult<Arc<Mutex<Session>>> {
        self.sessions
            .remove(id)
            .map(|(_, s)| s)
            .ok_or_else(|| {
                LobError::with_message(
                    SqlState::NoCurrentConnection,
                    format!("No session {}.", id),
                )
            })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn registry(dir: &tempfile::TempDir) -> SessionRegistry {
        let config = Config {
            spill_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        SessionRegistry::new(Database::open(config).unwrap())
    }

    #[test]
    fn test_ended_transactions_forget_their_lobs() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = registry(&dir);
        let session = sessions.open(IsolationLevel::ReadCommitted);
        let mut session = session.lock();

        let blob = session.connection().create_blob().unwrap();
        let kept = session.register(LobHandle::Blob(blob));
        let clob = session.connection().create_clob().unwrap();
        session.register(LobHandle::Clob(clob));
        assert_eq!(session.lob_count(), 2);

        session.commit().unwrap();
        assert_eq!(session.lob_count(), 0);
        assert!(kept.is_freed());
        assert_eq!(session.lob(kept.id()).unwrap_err().state, SqlState::LobObjectInvalid);

        let blob = session.connection().create_blob().unwrap();
        session.register(LobHandle::Blob(blob));
        session.rollback().unwrap();
        assert_eq!(session.lob_count(), 0);
    }

    #[test]
    fn test_free_forgets_the_lob() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = registry(&dir);
        let session = sessions.open(IsolationLevel::RepeatableRead);
        let mut session = session.lock();

        let blob = session.connection().create_blob().unwrap();
        let id = session.register(LobHandle::Blob(blob)).id();
        let freed = session.free_lob(id).unwrap();
        assert!(freed.is_freed());
        assert_eq!(session.lob_count(), 0);
        assert_eq!(session.free_lob(id).unwrap_err().state, SqlState::LobObjectInvalid);
        assert!(session.txn_id().is_some());
    }

    #[test]
    fn test_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = registry(&dir);
        assert_eq!(sessions.get("nope").unwrap_err().state, SqlState::NoCurrentConnection);
        assert!(sessions.is_empty());
    }
}
