//! Session-level data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Snapshot of a session for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionModel {
    pub id: String,
    pub isolation: String,
    /// Active transaction, if any.
    pub transaction: Option<u64>,
    pub lob_count: usize,
    pub created: DateTime<Utc>,
}

impl SessionModel {
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            isolation: session.isolation().as_str().to_string(),
            transaction: session.txn_id(),
            lob_count: session.lob_count(),
            created: session.created,
        }
    }
}
