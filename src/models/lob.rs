//! LOB data models.

use serde::{Deserialize, Serialize};

use crate::session::LobHandle;

/// Description of a LOB for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobModel {
    pub id: String,
    pub kind: String,
    /// Length in bytes or characters; absent once freed.
    pub length: Option<u64>,
    /// `memory` or `file`; absent once the storage is released.
    pub storage: Option<String>,
    pub freed: bool,
}

impl LobModel {
    /// Describes `lob` without failing on a freed LOB.
    pub fn describe(lob: &LobHandle) -> Self {
        let freed = lob.is_freed();
        Self {
            id: lob.id().to_string(),
            kind: lob.kind().as_str().to_string(),
            length: if freed { None } else { lob.length().ok() },
            storage: lob.storage_kind().map(|k| k.as_str().to_string()),
            freed,
        }
    }
}

/// Result of a pattern search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionModel {
    pub start: i64,
    /// 1-based match position, or `None` when the pattern does not occur.
    pub position: Option<u64>,
}
