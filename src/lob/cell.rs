//! State shared by every handle and stream of one LOB.

use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::debug;

use super::policy::{AfterFree, FreePolicy, LobOperation};
use crate::error::{LobError, LobResult, SqlState};
use crate::storage::{LobStorage, StorageKind};
use crate::txn::{LockGroup, RowLockManager, TxnId};

/// Size of the chunks used when scanning LOB content.
pub(crate) const SCAN_CHUNK: usize = 8 * 1024;

/// LOB identifier, unique for the lifetime of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LobId(pub u64);

impl fmt::Display for LobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lob-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobKind {
    Blob,
    Clob,
}

impl LobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LobKind::Blob => "blob",
            LobKind::Clob => "clob",
        }
    }
}

/// Row lock held on behalf of a fetched LOB.
#[derive(Debug)]
pub(crate) struct LockBinding {
    pub locks: Arc<RowLockManager>,
    pub group: LockGroup,
}

#[derive(Debug)]
pub(crate) struct LobState {
    storage: Option<LobStorage>,
    freed: bool,
    /// Bumped on every mutation so readers can drop stale buffers.
    update_count: u64,
    open_streams: usize,
    /// Cached CLOB length in characters.
    char_len: Option<u64>,
}

impl LobState {
    pub fn storage(&mut self) -> LobResult<&mut LobStorage> {
        self.storage
            .as_mut()
            .ok_or_else(|| LobError::new(SqlState::LobObjectInvalid))
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Records a mutation.
    pub fn touch(&mut self) {
        self.update_count += 1;
        self.char_len = None;
    }

    pub fn set_char_len(&mut self, len: u64) {
        self.char_len = Some(len);
    }

    /// Length of UTF-8 content in characters.
    pub fn char_len(&mut self) -> LobResult<u64> {
        if let Some(len) = self.char_len {
            return Ok(len);
        }
        let len = count_chars(self.storage()?)?;
        self.char_len = Some(len);
        Ok(len)
    }
}

/// One LOB: its content, lifecycle flag and row-lock binding.
#[derive(Debug)]
pub(crate) struct LobCell {
    id: LobId,
    kind: LobKind,
    txn: TxnId,
    policy: FreePolicy,
    state: Mutex<LobState>,
    binding: Mutex<Option<LockBinding>>,
}

impl LobCell {
    pub fn new(id: LobId, kind: LobKind, txn: TxnId, policy: FreePolicy, storage: LobStorage) -> Self {
        Self {
            id,
            kind,
            txn,
            policy,
            state: Mutex::new(LobState {
                storage: Some(storage),
                freed: false,
                update_count: 0,
                open_streams: 0,
                char_len: None,
            }),
            binding: Mutex::new(None),
        }
    }

    pub fn id(&self) -> LobId {
        self.id
    }

    pub fn bind(&self, binding: LockBinding) {
        *self.binding.lock() = Some(binding);
    }

    /// Locks the state for `op`, failing with `XJ215` if the LOB is freed and
    /// the policy rejects `op`.
    pub fn access(&self, op: LobOperation) -> LobResult<MutexGuard<'_, LobState>> {
        let state = self.state.lock();
        if !self.policy.allows(op, state.freed) {
            return Err(LobError::with_message(
                SqlState::LobObjectInvalid,
                format!("{} is freed; {} is not allowed.", self.id, op),
            ));
        }
        Ok(state)
    }

    pub fn is_freed(&self) -> bool {
        self.state.lock().freed
    }

    pub fn storage_kind(&self) -> Option<StorageKind> {
        self.state.lock().storage.as_ref().map(|s| s.kind())
    }

    /// Marks the LOB freed and releases its resources. Calling it again is a
    /// no-op.
    pub fn free(&self) {
        {
            let mut state = self.state.lock();
            if state.freed {
                return;
            }
            state.freed = true;
            let streams_survive = self.policy.after_free(LobOperation::StreamRead) == AfterFree::Permit
                || self.policy.after_free(LobOperation::StreamWrite) == AfterFree::Permit;
            if state.open_streams == 0 || !streams_survive {
                state.storage = None;
            }
            debug!(
                "Freed {} {} ({} open streams, storage {})",
                self.kind.as_str(),
                self.id,
                state.open_streams,
                if state.storage.is_some() { "kept" } else { "released" }
            );
        }

        if let Some(binding) = self.binding.lock().take() {
            if let LockGroup::Lob(_) = binding.group {
                let released = binding.locks.release_group(self.txn, binding.group);
                debug!("Released {} row locks held by {}", released, self.id);
            }
        }
    }

    pub fn stream_opened(&self, state: &mut LobState) {
        state.open_streams += 1;
    }

    pub fn stream_closed(&self) {
        let mut state = self.state.lock();
        state.open_streams = state.open_streams.saturating_sub(1);
        if state.freed && state.open_streams == 0 && state.storage.is_some() {
            state.storage = None;
            debug!("Released storage of {} after its last stream closed", self.id);
        }
    }
}

/// Validates a 1-based sub-range request against a LOB of `length` units.
pub fn check_pos_and_length(pos: i64, len: i64, length: u64) -> LobResult<()> {
    if pos <= 0 {
        return Err(LobError::with_message(
            SqlState::BadPosition,
            format!("Invalid position {}; the first position is 1.", pos),
        ));
    }
    if len < 0 {
        return Err(LobError::with_message(
            SqlState::NegativeLength,
            format!("Negative length {}.", len),
        ));
    }
    let pos = pos as u64;
    if pos > length + 1 || (pos - 1).saturating_add(len as u64) > length {
        return Err(LobError::with_message(
            SqlState::PosAndLengthGreaterThanLob,
            format!(
                "Position {} and length {} exceed the LOB length {}.",
                pos, len, length
            ),
        ));
    }
    Ok(())
}

pub(crate) fn check_position(pos: i64) -> LobResult<u64> {
    if pos < 1 {
        return Err(LobError::with_message(
            SqlState::BadPosition,
            format!("Invalid position {}; the first position is 1.", pos),
        ));
    }
    Ok(pos as u64)
}

pub(crate) fn check_length(len: i64) -> LobResult<u64> {
    if len < 0 {
        return Err(LobError::with_message(
            SqlState::NegativeLength,
            format!("Negative length {}.", len),
        ));
    }
    Ok(len as u64)
}

/// Byte offset of the first occurrence of `pattern` at or after `from`.
pub(crate) fn find_bytes(storage: &mut LobStorage, pattern: &[u8], from: u64) -> io::Result<Option<u64>> {
    if pattern.is_empty() {
        return Ok(Some(from));
    }
    let len = storage.len();
    let step = SCAN_CHUNK.max(pattern.len());
    let mut window_start = from;
    while window_start + pattern.len() as u64 <= len {
        // Overlap windows so a match across a chunk border is still seen.
        let window = storage.read_range(window_start, step + pattern.len() - 1)?;
        if let Some(i) = window.windows(pattern.len()).position(|w| w == pattern) {
            return Ok(Some(window_start + i as u64));
        }
        window_start += step as u64;
    }
    Ok(None)
}

pub(crate) fn is_char_start(b: u8) -> bool {
    b & 0xC0 != 0x80
}

/// Width of a UTF-8 sequence from its leading byte.
pub(crate) fn utf8_width(b: u8) -> usize {
    match b {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

fn count_chars(storage: &mut LobStorage) -> io::Result<u64> {
    let mut count = 0u64;
    let mut offset = 0u64;
    let mut buf = vec![0u8; SCAN_CHUNK];
    loop {
        let n = storage.read_at(offset, &mut buf)?;
        if n == 0 {
            return Ok(count);
        }
        count += buf[..n].iter().filter(|b| is_char_start(**b)).count() as u64;
        offset += n as u64;
    }
}

/// Byte offset where character `chars` (0-based) starts, or the content length
/// when `chars` is at or past the end.
pub(crate) fn char_to_byte(storage: &mut LobStorage, chars: u64) -> io::Result<u64> {
    if chars == 0 {
        return Ok(0);
    }
    let mut seen = 0u64;
    let mut offset = 0u64;
    let mut buf = vec![0u8; SCAN_CHUNK];
    loop {
        let n = storage.read_at(offset, &mut buf)?;
        if n == 0 {
            return Ok(offset);
        }
        for (i, b) in buf[..n].iter().enumerate() {
            if is_char_start(*b) {
                if seen == chars {
                    return Ok(offset + i as u64);
                }
                seen += 1;
            }
        }
        offset += n as u64;
    }
}

/// Number of characters in the first `bytes` bytes.
pub(crate) fn byte_to_char(storage: &mut LobStorage, bytes: u64) -> io::Result<u64> {
    let mut count = 0u64;
    let mut offset = 0u64;
    let mut buf = vec![0u8; SCAN_CHUNK];
    while offset < bytes {
        let want = ((bytes - offset) as usize).min(SCAN_CHUNK);
        let n = storage.read_at(offset, &mut buf[..want])?;
        if n == 0 {
            break;
        }
        count += buf[..n].iter().filter(|b| is_char_start(**b)).count() as u64;
        offset += n as u64;
    }
    Ok(count)
}
