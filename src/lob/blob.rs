//! Binary large objects.

use bytes::Bytes;
use std::sync::Arc;

use super::cell::{check_length, check_pos_and_length, check_position, find_bytes, LobCell, LobId};
use super::policy::LobOperation;
use super::stream::{BlobReader, BlobWriter};
use crate::error::{LobError, LobResult, SqlState};
use crate::storage::StorageKind;

/// Handle to a BLOB. Clones refer to the same value.
#[derive(Debug, Clone)]
pub struct Blob {
    cell: Arc<LobCell>,
}

impl Blob {
    pub(crate) fn from_cell(cell: Arc<LobCell>) -> Self {
        Self { cell }
    }

    pub fn id(&self) -> LobId {
        self.cell.id()
    }

    /// Length in bytes.
    pub fn length(&self) -> LobResult<u64> {
        let mut state = self.cell.access(LobOperation::Length)?;
        Ok(state.storage()?.len())
    }

    /// Returns up to `len` bytes starting at the 1-based `pos`.
    pub fn get_bytes(&self, pos: i64, len: i64) -> LobResult<Vec<u8>> {
        let mut state = self.cell.access(LobOperation::GetBytes)?;
        let pos = check_position(pos)?;
        let len = check_length(len)?;
        let storage = state.storage()?;
        if pos > storage.len() + 1 {
            return Err(LobError::with_message(
                SqlState::PositionTooLarge,
                format!("Position {} exceeds the BLOB length {}.", pos, storage.len()),
            ));
        }
        let count = len.min(storage.len() - (pos - 1));
        Ok(storage.read_range(pos - 1, count as usize)?)
    }

    /// Copies the whole content.
    pub fn to_bytes(&self) -> LobResult<Bytes> {
        let mut state = self.cell.access(LobOperation::GetBytes)?;
        let storage = state.storage()?;
        let len = storage.len() as usize;
        Ok(Bytes::from(storage.read_range(0, len)?))
    }

    /// Reader over the whole BLOB, including bytes written after it was opened.
    pub fn binary_stream(&self) -> LobResult<BlobReader> {
        let mut state = self.cell.access(LobOperation::GetStream)?;
        state.storage()?;
        Ok(BlobReader::open(Arc::clone(&self.cell), &mut state, 0, None))
    }

    /// Reader over exactly `len` bytes starting at the 1-based `pos`.
    pub fn binary_stream_range(&self, pos: i64, len: i64) -> LobResult<BlobReader> {
        let mut state = self.cell.access(LobOperation::GetStreamRange)?;
        let length = state.storage()?.len();
        check_pos_and_length(pos, len, length)?;
        let start = pos as u64 - 1;
        Ok(BlobReader::open(
            Arc::clone(&self.cell),
            &mut state,
            start,
            Some(start + len as u64),
        ))
    }

    /// 1-based position of the first occurrence of `pattern` at or after
    /// `start`, or `None`.
    pub fn position(&self, pattern: &[u8], start: i64) -> LobResult<Option<u64>> {
        let mut state = self.cell.access(LobOperation::Position)?;
        let start = check_position(start)?;
        if pattern.is_empty() {
            return Ok(Some(start));
        }
        let storage = state.storage()?;
        if start > storage.len() {
            return Ok(None);
        }
        Ok(find_bytes(storage, pattern, start - 1)?.map(|i| i + 1))
    }

    /// Like [`Blob::position`], searching for the content of another BLOB.
    pub fn position_of(&self, pattern: &Blob, start: i64) -> LobResult<Option<u64>> {
        let pattern = pattern.to_bytes()?;
        self.position(&pattern, start)
    }

    /// Writes `data` at the 1-based `pos` and returns the number of bytes
    /// written. Writing past the end leaves a zero-filled gap.
    pub fn set_bytes(&self, pos: i64, data: &[u8]) -> LobResult<usize> {
        let mut state = self.cell.access(LobOperation::SetBytes)?;
        let pos = check_position(pos)?;
        state.storage()?.write_at(pos - 1, data)?;
        state.touch();
        Ok(data.len())
    }

    /// Writes `len` bytes of `data` starting at `offset`.
    pub fn set_bytes_range(&self, pos: i64, data: &[u8], offset: i64, len: i64) -> LobResult<usize> {
        check_position(pos)?;
        if offset < 0 || offset as u64 > data.len() as u64 {
            return Err(LobError::with_message(
                SqlState::InvalidOffset,
                format!("Offset {} is outside the {} byte input.", offset, data.len()),
            ));
        }
        let len = check_length(len)?;
        let offset = offset as usize;
        if len > (data.len() - offset) as u64 {
            return Err(LobError::with_message(
                SqlState::LengthTooLong,
                format!(
                    "Length {} exceeds the {} bytes available after offset {}.",
                    len,
                    data.len() - offset,
                    offset
                ),
            ));
        }
        if len == 0 {
            return Ok(0);
        }
        self.set_bytes(pos, &data[offset..offset + len as usize])
    }

    /// Writer starting at the 1-based `pos`.
    pub fn binary_writer(&self, pos: i64) -> LobResult<BlobWriter> {
        let mut state = self.cell.access(LobOperation::SetStream)?;
        let pos = check_position(pos)?;
        state.storage()?;
        Ok(BlobWriter::open(Arc::clone(&self.cell), &mut state, pos - 1))
    }

    /// Shrinks the BLOB to `len` bytes.
    pub fn truncate(&self, len: i64) -> LobResult<()> {
        let mut state = self.cell.access(LobOperation::Truncate)?;
        let len = check_length(len)?;
        let storage = state.storage()?;
        if len > storage.len() {
            return Err(LobError::with_message(
                SqlState::LengthTooLong,
                format!("Length {} exceeds the BLOB length {}.", len, storage.len()),
            ));
        }
        storage.truncate(len)?;
        state.touch();
        Ok(())
    }

    /// Releases the BLOB. Safe to call more than once.
    pub fn free(&self) -> LobResult<()> {
        self.cell.access(LobOperation::Free).map(drop)?;
        self.cell.free();
        Ok(())
    }

    pub fn is_freed(&self) -> bool {
        self.cell.is_freed()
    }

    /// Current storage kind, or `None` once the storage has been released.
    pub fn storage_kind(&self) -> Option<StorageKind> {
        self.cell.storage_kind()
    }

    pub fn is_file_backed(&self) -> bool {
        self.storage_kind() == Some(StorageKind::File)
    }
}
