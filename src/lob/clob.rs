//! Character large objects.
//!
//! Content is kept as UTF-8 in the same storage as a BLOB. Every position and
//! length on this type counts characters.

use std::sync::Arc;

use super::cell::{
    byte_to_char, char_to_byte, check_length, check_pos_and_length, check_position, find_bytes,
    LobCell, LobId, LobState,
};
use super::policy::LobOperation;
use super::stream::{ClobReader, ClobWriter};
use crate::error::{LobError, LobResult, SqlState};
use crate::storage::StorageKind;

/// Handle to a CLOB. Clones refer to the same value.
#[derive(Debug, Clone)]
pub struct Clob {
    cell: Arc<LobCell>,
}

impl Clob {
    pub(crate) fn from_cell(cell: Arc<LobCell>) -> Self {
        Self { cell }
    }

    pub fn id(&self) -> LobId {
        self.cell.id()
    }

    /// Length in characters.
    pub fn length(&self) -> LobResult<u64> {
        self.cell.access(LobOperation::Length)?.char_len()
    }

    /// Length of the UTF-8 encoding in bytes.
    pub fn byte_length(&self) -> LobResult<u64> {
        let mut state = self.cell.access(LobOperation::Length)?;
        Ok(state.storage()?.len())
    }

    /// Returns up to `len` characters starting at the 1-based `pos`.
    pub fn get_sub_string(&self, pos: i64, len: i64) -> LobResult<String> {
        let mut state = self.cell.access(LobOperation::GetBytes)?;
        let pos = check_position(pos)?;
        let len = check_length(len)?;
        let length = state.char_len()?;
        if pos > length + 1 {
            return Err(LobError::with_message(
                SqlState::PositionTooLarge,
                format!("Position {} exceeds the CLOB length {}.", pos, length),
            ));
        }
        let count = len.min(length - (pos - 1));
        read_chars(&mut state, pos - 1, count)
    }

    /// Copies the whole content.
    pub fn to_text(&self) -> LobResult<String> {
        let mut state = self.cell.access(LobOperation::GetBytes)?;
        let storage = state.storage()?;
        let len = storage.len() as usize;
        let bytes = storage.read_range(0, len)?;
        decode(bytes)
    }

    /// Reader producing the UTF-8 encoding of the whole CLOB.
    pub fn character_stream(&self) -> LobResult<ClobReader> {
        let mut state = self.cell.access(LobOperation::GetStream)?;
        state.storage()?;
        Ok(ClobReader::open(Arc::clone(&self.cell), &mut state, 0, None))
    }

    /// Reader producing exactly `len` characters starting at the 1-based `pos`.
    pub fn character_stream_range(&self, pos: i64, len: i64) -> LobResult<ClobReader> {
        let mut state = self.cell.access(LobOperation::GetStreamRange)?;
        let length = state.char_len()?;
        check_pos_and_length(pos, len, length)?;
        let start = pos as u64 - 1;
        Ok(ClobReader::open(
            Arc::clone(&self.cell),
            &mut state,
            start,
            Some(start + len as u64),
        ))
    }

    /// 1-based position of the first occurrence of `pattern` at or after
    /// `start`, or `None`.
    pub fn position(&self, pattern: &str, start: i64) -> LobResult<Option<u64>> {
        let mut state = self.cell.access(LobOperation::Position)?;
        let start = check_position(start)?;
        let length = state.char_len()?;
        if start > length + 1 {
            return Err(LobError::with_message(
                SqlState::PositionTooLarge,
                format!("Start {} exceeds the CLOB length {}.", start, length),
            ));
        }
        if pattern.is_empty() {
            return Ok(Some(start));
        }
        let storage = state.storage()?;
        let from = char_to_byte(storage, start - 1)?;
        match find_bytes(storage, pattern.as_bytes(), from)? {
            Some(at) => Ok(Some(byte_to_char(storage, at)? + 1)),
            None => Ok(None),
        }
    }

    /// Like [`Clob::position`], searching for the content of another CLOB.
    pub fn position_of(&self, pattern: &Clob, start: i64) -> LobResult<Option<u64>> {
        let pattern = pattern.to_text()?;
        self.position(&pattern, start)
    }

    /// Overwrites characters from the 1-based `pos` with `text`, extending the
    /// CLOB as needed. Returns the number of characters written.
    pub fn set_string(&self, pos: i64, text: &str) -> LobResult<usize> {
        let mut state = self.cell.access(LobOperation::SetBytes)?;
        let pos = check_position(pos)?;
        write_chars(&mut state, pos - 1, text)
    }

    /// Writes `len` characters of `text` starting at character `offset`.
    pub fn set_string_range(&self, pos: i64, text: &str, offset: i64, len: i64) -> LobResult<usize> {
        check_position(pos)?;
        let available = text.chars().count() as u64;
        if offset < 0 || offset as u64 > available {
            return Err(LobError::with_message(
                SqlState::InvalidOffset,
                format!("Offset {} is outside the {} character input.", offset, available),
            ));
        }
        let len = check_length(len)?;
        let offset = offset as u64;
        if offset + len > available {
            return Err(LobError::with_message(
                SqlState::SubstringOutOfRange,
                format!(
                    "Offset {} and length {} exceed the {} character input.",
                    offset, len, available
                ),
            ));
        }
        if len == 0 {
            return Ok(0);
        }
        let slice: String = text.chars().skip(offset as usize).take(len as usize).collect();
        self.set_string(pos, &slice)
    }

    /// Writer starting at the 1-based `pos`.
    pub fn character_writer(&self, pos: i64) -> LobResult<ClobWriter> {
        let mut state = self.cell.access(LobOperation::SetStream)?;
        let pos = check_position(pos)?;
        check_write_start(&mut state, pos - 1)?;
        Ok(ClobWriter::open(Arc::clone(&self.cell), &mut state, pos - 1))
    }

    /// Shrinks the CLOB to `len` characters.
    pub fn truncate(&self, len: i64) -> LobResult<()> {
        let mut state = self.cell.access(LobOperation::Truncate)?;
        let len = check_length(len)?;
        let length = state.char_len()?;
        if len > length {
            return Err(LobError::with_message(
                SqlState::LengthTooLong,
                format!("Length {} exceeds the CLOB length {}.", len, length),
            ));
        }
        let storage = state.storage()?;
        let cut = char_to_byte(storage, len)?;
        storage.truncate(cut)?;
        state.touch();
        state.set_char_len(len);
        Ok(())
    }

    /// Releases the CLOB. Safe to call more than once.
    pub fn free(&self) -> LobResult<()> {
        self.cell.access(LobOperation::Free).map(drop)?;
        self.cell.free();
        Ok(())
    }

    pub fn is_freed(&self) -> bool {
        self.cell.is_freed()
    }

    pub fn storage_kind(&self) -> Option<StorageKind> {
        self.cell.storage_kind()
    }

    pub fn is_file_backed(&self) -> bool {
        self.storage_kind() == Some(StorageKind::File)
    }
}

fn decode(bytes: Vec<u8>) -> LobResult<String> {
    String::from_utf8(bytes).map_err(|e| {
        LobError::with_message(
            SqlState::InternalError,
            format!("CLOB content is not valid UTF-8: {}", e),
        )
    })
}

fn read_chars(state: &mut LobState, start: u64, count: u64) -> LobResult<String> {
    let storage = state.storage()?;
    let from = char_to_byte(storage, start)?;
    let to = char_to_byte(storage, start + count)?;
    decode(storage.read_range(from, (to - from) as usize)?)
}

fn check_write_start(state: &mut LobState, start: u64) -> LobResult<u64> {
    let length = state.char_len()?;
    if start > length {
        return Err(LobError::with_message(
            SqlState::PositionTooLarge,
            format!("Position {} exceeds the CLOB length {}.", start + 1, length),
        ));
    }
    Ok(length)
}

/// Overwrites characters from the 0-based `start`. Shared with the writer.
pub(crate) fn write_chars(state: &mut LobState, start: u64, text: &str) -> LobResult<usize> {
    let length = check_write_start(state, start)?;
    let written = text.chars().count() as u64;
    let replaced_end = (start + written).min(length);
    let storage = state.storage()?;
    let from = char_to_byte(storage, start)?;
    let to = char_to_byte(storage, replaced_end)?;
    storage.replace(from, to, text.as_bytes())?;
    state.touch();
    state.set_char_len(length.max(start + written));
    Ok(written as usize)
}
