//! Sequential readers and writers over a LOB.
//!
//! Readers are windows onto the current content, not snapshots: bytes written
//! after a reader was opened are returned if they fall inside its range.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use super::clob::write_chars;
use super::cell::{char_to_byte, is_char_start, utf8_width, LobCell, LobState};
use super::policy::LobOperation;
use crate::error::{LobError, LobResult};

/// Refill size of stream readers.
pub const STREAM_BUFFER: usize = 4096;

fn io_err(err: LobError) -> io::Error {
    err.into_io()
}

/// `std::io::Read` over a BLOB or a byte range of it.
#[derive(Debug)]
pub struct BlobReader {
    cell: Arc<LobCell>,
    /// Offset of the next byte to return.
    pos: u64,
    /// Exclusive end of the range; `None` reads to the current end.
    end: Option<u64>,
    buffer: Vec<u8>,
    buffer_at: usize,
    seen_update: u64,
}

impl BlobReader {
    pub(crate) fn open(cell: Arc<LobCell>, state: &mut LobState, start: u64, end: Option<u64>) -> Self {
        cell.stream_opened(state);
        Self {
            seen_update: state.update_count(),
            cell,
            pos: start,
            end,
            buffer: Vec::with_capacity(STREAM_BUFFER),
            buffer_at: 0,
        }
    }

    /// Bytes left in the range, or `None` for an unbounded reader.
    pub fn remaining(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.pos))
    }
}

impl Read for BlobReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let mut state = self.cell.access(LobOperation::StreamRead).map_err(io_err)?;
        if state.update_count() != self.seen_update {
            self.seen_update = state.update_count();
            self.buffer.clear();
            self.buffer_at = 0;
        }

        if self.buffer_at >= self.buffer.len() {
            let want = match self.end {
                Some(end) => end.saturating_sub(self.pos).min(STREAM_BUFFER as u64) as usize,
                None => STREAM_BUFFER,
            };
            if want == 0 {
                return Ok(0);
            }
            self.buffer.resize(want, 0);
            let storage = state.storage().map_err(io_err)?;
            let n = storage.read_at(self.pos, &mut self.buffer)?;
            self.buffer.truncate(n);
            self.buffer_at = 0;
            if n == 0 {
                return Ok(0);
            }
        }

        let n = out.len().min(self.buffer.len() - self.buffer_at);
        out[..n].copy_from_slice(&self.buffer[self.buffer_at..self.buffer_at + n]);
        self.buffer_at += n;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Drop for BlobReader {
    fn drop(&mut self) {
        self.cell.stream_closed();
    }
}

/// `std::io::Write` into a BLOB from a fixed start position.
#[derive(Debug)]
pub struct BlobWriter {
    cell: Arc<LobCell>,
    pos: u64,
}

impl BlobWriter {
    pub(crate) fn open(cell: Arc<LobCell>, state: &mut LobState, start: u64) -> Self {
        cell.stream_opened(state);
        Self { cell, pos: start }
    }

    /// 1-based position the next write goes to.
    pub fn position(&self) -> u64 {
        self.pos + 1
    }
}

impl Write for BlobWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.cell.access(LobOperation::StreamWrite).map_err(io_err)?;
        state.storage().map_err(io_err)?.write_at(self.pos, data)?;
        state.touch();
        self.pos += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        self.cell.stream_closed();
    }
}

/// `std::io::Read` producing the UTF-8 encoding of a CLOB or a character
/// range of it. A character is never split across the end of the range.
#[derive(Debug)]
pub struct ClobReader {
    cell: Arc<LobCell>,
    /// Characters handed to the caller, counted from the start of the CLOB.
    delivered: u64,
    /// Characters loaded from storage, including those still pending.
    fetched: u64,
    /// Storage offset just past the pending bytes; `None` when it must be
    /// derived again from `fetched`.
    byte_pos: Option<u64>,
    /// Exclusive end of the range in characters.
    end: Option<u64>,
    pending: Vec<u8>,
    pending_at: usize,
    seen_update: u64,
    stale: bool,
}

impl ClobReader {
    pub(crate) fn open(cell: Arc<LobCell>, state: &mut LobState, start: u64, end: Option<u64>) -> Self {
        cell.stream_opened(state);
        Self {
            seen_update: state.update_count(),
            cell,
            delivered: start,
            fetched: start,
            byte_pos: None,
            end,
            pending: Vec::new(),
            pending_at: 0,
            stale: false,
        }
    }

    fn refill(&mut self, state: &mut LobState) -> LobResult<()> {
        self.pending.clear();
        self.pending_at = 0;

        let limit = self.end.map(|end| end.saturating_sub(self.fetched));
        if limit == Some(0) {
            return Ok(());
        }

        let storage = state.storage()?;
        let byte_pos = match self.byte_pos {
            Some(pos) => pos,
            None => char_to_byte(storage, self.fetched)?,
        };
        let mut chunk = vec![0u8; STREAM_BUFFER];
        let n = storage.read_at(byte_pos, &mut chunk)?;

        let mut cut = 0;
        let mut chars = 0u64;
        while cut < n {
            if limit.map_or(false, |limit| chars >= limit) {
                break;
            }
            let width = utf8_width(chunk[cut]);
            if cut + width > n {
                break;
            }
            cut += width;
            chars += 1;
        }
        if cut == 0 && n > 0 && limit.map_or(true, |limit| limit > 0) {
            // A truncated sequence at the very end of the content.
            cut = n;
            chars = 1;
        }

        chunk.truncate(cut);
        self.pending = chunk;
        self.byte_pos = Some(byte_pos + cut as u64);
        self.fetched += chars;
        Ok(())
    }
}

impl Read for ClobReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let cell = Arc::clone(&self.cell);
        let mut state = cell.access(LobOperation::StreamRead).map_err(io_err)?;
        if state.update_count() != self.seen_update {
            self.seen_update = state.update_count();
            self.stale = true;
        }
        let at_boundary = self.pending_at >= self.pending.len()
            || is_char_start(self.pending[self.pending_at]);
        if self.stale && at_boundary {
            self.pending.clear();
            self.pending_at = 0;
            self.byte_pos = None;
            self.fetched = self.delivered;
            self.stale = false;
        }

        if self.pending_at >= self.pending.len() {
            self.refill(&mut state).map_err(io_err)?;
            if self.pending.is_empty() {
                return Ok(0);
            }
        }

        let n = out.len().min(self.pending.len() - self.pending_at);
        let slice = &self.pending[self.pending_at..self.pending_at + n];
        out[..n].copy_from_slice(slice);
        self.delivered += slice.iter().filter(|b| is_char_start(**b)).count() as u64;
        self.pending_at += n;
        Ok(n)
    }
}

impl Drop for ClobReader {
    fn drop(&mut self) {
        self.cell.stream_closed();
    }
}

/// Sequential character writer into a CLOB.
#[derive(Debug)]
pub struct ClobWriter {
    cell: Arc<LobCell>,
    /// 0-based character position of the next write.
    pos: u64,
}

impl ClobWriter {
    pub(crate) fn open(cell: Arc<LobCell>, state: &mut LobState, start: u64) -> Self {
        cell.stream_opened(state);
        Self { cell, pos: start }
    }

    /// 1-based position the next write goes to.
    pub fn position(&self) -> u64 {
        self.pos + 1
    }

    /// Writes `text` and returns the number of characters written.
    pub fn write_text(&mut self, text: &str) -> LobResult<usize> {
        let mut state = self.cell.access(LobOperation::StreamWrite)?;
        let written = write_chars(&mut state, self.pos, text)?;
        self.pos += written as u64;
        Ok(written)
    }
}

impl fmt::Write for ClobWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_text(s).map(drop).map_err(|_| fmt::Error)
    }
}

impl Drop for ClobWriter {
    fn drop(&mut self) {
        self.cell.stream_closed();
    }
}
