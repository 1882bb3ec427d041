//! LOB content storage with a one-way switch from memory to a spill file.

use std::io;
use std::sync::Arc;
use tracing::debug;

use super::spill::{SpillDirectory, SpillFile};

/// Where the bytes of a LOB currently live.
#[derive(Debug)]
pub enum Backing {
    InMemory(Vec<u8>),
    FileBacked(SpillFile),
}

/// Kind of backing, for diagnostics and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    File,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::File => "file",
        }
    }
}

/// Byte storage of a single LOB.
///
/// Content starts in memory and moves to a spill file the first time its size
/// would exceed `threshold`. The move copies the existing bytes into a fresh
/// file and only then replaces the in-memory buffer, so a failed spill leaves
/// the content untouched. There is no move back.
#[derive(Debug)]
pub struct LobStorage {
    backing: Backing,
    threshold: usize,
    spill: Arc<SpillDirectory>,
}

impl LobStorage {
    pub fn new(spill: Arc<SpillDirectory>, threshold: usize) -> Self {
        Self {
            backing: Backing::InMemory(Vec::new()),
            threshold,
            spill,
        }
    }

    /// Creates storage pre-populated with `data`.
    pub fn from_bytes(spill: Arc<SpillDirectory>, threshold: usize, data: &[u8]) -> io::Result<Self> {
        let mut storage = Self::new(spill, threshold);
        storage.write_at(0, data)?;
        Ok(storage)
    }

    pub fn len(&self) -> u64 {
        match &self.backing {
            Backing::InMemory(buf) => buf.len() as u64,
            Backing::FileBacked(file) => file.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> StorageKind {
        match self.backing {
            Backing::InMemory(_) => StorageKind::Memory,
            Backing::FileBacked(_) => StorageKind::File,
        }
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    /// Reads up to `buf.len()` bytes from `offset`. Returns 0 at end of content.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::InMemory(data) => {
                if offset >= data.len() as u64 {
                    return Ok(0);
                }
                let start = offset as usize;
                let count = (data.len() - start).min(buf.len());
                buf[..count].copy_from_slice(&data[start..start + count]);
                Ok(count)
            }
            Backing::FileBacked(file) => file.read_at(offset, buf),
        }
    }

    /// Reads the whole `offset..offset + count` range, or less if the content
    /// ends first.
    pub fn read_range(&mut self, offset: u64, count: usize) -> io::Result<Vec<u8>> {
        let available = self.len().saturating_sub(offset).min(count as u64) as usize;
        let mut out = vec![0u8; available];
        let mut filled = 0;
        while filled < available {
            let n = self.read_at(offset + filled as u64, &mut out[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out.truncate(filled);
        Ok(out)
    }

    /// Writes `data` at `offset`, zero-filling any gap past the current end.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let new_len = self.len().max(offset + data.len() as u64);
        self.ensure_capacity(new_len)?;
        match &mut self.backing {
            Backing::InMemory(buf) => {
                let start = offset as usize;
                let end = start + data.len();
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[start..end].copy_from_slice(data);
                Ok(())
            }
            Backing::FileBacked(file) => file.write_at(offset, data),
        }
    }

    /// Replaces `start..end` with `data`, shifting whatever follows.
    pub fn replace(&mut self, start: u64, end: u64, data: &[u8]) -> io::Result<()> {
        let new_len = self.len() - (end - start) + data.len() as u64;
        self.ensure_capacity(new_len)?;
        match &mut self.backing {
            Backing::InMemory(buf) => {
                buf.splice(start as usize..end as usize, data.iter().copied());
                Ok(())
            }
            Backing::FileBacked(file) => file.replace(start, end, data),
        }
    }

    /// Shrinks the content to `len` bytes. The backing kind is kept.
    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        if len >= self.len() {
            return Ok(());
        }
        match &mut self.backing {
            Backing::InMemory(buf) => {
                buf.truncate(len as usize);
                Ok(())
            }
            Backing::FileBacked(file) => file.set_len(len),
        }
    }

    fn ensure_capacity(&mut self, new_len: u64) -> io::Result<()> {
        if let Backing::InMemory(buf) = &self.backing {
            if new_len > self.threshold as u64 {
                let mut file = self.spill.create_file()?;
                file.write_at(0, buf)?;
                debug!(
                    "Spilled LOB content of {} bytes to {} (target length {})",
                    buf.len(),
                    file.path().display(),
                    new_len
                );
                self.backing = Backing::FileBacked(file);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(threshold: usize) -> (tempfile::TempDir, LobStorage) {
        let dir = tempfile::tempdir().unwrap();
        let spill = SpillDirectory::open(dir.path()).unwrap();
        (dir, LobStorage::new(spill, threshold))
    }

    #[test]
    fn test_spills_once_threshold_is_crossed() {
        let (_dir, mut storage) = storage(16);
        storage.write_at(0, &[1u8; 16]).unwrap();
        assert_eq!(storage.kind(), StorageKind::Memory);

        storage.write_at(16, &[2u8]).unwrap();
        assert_eq!(storage.kind(), StorageKind::File);
        assert_eq!(storage.len(), 17);

        let data = storage.read_range(0, 64).unwrap();
        assert_eq!(&data[..16], &[1u8; 16]);
        assert_eq!(data[16], 2);
    }

    #[test]
    fn test_truncate_never_moves_back_to_memory() {
        let (_dir, mut storage) = storage(8);
        storage.write_at(0, &[7u8; 32]).unwrap();
        storage.truncate(2).unwrap();
        assert_eq!(storage.kind(), StorageKind::File);
        assert_eq!(storage.read_range(0, 10).unwrap(), vec![7u8, 7u8]);
    }

    #[test]
    fn test_failed_spill_keeps_memory_content() {
        let dir = tempfile::tempdir().unwrap();
        let spill = SpillDirectory::open(dir.path().join("spill")).unwrap();
        let mut storage = LobStorage::new(spill, 4);
        storage.write_at(0, b"abcd").unwrap();

        // Remove the spill directory so creating the file fails.
        std::fs::remove_dir_all(dir.path().join("spill")).unwrap();
        assert!(storage.write_at(4, b"e").is_err());
        assert_eq!(storage.kind(), StorageKind::Memory);
        assert_eq!(storage.read_range(0, 10).unwrap(), b"abcd".to_vec());
    }

    #[test]
    fn test_replace_in_memory_and_on_file() {
        for threshold in [1024, 4] {
            let (_dir, mut storage) = storage(threshold);
            storage.write_at(0, b"one two three").unwrap();
            storage.replace(4, 7, b"2").unwrap();
            assert_eq!(storage.read_range(0, 64).unwrap(), b"one 2 three".to_vec());
        }
    }
}
