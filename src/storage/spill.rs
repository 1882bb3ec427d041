//! Spill files for LOBs that outgrow memory.

use dashmap::DashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix of every spill file name, used to recognise our files in the directory.
const SPILL_PREFIX: &str = "lob-";

/// Copy buffer used when moving file ranges.
const COPY_CHUNK: usize = 8 * 1024;

/// Directory holding spill files, with a registry of the files still owned by
/// a live LOB.
#[derive(Debug)]
pub struct SpillDirectory {
    root: PathBuf,
    live: DashSet<PathBuf>,
}

impl SpillDirectory {
    /// Opens (creating if needed) the spill directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Arc<Self>> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Arc::new(Self {
            root,
            live: DashSet::new(),
        }))
    }

    /// Returns the directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a new, empty spill file registered as live.
    pub fn create_file(self: &Arc<Self>) -> io::Result<SpillFile> {
        let path = self
            .root
            .join(format!("{}{}", SPILL_PREFIX, Uuid::new_v4().simple()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        self.live.insert(path.clone());
        debug!("Created spill file {}", path.display());
        Ok(SpillFile {
            path,
            file,
            len: 0,
            directory: Arc::clone(self),
        })
    }

    /// Number of spill files currently owned by a LOB.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Returns whether `path` is owned by a live LOB.
    pub fn is_live(&self, path: &Path) -> bool {
        self.live.contains(path)
    }

    /// Deletes spill files in the directory that no live LOB owns.
    ///
    /// Returns the number of files removed.
    pub fn collect_orphans(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let is_spill = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(SPILL_PREFIX))
                .unwrap_or(false);
            if !is_spill || self.live.contains(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove orphaned spill file {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }

    fn release(&self, path: &Path) {
        self.live.remove(path);
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove spill file {}: {}", path.display(), e);
            }
        }
    }
}

/// A temporary file holding the content of one LOB. The file is deleted when
/// the value is dropped.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    file: File,
    len: u64,
    directory: Arc<SpillDirectory>,
}

impl SpillFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical length of the content in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads up to `buf.len()` bytes starting at `offset`. Returns 0 at or past
    /// the end of the content.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let count = (self.len - offset).min(buf.len() as u64) as usize;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf[..count])?;
        Ok(count)
    }

    /// Writes `data` at `offset`. A gap between the current end and `offset`
    /// reads back as zero bytes.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        if offset > self.len {
            self.file.set_len(offset)?;
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }

    /// Sets the logical length, truncating or zero-extending the file.
    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Replaces the bytes in `start..end` with `data`, shifting the tail.
    pub fn replace(&mut self, start: u64, end: u64, data: &[u8]) -> io::Result<()> {
        let removed = end - start;
        let inserted = data.len() as u64;
        let tail = self.len - end;
        if inserted > removed {
            self.move_range(end, start + inserted, tail)?;
        } else if inserted < removed {
            self.move_range(end, start + inserted, tail)?;
            self.set_len(start + inserted + tail)?;
        }
        self.write_at(start, data)
    }

    /// Moves `count` bytes from `src` to `dst`, copying in the direction that
    /// keeps overlapping ranges intact.
    fn move_range(&mut self, src: u64, dst: u64, count: u64) -> io::Result<()> {
        if count == 0 || src == dst {
            return Ok(());
        }
        let mut buffer = vec![0u8; COPY_CHUNK];
        if dst > src {
            let mut remaining = count;
            while remaining > 0 {
                let n = remaining.min(COPY_CHUNK as u64);
                let from = src + remaining - n;
                let to = dst + remaining - n;
                self.copy_chunk(from, to, &mut buffer[..n as usize])?;
                remaining -= n;
            }
        } else {
            let mut done = 0;
            while done < count {
                let n = (count - done).min(COPY_CHUNK as u64);
                self.copy_chunk(src + done, dst + done, &mut buffer[..n as usize])?;
                done += n;
            }
        }
        Ok(())
    }

    fn copy_chunk(&mut self, from: u64, to: u64, buffer: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(from))?;
        self.file.read_exact(buffer)?;
        self.file.seek(SeekFrom::Start(to))?;
        self.file.write_all(buffer)?;
        self.len = self.len.max(to + buffer.len() as u64);
        Ok(())
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        debug!("Releasing spill file {}", self.path.display());
        self.directory.release(&self.path);
    }
}
