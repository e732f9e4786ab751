//! Implementations of [`streamdb_common::Medium`]: a file-backed medium for
//! production use and an in-memory one for fast unit tests.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use streamdb_common::{Error, Medium, Result};

/// A [`Medium`] backed by a single on-disk file.
///
/// The file handle is wrapped in a mutex rather than relying on
/// platform-specific positioned I/O (`pread`/`pwrite`), matching the
/// teacher's `FilePager` — callers already serialize access through the
/// page cache lock, so this is never a contended path.
pub struct FileMedium {
    file: Mutex<File>,
}

impl FileMedium {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl Medium for FileMedium {
    fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn extend(&self, additional_bytes: u64) -> Result<()> {
        let mut file = self.file.lock();
        let current = file.metadata()?.len();
        file.set_len(current + additional_bytes)?;
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::ShortRead { offset, wanted: buf.len(), got: 0 }
            } else {
                Error::Io(e)
            }
        })
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}

/// An in-memory [`Medium`] for unit tests that need no filesystem fixture.
pub struct MemMedium {
    bytes: Mutex<Vec<u8>>,
}

impl MemMedium {
    pub fn new() -> Self {
        Self { bytes: Mutex::new(Vec::new()) }
    }
}

impl Default for MemMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl Medium for MemMedium {
    fn len(&self) -> Result<u64> {
        Ok(self.bytes.lock().len() as u64)
    }

    fn extend(&self, additional_bytes: u64) -> Result<()> {
        let mut bytes = self.bytes.lock();
        let new_len = bytes.len() + additional_bytes as usize;
        bytes.resize(new_len, 0);
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > bytes.len() {
            return Err(Error::ShortRead {
                offset,
                wanted: buf.len(),
                got: bytes.len().saturating_sub(start),
            });
        }
        buf.copy_from_slice(&bytes[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > bytes.len() {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
