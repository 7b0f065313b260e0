//! Byte-addressed backing media for the pager.
//!
//! The pager only ever reads and writes whole pages at page-aligned offsets,
//! so a backend needs positional reads/writes, a length and a sync point.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub trait PageBackend {
    /// Fill `buf` from `offset`. Bytes past the end of the medium read as zero.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write `buf` at `offset`, growing the medium if needed.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// Current length of the medium in bytes.
    fn len(&self) -> io::Result<u64>;

    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Make all previous writes durable.
    fn sync(&mut self) -> io::Result<()>;
}

/// A database file on disk.
pub struct FileBackend {
    file: File,
}

impl FileBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }
}

impl PageBackend for FileBackend {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if offset >= len {
            buf.fill(0);
            return Ok(());
        }
        let available = usize::try_from(len - offset).unwrap_or(usize::MAX);
        let to_read = buf.len().min(available);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf[..to_read])?;
        buf[to_read..].fill(0);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// A growable in-memory medium. Contents vanish when the pager is dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Vec<u8>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageBackend for MemoryBackend {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let offset = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflows usize"))?;
        if offset >= self.data.len() {
            buf.fill(0);
            return Ok(());
        }
        let to_read = buf.len().min(self.data.len() - offset);
        buf[..to_read].copy_from_slice(&self.data[offset..offset + to_read]);
        buf[to_read..].fill(0);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let offset = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflows usize"))?;
        let end = offset + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(buf);
        Ok(())
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory medium whose I/O can be switched to fail, for exercising the
/// `Io` error paths.
#[cfg(test)]
pub(crate) struct FaultyBackend {
    inner: MemoryBackend,
    fail: std::rc::Rc<std::cell::Cell<bool>>,
}

#[cfg(test)]
impl FaultyBackend {
    pub(crate) fn new(fail: std::rc::Rc<std::cell::Cell<bool>>) -> Self {
        Self {
            inner: MemoryBackend::new(),
            fail,
        }
    }

    fn check(&self) -> io::Result<()> {
        if self.fail.get() {
            return Err(io::Error::other("injected I/O fault"));
        }
        Ok(())
    }
}

#[cfg(test)]
impl PageBackend for FaultyBackend {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.check()?;
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.check()?;
        self.inner.write_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        self.inner.len()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.check()
    }
}
