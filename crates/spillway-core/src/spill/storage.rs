//! External storage for spilled segments.
//!
//! Spill storage is only ever seen through byte streams: a list asks the
//! storage for a [`SegmentWriter`], writes encoded tuples into it, and seals
//! it into a [`SegmentHandle`] it can reopen for reading. Dropping the last
//! handle releases the segment; dropping an unfinished writer discards it.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Buf, Bytes};
use tempfile::{NamedTempFile, TempPath};

/// Creates spill segments.
pub trait SpillStorage: Send + Sync + fmt::Debug {
    /// Opens a new, empty segment for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot allocate a segment.
    fn create(&self) -> io::Result<Box<dyn SegmentWriter>>;
}

/// Write side of a segment under construction.
pub trait SegmentWriter: Write + Send {
    /// Flushes and seals the segment.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered bytes cannot be made durable.
    fn finish(self: Box<Self>) -> io::Result<Arc<dyn SegmentHandle>>;
}

/// A sealed segment that can be read any number of times.
pub trait SegmentHandle: Send + Sync + fmt::Debug {
    /// Opens a fresh reader positioned at the start of the segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be opened.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Size of the segment in bytes.
    fn byte_len(&self) -> u64;
}

/// Stores segments as temporary files in a directory.
///
/// Files are deleted when their handle drops, and also when a write fails
/// before the segment is sealed.
#[derive(Debug, Clone)]
pub struct FileSpillStorage {
    dir: PathBuf,
    prefix: String,
}

impl FileSpillStorage {
    /// Stores segments under `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: "spill-".to_string(),
        })
    }

    /// Stores segments in the system temporary directory.
    #[must_use]
    pub fn in_temp_dir() -> Self {
        Self {
            dir: std::env::temp_dir(),
            prefix: "spill-".to_string(),
        }
    }

    /// Sets the file name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns the directory segments are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SpillStorage for FileSpillStorage {
    fn create(&self) -> io::Result<Box<dyn SegmentWriter>> {
        let file = tempfile::Builder::new()
            .prefix(&self.prefix)
            .suffix(".seg")
            .tempfile_in(&self.dir)?;
        Ok(Box::new(FileSegmentWriter {
            writer: BufWriter::new(file),
            written: 0,
        }))
    }
}

struct FileSegmentWriter {
    writer: BufWriter<NamedTempFile>,
    written: u64,
}

impl Write for FileSegmentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl SegmentWriter for FileSegmentWriter {
    fn finish(self: Box<Self>) -> io::Result<Arc<dyn SegmentHandle>> {
        let Self { writer, written } = *self;
        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.as_file().sync_data()?;
        Ok(Arc::new(FileSegment {
            path: file.into_temp_path(),
            len: written,
        }))
    }
}

struct FileSegment {
    path: TempPath,
    len: u64,
}

impl SegmentHandle for FileSegment {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn byte_len(&self) -> u64 {
        self.len
    }
}

impl fmt::Debug for FileSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSegment")
            .field("path", &self.path.display())
            .field("len", &self.len)
            .finish()
    }
}

/// Keeps segments in memory.
///
/// Useful for tests and for executions that only need the spill format, not
/// the memory relief. Tracks how many sealed segments are alive.
#[derive(Debug, Clone, Default)]
pub struct MemorySpillStorage {
    live: Arc<AtomicUsize>,
}

impl MemorySpillStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sealed segments not yet released.
    #[must_use]
    pub fn live_segments(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl SpillStorage for MemorySpillStorage {
    fn create(&self) -> io::Result<Box<dyn SegmentWriter>> {
        Ok(Box::new(MemorySegmentWriter {
            buf: Vec::new(),
            live: Arc::clone(&self.live),
        }))
    }
}

struct MemorySegmentWriter {
    buf: Vec<u8>,
    live: Arc<AtomicUsize>,
}

impl Write for MemorySegmentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SegmentWriter for MemorySegmentWriter {
    fn finish(self: Box<Self>) -> io::Result<Arc<dyn SegmentHandle>> {
        let Self { buf, live } = *self;
        live.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(MemorySegment {
            data: Bytes::from(buf),
            live,
        }))
    }
}

struct MemorySegment {
    data: Bytes,
    live: Arc<AtomicUsize>,
}

impl SegmentHandle for MemorySegment {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(self.data.clone().reader()))
    }

    fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }
}

impl Drop for MemorySegment {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySegment")
            .field("len", &self.data.len())
            .finish()
    }
}
