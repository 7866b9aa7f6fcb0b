//! The append-only file sink the table builder writes to.

use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A sequential, append-only byte sink.
///
/// The table builder owns its sink exclusively for the builder's lifetime
/// and never seeks: bytes appear in the file in exactly the order they were
/// appended.
pub trait WritableFile {
    /// Append `data` at the current end of the file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Push buffered bytes down to the underlying file.
    fn flush(&mut self) -> Result<()>;
}

/// A [`WritableFile`] over a buffered filesystem file.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self { writer: BufWriter::new(file) })
    }
}

impl WritableFile for FileSink {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory sink. Handy for byte-exact assertions in tests.
impl WritableFile for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
