//! Reader and writer wrappers that track the stream position.

use std::io::{Read, Result, Write};

/// A reader wrapper that counts bytes consumed through it.
pub struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// A writer wrapper that counts bytes written through it.
pub struct CountingWriter<W> {
    inner: W,
    bytes_written: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    /// Get the total number of bytes written through this writer.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_writer() {
        let mut buf = Vec::new();
        let mut writer = CountingWriter::new(&mut buf);

        writer.write_all(b"hello").unwrap();
        assert_eq!(writer.bytes_written(), 5);

        writer.write_all(b" world").unwrap();
        assert_eq!(writer.bytes_written(), 11);

        writer.flush().unwrap();
        assert_eq!(writer.into_inner(), b"hello world");
    }

    #[test]
    fn test_counting_reader() {
        let mut reader = CountingReader::new(&b"hello world"[..]);
        let mut buf = [0u8; 5];

        reader.read_exact(&mut buf).unwrap();
        assert_eq!(reader.position(), 5);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(reader.position(), 11);
        assert_eq!(rest, b" world");
    }

    #[test]
    fn test_counting_reader_short_read() {
        let mut reader = CountingReader::new(&b"abc"[..]);
        let mut buf = [0u8; 8];

        assert!(reader.read_exact(&mut buf).is_err());
        assert_eq!(reader.position(), 3);
    }
}
