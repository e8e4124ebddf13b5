//! Little-endian primitives shared by the on-disk formats.

use std::io::{self, Read, Write};

/// Read a little-endian `u8` array of fixed width.
pub fn read_array<R: Read, const N: usize>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a little-endian `u32`.
pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    read_array::<R, 4>(reader).map(u32::from_le_bytes)
}

/// Read a little-endian `u64`.
pub fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    read_array::<R, 8>(reader).map(u64::from_le_bytes)
}

/// Write a little-endian `u32`.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Write a little-endian `u64`.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Whether an I/O error means the input ended before a declared length.
pub fn is_short_read(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::UnexpectedEof
}

/// Writer adapter that feeds every byte written into a blake3 hasher.
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
        }
    }

    /// Digest of everything written so far, plus the inner writer.
    pub fn finish(self) -> (blake3::Hash, W) {
        (self.hasher.finalize(), self.inner)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader adapter that feeds every byte read into a blake3 hasher.
#[derive(Debug)]
pub struct HashingReader<R> {
    inner: R,
    hasher: blake3::Hasher,
}

impl<R: Read> HashingReader<R> {
    /// Wrap `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
        }
    }

    /// Digest of everything read so far, plus the inner reader.
    pub fn finish(self) -> (blake3::Hash, R) {
        (self.hasher.finalize(), self.inner)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        Ok(read)
    }
}
