//! Little-endian primitives shared by the table file formats.
//!
//! Every table file ends with a CRC32 of all preceding bytes.

use crate::error::{TableError, TableResult};

/// Append-only little-endian encoder.
#[derive(Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Length-prefixed byte block.
    pub fn block(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.bytes(v);
    }

    /// Finish the buffer, appending the CRC32 trailer.
    pub fn finish_with_crc(mut self) -> Vec<u8> {
        let crc = crc32fast::hash(&self.buf);
        self.u32(crc);
        self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an in-memory table image.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> TableResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(TableError::Truncated(self.pos))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> TableResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> TableResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> TableResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f64(&mut self) -> TableResult<f64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(f64::from_le_bytes(arr))
    }

    pub fn bytes(&mut self, n: usize) -> TableResult<&'a [u8]> {
        self.take(n)
    }

    pub fn block(&mut self) -> TableResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

/// Split off and verify the CRC32 trailer, returning the body.
pub(crate) fn verify_crc(image: &[u8]) -> TableResult<&[u8]> {
    if image.len() < 4 {
        return Err(TableError::Truncated(image.len()));
    }
    let (body, trailer) = image.split_at(image.len() - 4);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(TableError::Checksum { stored, computed });
    }
    Ok(body)
}

/// Check magic and version at the head of a table body.
pub(crate) fn read_preamble(
    reader: &mut ByteReader<'_>,
    magic: &'static [u8; 4],
    expected: &'static str,
    version: u32,
) -> TableResult<()> {
    if reader.bytes(4)? != magic {
        return Err(TableError::InvalidMagic { expected });
    }
    let found = reader.u32()?;
    if found != version {
        return Err(TableError::UnsupportedVersion(found));
    }
    Ok(())
}
