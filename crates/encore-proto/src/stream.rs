//! Little-endian primitive codec for RMC parameters.
//!
//! [`StreamReader`] borrows its input and never panics: every read checks the
//! remaining length first and reports [`ProtocolError::UnexpectedEof`].
//! [`StreamWriter`] grows a `BytesMut` and is infallible.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// A value with a fixed wire layout built from stream primitives.
pub trait Structure: Sized {
    /// Append the wire form of `self`.
    fn write_to(&self, writer: &mut StreamWriter);

    /// Read one value.
    fn read_from(reader: &mut StreamReader<'_>) -> Result<Self>;
}

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct StreamReader<'a> {
    buf: &'a [u8],
}

impl<'a> StreamReader<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(ProtocolError::UnexpectedEof { needed, remaining: self.buf.len() });
        }
        Ok(())
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a boolean encoded as one byte.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Borrow every remaining byte.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.buf = &[];
        rest
    }

    /// Read a u16-length, NUL-terminated string.
    ///
    /// A zero length is accepted as the empty string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        if len == 0 {
            return Ok(String::new());
        }

        let raw = self.read_bytes(len)?;
        let text = match raw.split_last() {
            Some((0, text)) => text,
            _ => return Err(ProtocolError::InvalidString("missing NUL terminator".to_string())),
        };

        String::from_utf8(text.to_vec()).map_err(|e| ProtocolError::InvalidString(e.to_string()))
    }

    /// Read a u32-length byte buffer.
    pub fn read_buffer(&mut self) -> Result<Bytes> {
        let len = self.read_u32()? as usize;
        Ok(Bytes::copy_from_slice(self.read_bytes(len)?))
    }

    /// Read a u16-length byte buffer.
    pub fn read_qbuffer(&mut self) -> Result<Bytes> {
        let len = self.read_u16()? as usize;
        Ok(Bytes::copy_from_slice(self.read_bytes(len)?))
    }

    /// Read a u32-count list, decoding each element with `read`.
    pub fn read_list<T>(&mut self, mut read: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.read_u32()? as usize;

        // Every element occupies at least one byte
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(read(self)?);
        }
        Ok(items)
    }

    /// Read a list of u32 values.
    pub fn read_u32_list(&mut self) -> Result<Vec<u32>> {
        self.read_list(Self::read_u32)
    }

    /// Read a list of strings.
    pub fn read_string_list(&mut self) -> Result<Vec<String>> {
        self.read_list(Self::read_string)
    }

    /// Read one structure.
    pub fn read_structure<T: Structure>(&mut self) -> Result<T> {
        T::read_from(self)
    }
}

/// Growable little-endian output stream.
#[derive(Debug, Clone, Default)]
pub struct StreamWriter {
    buf: BytesMut,
}

impl StreamWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write one byte.
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Write a boolean as one byte.
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }

    /// Write a little-endian u16.
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Write a little-endian u32.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Write a little-endian i32.
    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    /// Write a little-endian u64.
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    /// Write raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Write a u16-length, NUL-terminated string.
    ///
    /// Text longer than the u16 length allows is cut at the last character
    /// boundary that fits.
    pub fn write_string(&mut self, text: &str) -> &mut Self {
        let mut end = text.len().min(u16::MAX as usize - 1);
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        self.buf.put_u16_le((end + 1) as u16);
        self.buf.extend_from_slice(&text.as_bytes()[..end]);
        self.buf.put_u8(0);
        self
    }

    /// Write a u32-length byte buffer.
    pub fn write_buffer(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_u32_le(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Write a u16-length byte buffer.
    pub fn write_qbuffer(&mut self, bytes: &[u8]) -> &mut Self {
        let len = bytes.len().min(u16::MAX as usize);
        self.buf.put_u16_le(len as u16);
        self.buf.extend_from_slice(&bytes[..len]);
        self
    }

    /// Write a u32-count list, encoding each element with `write`.
    pub fn write_list<T>(&mut self, items: &[T], mut write: impl FnMut(&mut Self, &T)) -> &mut Self {
        self.buf.put_u32_le(items.len() as u32);
        for item in items {
            write(self, item);
        }
        self
    }

    /// Write a list of u32 values.
    pub fn write_u32_list(&mut self, items: &[u32]) -> &mut Self {
        self.write_list(items, |w, v| {
            w.write_u32(*v);
        })
    }

    /// Write a list of strings.
    pub fn write_string_list(&mut self, items: &[String]) -> &mut Self {
        self.write_list(items, |w, s| {
            w.write_string(s);
        })
    }

    /// Write one structure.
    pub fn write_structure<T: Structure>(&mut self, value: &T) -> &mut Self {
        value.write_to(self);
        self
    }

    /// Finish writing.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_includes_terminator_in_length() {
        let mut writer = StreamWriter::new();
        writer.write_string("hi");
        assert_eq!(writer.freeze().as_ref(), &[3, 0, b'h', b'i', 0]);
    }

    #[test]
    fn primitives_round_trip() {
        let mut writer = StreamWriter::new();
        writer
            .write_u8(7)
            .write_bool(true)
            .write_u16(0xBEEF)
            .write_u32(0xDEAD_BEEF)
            .write_u64(42)
            .write_string("alice")
            .write_buffer(&[1, 2, 3])
            .write_qbuffer(&[4])
            .write_u32_list(&[10, 20]);
        let bytes = writer.freeze();

        let mut reader = StreamReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_u64().unwrap(), 42);
        assert_eq!(reader.read_string().unwrap(), "alice");
        assert_eq!(reader.read_buffer().unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(reader.read_qbuffer().unwrap().as_ref(), &[4]);
        assert_eq!(reader.read_u32_list().unwrap(), vec![10, 20]);
        assert!(reader.is_empty());
    }

    #[test]
    fn short_reads_report_eof() {
        let mut reader = StreamReader::new(&[1, 2]);
        assert_eq!(reader.read_u32(), Err(ProtocolError::UnexpectedEof { needed: 4, remaining: 2 }));
    }

    #[test]
    fn string_without_terminator_is_rejected() {
        let mut reader = StreamReader::new(&[2, 0, b'h', b'i']);
        assert!(matches!(reader.read_string(), Err(ProtocolError::InvalidString(_))));
    }

    #[test]
    fn empty_string_accepts_zero_length() {
        let mut reader = StreamReader::new(&[0, 0]);
        assert_eq!(reader.read_string().unwrap(), "");
    }

    #[test]
    fn huge_list_count_does_not_preallocate() {
        let mut reader = StreamReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 1]);
        assert!(reader.read_u32_list().is_err());
    }
}
