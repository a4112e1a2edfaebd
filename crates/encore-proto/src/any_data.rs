//! Typed data wrappers.
//!
//! Polymorphic parameters travel as a type name followed by a doubly
//! length-prefixed body:
//!
//! ```text
//! type_name: String | outer_len u32 (= inner_len + 4) | inner_len u32 | body
//! ```

use bytes::Bytes;

use crate::{
    errors::{ProtocolError, Result},
    stream::{StreamReader, StreamWriter, Structure},
};

/// A type-tagged opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyDataHolder {
    /// Type name, e.g. `"TextMessage"`
    pub type_name: String,
    /// Encoded structure
    pub data: Bytes,
}

impl AnyDataHolder {
    /// Wrap an encoded body.
    pub fn new(type_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self { type_name: type_name.into(), data: data.into() }
    }

    /// Wrap a structure.
    pub fn from_structure<T: Structure>(type_name: impl Into<String>, value: &T) -> Self {
        let mut writer = StreamWriter::new();
        value.write_to(&mut writer);
        Self::new(type_name, writer.freeze())
    }

    /// Decode the body as `T`, requiring the type name to be `expected`.
    ///
    /// # Errors
    ///
    /// - `InvalidDataHolder` if the type name differs
    pub fn to_structure<T: Structure>(&self, expected: &str) -> Result<T> {
        if self.type_name != expected {
            return Err(ProtocolError::InvalidDataHolder(format!(
                "expected {expected:?}, got {:?}",
                self.type_name
            )));
        }
        T::read_from(&mut StreamReader::new(&self.data))
    }
}

impl Structure for AnyDataHolder {
    fn write_to(&self, writer: &mut StreamWriter) {
        writer.write_string(&self.type_name);
        writer.write_u32(self.data.len() as u32 + 4);
        writer.write_buffer(&self.data);
    }

    fn read_from(reader: &mut StreamReader<'_>) -> Result<Self> {
        let type_name = reader.read_string()?;
        let outer = reader.read_u32()?;
        let data = reader.read_buffer()?;

        if outer as usize != data.len() + 4 {
            return Err(ProtocolError::InvalidDataHolder(format!(
                "outer length {outer} does not cover inner length {}",
                data.len()
            )));
        }

        Ok(Self { type_name, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_nest() {
        let holder = AnyDataHolder::new("Gathering", vec![1, 2, 3]);
        let mut writer = StreamWriter::new();
        holder.write_to(&mut writer);
        let bytes = writer.freeze();

        // "Gathering" + NUL = 10 bytes after the u16 length
        assert_eq!(&bytes[12..16], &7u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &3u32.to_le_bytes());

        let decoded = AnyDataHolder::read_from(&mut StreamReader::new(&bytes)).unwrap();
        assert_eq!(decoded, holder);
    }

    #[test]
    fn mismatched_outer_length_is_rejected() {
        let mut writer = StreamWriter::new();
        writer.write_string("X").write_u32(99).write_buffer(&[1]);
        let bytes = writer.freeze();

        let result = AnyDataHolder::read_from(&mut StreamReader::new(&bytes));
        assert!(matches!(result, Err(ProtocolError::InvalidDataHolder(_))));
    }
}
