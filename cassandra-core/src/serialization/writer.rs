//! Buffered writer for the protocol's primitive notation types.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use crate::error::{CassandraError, Result};

/// A buffer-based writer emitting the protocol's primitive types.
///
/// Every multi-byte value is written big-endian.
#[derive(Debug)]
pub struct CqlWriter {
    buffer: BytesMut,
}

impl CqlWriter {
    /// Creates a new `CqlWriter` with default capacity.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Creates a new `CqlWriter` with the specified capacity.
    ///
    /// Request serializers pre-size the buffer from their `size_of`
    /// computation, so the capacity is usually exact.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the written bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns the underlying buffer.
    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes a single unsigned byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buffer.put_u8(v);
    }

    /// Writes a single signed byte.
    pub fn write_i8(&mut self, v: i8) {
        self.buffer.put_i8(v);
    }

    /// Writes a 16-bit signed integer.
    pub fn write_i16(&mut self, v: i16) {
        self.buffer.put_i16(v);
    }

    /// Writes a 16-bit unsigned integer.
    pub fn write_u16(&mut self, v: u16) {
        self.buffer.put_u16(v);
    }

    /// Writes a 32-bit signed integer.
    pub fn write_i32(&mut self, v: i32) {
        self.buffer.put_i32(v);
    }

    /// Writes a 32-bit unsigned integer.
    pub fn write_u32(&mut self, v: u32) {
        self.buffer.put_u32(v);
    }

    /// Writes a 64-bit signed integer.
    pub fn write_i64(&mut self, v: i64) {
        self.buffer.put_i64(v);
    }

    /// Writes a 32-bit floating point value.
    pub fn write_f32(&mut self, v: f32) {
        self.buffer.put_f32(v);
    }

    /// Writes a 64-bit floating point value.
    pub fn write_f64(&mut self, v: f64) {
        self.buffer.put_f64(v);
    }

    /// Writes raw bytes without a length prefix.
    pub fn write_raw(&mut self, v: &[u8]) {
        self.buffer.put_slice(v);
    }

    /// Writes a `[string]`: a 16-bit byte length followed by UTF-8 bytes.
    ///
    /// Fails if the encoded length exceeds `i16::MAX`.
    pub fn write_string(&mut self, v: &str) -> Result<()> {
        let bytes = v.as_bytes();
        if bytes.len() > i16::MAX as usize {
            return Err(CassandraError::Protocol(format!(
                "string of {} bytes exceeds the short string bound",
                bytes.len()
            )));
        }
        self.write_i16(bytes.len() as i16);
        self.write_raw(bytes);
        Ok(())
    }

    /// Writes a `[long string]`: a 32-bit byte length followed by UTF-8
    /// bytes. Fails if the encoded length exceeds `i32::MAX`.
    pub fn write_long_string(&mut self, v: &str) -> Result<()> {
        let bytes = v.as_bytes();
        if bytes.len() > i32::MAX as usize {
            return Err(CassandraError::Protocol(format!(
                "string of {} bytes exceeds the long string bound",
                bytes.len()
            )));
        }
        self.write_i32(bytes.len() as i32);
        self.write_raw(bytes);
        Ok(())
    }

    /// Writes a `[bytes]` value: 32-bit length plus payload, where `None`
    /// serializes as length `-1` with no payload.
    pub fn write_bytes(&mut self, v: Option<&[u8]>) -> Result<()> {
        match v {
            Some(bytes) => {
                if bytes.len() > i32::MAX as usize {
                    return Err(CassandraError::Protocol(format!(
                        "byte value of {} bytes exceeds the length bound",
                        bytes.len()
                    )));
                }
                self.write_i32(bytes.len() as i32);
                self.write_raw(bytes);
            }
            None => self.write_i32(-1),
        }
        Ok(())
    }

    /// Writes a `[short bytes]` value: 16-bit length plus payload.
    pub fn write_short_bytes(&mut self, v: &[u8]) -> Result<()> {
        if v.len() > i16::MAX as usize {
            return Err(CassandraError::Protocol(format!(
                "short byte value of {} bytes exceeds the length bound",
                v.len()
            )));
        }
        self.write_i16(v.len() as i16);
        self.write_raw(v);
        Ok(())
    }

    /// Writes a `[string list]`: 16-bit count followed by `[string]`s.
    pub fn write_string_list(&mut self, v: &[String]) -> Result<()> {
        if v.len() > i16::MAX as usize {
            return Err(CassandraError::Protocol(format!(
                "string list of {} entries exceeds the count bound",
                v.len()
            )));
        }
        self.write_i16(v.len() as i16);
        for s in v {
            self.write_string(s)?;
        }
        Ok(())
    }

    /// Writes a `[string map]`: 16-bit count followed by key/value
    /// `[string]` pairs.
    pub fn write_string_map(&mut self, v: &HashMap<String, String>) -> Result<()> {
        if v.len() > i16::MAX as usize {
            return Err(CassandraError::Protocol(format!(
                "string map of {} entries exceeds the count bound",
                v.len()
            )));
        }
        self.write_i16(v.len() as i16);
        for (key, value) in v {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        Ok(())
    }
}

impl Default for CqlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the encoded size of a `[string]`.
pub(crate) fn string_size(v: &str) -> usize {
    2 + v.len()
}

/// Returns the encoded size of a `[long string]`.
pub(crate) fn long_string_size(v: &str) -> usize {
    4 + v.len()
}

/// Returns the encoded size of a `[bytes]` value.
pub(crate) fn bytes_size(v: Option<&[u8]>) -> usize {
    4 + v.map_or(0, <[u8]>::len)
}

/// Returns the encoded size of a `[short bytes]` value.
pub(crate) fn short_bytes_size(v: &[u8]) -> usize {
    2 + v.len()
}

/// Returns the encoded size of a `[string map]`.
pub(crate) fn string_map_size(v: &HashMap<String, String>) -> usize {
    2 + v
        .iter()
        .map(|(k, val)| string_size(k) + string_size(val))
        .sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_writer_is_empty() {
        let writer = CqlWriter::new();
        assert!(writer.is_empty());
        assert_eq!(writer.len(), 0);
    }

    #[test]
    fn test_write_i16_big_endian() {
        let mut writer = CqlWriter::new();
        writer.write_i16(0x0102);
        assert_eq!(writer.as_bytes(), &[0x01, 0x02]);
    }

    #[test]
    fn test_write_i32_big_endian() {
        let mut writer = CqlWriter::new();
        writer.write_i32(0x01020304);
        assert_eq!(writer.as_bytes(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_write_i64_big_endian() {
        let mut writer = CqlWriter::new();
        writer.write_i64(0x0102030405060708);
        assert_eq!(
            writer.as_bytes(),
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn test_write_negative_i32() {
        let mut writer = CqlWriter::new();
        writer.write_i32(-1);
        assert_eq!(writer.as_bytes(), &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_write_string() {
        let mut writer = CqlWriter::new();
        writer.write_string("test").unwrap();
        assert_eq!(writer.as_bytes(), &[0, 4, b't', b'e', b's', b't']);
        assert_eq!(writer.len(), string_size("test"));
    }

    #[test]
    fn test_write_empty_string() {
        let mut writer = CqlWriter::new();
        writer.write_string("").unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0]);
    }

    #[test]
    fn test_write_string_too_long_fails() {
        let mut writer = CqlWriter::new();
        let long = "a".repeat(i16::MAX as usize + 1);
        assert!(writer.write_string(&long).is_err());
    }

    #[test]
    fn test_write_long_string() {
        let mut writer = CqlWriter::new();
        writer.write_long_string("ab").unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0, 2, b'a', b'b']);
        assert_eq!(writer.len(), long_string_size("ab"));
    }

    #[test]
    fn test_write_bytes_null_is_minus_one() {
        let mut writer = CqlWriter::new();
        writer.write_bytes(None).unwrap();
        assert_eq!(writer.as_bytes(), &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_write_bytes_empty_is_zero_length() {
        let mut writer = CqlWriter::new();
        writer.write_bytes(Some(&[])).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_write_bytes_payload() {
        let mut writer = CqlWriter::new();
        writer.write_bytes(Some(&[0xDE, 0xAD])).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0, 2, 0xDE, 0xAD]);
        assert_eq!(writer.len(), bytes_size(Some(&[0xDE, 0xAD])));
    }

    #[test]
    fn test_write_short_bytes() {
        let mut writer = CqlWriter::new();
        writer.write_short_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 3, 1, 2, 3]);
        assert_eq!(writer.len(), short_bytes_size(&[1, 2, 3]));
    }

    #[test]
    fn test_write_string_list() {
        let mut writer = CqlWriter::new();
        writer
            .write_string_list(&["a".to_string(), "bc".to_string()])
            .unwrap();
        assert_eq!(writer.as_bytes(), &[0, 2, 0, 1, b'a', 0, 2, b'b', b'c']);
    }

    #[test]
    fn test_write_string_map() {
        let mut writer = CqlWriter::new();
        let mut map = HashMap::new();
        map.insert("k".to_string(), "v".to_string());
        writer.write_string_map(&map).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 1, 0, 1, b'k', 0, 1, b'v']);
        assert_eq!(writer.len(), string_map_size(&map));
    }

    #[test]
    fn test_unicode_string_uses_byte_length() {
        let mut writer = CqlWriter::new();
        writer.write_string("é").unwrap();
        // two UTF-8 bytes, not one character
        assert_eq!(writer.as_bytes(), &[0, 2, 0xC3, 0xA9]);
    }
}
