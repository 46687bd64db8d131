//! Cursor-based reader for the protocol's primitive notation types.

use std::collections::HashMap;

use bytes::Buf;

use crate::error::{CassandraError, Result};

/// A cursor over a byte slice decoding the protocol's primitive types.
///
/// Every read advances the cursor past the consumed bytes; callers chain
/// reads positionally. All multi-byte values are read big-endian.
#[derive(Debug)]
pub struct CqlReader<'a> {
    data: &'a [u8],
}

impl<'a> CqlReader<'a> {
    /// Creates a new reader over the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Returns the number of bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the cursor has consumed every byte.
    pub fn is_exhausted(&self) -> bool {
        self.data.is_empty()
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.data.len() < n {
            Err(CassandraError::Protocol(format!(
                "insufficient data: need {} bytes, have {}",
                n,
                self.data.len()
            )))
        } else {
            Ok(())
        }
    }

    /// Reads a single unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        Ok(self.data.get_u8())
    }

    /// Reads a single signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure_remaining(1)?;
        Ok(self.data.get_i8())
    }

    /// Reads a 16-bit signed integer.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure_remaining(2)?;
        Ok(self.data.get_i16())
    }

    /// Reads a 16-bit unsigned integer.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure_remaining(2)?;
        Ok(self.data.get_u16())
    }

    /// Reads a 32-bit signed integer.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.data.get_i32())
    }

    /// Reads a 32-bit unsigned integer.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure_remaining(4)?;
        Ok(self.data.get_u32())
    }

    /// Reads a 64-bit signed integer.
    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.data.get_i64())
    }

    /// Reads a 32-bit floating point value.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure_remaining(4)?;
        Ok(self.data.get_f32())
    }

    /// Reads a 64-bit floating point value.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure_remaining(8)?;
        Ok(self.data.get_f64())
    }

    /// Reads `len` raw bytes as a borrowed slice.
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure_remaining(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    /// Reads exactly `N` raw bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_raw(N)?);
        Ok(buf)
    }

    /// Reads a `[string]`: 16-bit byte length followed by UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_i16()?;
        if len < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid string length: {}",
                len
            )));
        }
        let bytes = self.read_raw(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CassandraError::Protocol(format!("invalid UTF-8 string: {}", e)))
    }

    /// Reads a `[long string]`: 32-bit byte length followed by UTF-8 bytes.
    pub fn read_long_string(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid long string length: {}",
                len
            )));
        }
        let bytes = self.read_raw(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CassandraError::Protocol(format!("invalid UTF-8 string: {}", e)))
    }

    /// Reads a `[bytes]` value. A negative length decodes to `None`,
    /// distinct from `Some` of an empty payload.
    pub fn read_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        Ok(Some(self.read_raw(len as usize)?.to_vec()))
    }

    /// Reads a `[short bytes]` value.
    pub fn read_short_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_i16()?;
        if len < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid short bytes length: {}",
                len
            )));
        }
        Ok(self.read_raw(len as usize)?.to_vec())
    }

    /// Reads a `[string list]`: 16-bit count followed by `[string]`s.
    pub fn read_string_list(&mut self) -> Result<Vec<String>> {
        let count = self.read_i16()?;
        if count < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid string list count: {}",
                count
            )));
        }
        let mut strings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            strings.push(self.read_string()?);
        }
        Ok(strings)
    }

    /// Reads a `[string map]`: 16-bit count followed by key/value pairs.
    pub fn read_string_map(&mut self) -> Result<HashMap<String, String>> {
        let count = self.read_i16()?;
        if count < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid string map count: {}",
                count
            )));
        }
        let mut map = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}
