//! Frame envelope for the native binary protocol.

use bytes::{Bytes, BytesMut};

use super::constants::{FRAME_HEADER_SIZE, VERSION_REQUEST};
use crate::error::{CassandraError, Result};
use crate::serialization::{CqlReader, CqlSerializable, CqlWriter};

/// The message-kind tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// An error response from the server.
    Error = 0x00,
    /// Initializes the connection.
    Startup = 0x01,
    /// The server is ready for queries.
    Ready = 0x02,
    /// Asks the server which startup options it supports.
    Options = 0x05,
    /// An unprepared query.
    Query = 0x07,
    /// The result of a query, prepare or execute.
    Result = 0x08,
    /// Prepares a statement for later execution.
    Prepare = 0x09,
    /// Executes a prepared statement.
    Execute = 0x0A,
}

impl Opcode {
    /// Decodes an opcode from its wire byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Error),
            0x01 => Ok(Self::Startup),
            0x02 => Ok(Self::Ready),
            0x05 => Ok(Self::Options),
            0x07 => Ok(Self::Query),
            0x08 => Ok(Self::Result),
            0x09 => Ok(Self::Prepare),
            0x0A => Ok(Self::Execute),
            other => Err(CassandraError::Protocol(format!(
                "unknown opcode: 0x{:02X}",
                other
            ))),
        }
    }
}

/// The fixed 9-byte header that starts every frame.
///
/// The stream id correlates a request with its eventual response on a
/// shared connection; the sender owns id allocation and must not reuse an
/// id while a request with that id is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version byte (request or response).
    pub version: u8,
    /// Frame flags (compression, tracing, warning, ...).
    pub flags: u8,
    /// The stream id correlating request and response.
    pub stream: i16,
    /// The frame's message kind.
    pub opcode: Opcode,
    /// Length of the body that follows the header.
    pub length: i32,
}

impl FrameHeader {
    /// Creates a request header with no flags set.
    pub fn request(stream: i16, opcode: Opcode, length: i32) -> Self {
        Self {
            version: VERSION_REQUEST,
            flags: 0,
            stream,
            opcode,
            length,
        }
    }

    /// Decodes a header from exactly [`FRAME_HEADER_SIZE`] bytes.
    pub fn decode(reader: &mut CqlReader<'_>) -> Result<Self> {
        let version = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let stream = reader.read_i16()?;
        let opcode = Opcode::from_u8(reader.read_u8()?)?;
        let length = reader.read_i32()?;
        if length < 0 {
            return Err(CassandraError::Protocol(format!(
                "negative frame body length: {}",
                length
            )));
        }
        Ok(Self {
            version,
            flags,
            stream,
            opcode,
            length,
        })
    }
}

impl CqlSerializable for FrameHeader {
    fn serialize(&self, out: &mut CqlWriter) -> Result<()> {
        out.write_u8(self.version);
        out.write_u8(self.flags);
        out.write_i16(self.stream);
        out.write_u8(self.opcode as u8);
        out.write_i32(self.length);
        Ok(())
    }

    fn size_of(&self) -> usize {
        FRAME_HEADER_SIZE
    }
}

/// One decoded frame: header plus the complete body.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The decoded frame header.
    pub header: FrameHeader,
    /// The frame body, exactly `header.length` bytes.
    pub body: Bytes,
}

impl Frame {
    /// Creates a frame, filling in the header's length from the body.
    pub fn new(mut header: FrameHeader, body: Bytes) -> Self {
        header.length = body.len() as i32;
        Self { header, body }
    }

    /// Serializes this frame (header plus body) into one buffer.
    pub fn to_bytes(&self) -> Result<BytesMut> {
        let mut out = CqlWriter::with_capacity(FRAME_HEADER_SIZE + self.body.len());
        self.header.serialize(&mut out)?;
        out.write_raw(&self.body);
        Ok(out.into_bytes())
    }
}
