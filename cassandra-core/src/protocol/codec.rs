//! Streaming codec turning a byte stream into complete frames.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::constants::FRAME_HEADER_SIZE;
use super::frame::{Frame, FrameHeader};
use crate::error::{CassandraError, Result};
use crate::serialization::CqlReader;

/// Codec for encoding and decoding protocol frames.
///
/// Implements `tokio_util::codec::{Encoder, Decoder}`. Decoding yields a
/// frame only once the full header and body have arrived; short reads
/// leave the buffer untouched until more bytes come in, so the caller can
/// feed socket reads of any size.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CassandraError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let bytes = item.to_bytes()?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CassandraError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Body length sits in the last four header bytes.
        let length = i32::from_be_bytes([src[5], src[6], src[7], src[8]]);
        if length < 0 {
            return Err(CassandraError::Protocol(format!(
                "negative frame body length: {}",
                length
            )));
        }

        let total = FRAME_HEADER_SIZE + length as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let header_bytes = src.split_to(FRAME_HEADER_SIZE);
        let mut reader = CqlReader::new(&header_bytes);
        let header = FrameHeader::decode(&mut reader)?;
        let body = src.split_to(length as usize).freeze();

        Ok(Some(Frame { header, body }))
    }
}
