//! The multiplexed connection to a single node.

mod stream_table;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
pub(crate) use stream_table::StreamTable;

use bytes::Bytes;
use cassandra_core::protocol::FrameHeader;

/// One demultiplexed response: the frame header, the body with any
/// warning prefix already stripped, and the warnings themselves.
#[derive(Debug)]
pub(crate) struct StreamData {
    /// The response frame's header.
    pub header: FrameHeader,
    /// The response body.
    pub body: Bytes,
    /// Warnings prepended by the server, if any.
    pub warnings: Vec<String>,
}
