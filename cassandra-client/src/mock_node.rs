//! A loopback node speaking the frame protocol, for tests.
//!
//! Accepts connections, answers the Startup exchange with Ready, records
//! every subsequent request and replies per the supplied handler.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use cassandra_core::protocol::constants::{
    FLAG_WARNING, FRAME_HEADER_SIZE, PREPARED_FLAG_GLOBAL_TABLE_SPEC, RESULT_KIND_PREPARED,
    RESULT_KIND_ROWS, RESULT_KIND_SET_KEYSPACE, RESULT_KIND_VOID, ROWS_FLAG_GLOBAL_TABLE_SPEC,
    ROWS_FLAG_HAS_MORE_PAGES, ROWS_FLAG_NO_METADATA, VERSION_RESPONSE,
};
use cassandra_core::protocol::{FrameHeader, Opcode};
use cassandra_core::{CqlReader, CqlSerializable, CqlWriter};

use crate::config::ClientConfig;

/// How the mock answers one request.
pub(crate) enum MockReply {
    /// A Result frame with the given body.
    Result(Vec<u8>),
    /// A Result frame with a prepended warning list and the warning flag.
    ResultWithWarnings(Vec<String>, Vec<u8>),
    /// An Error frame.
    ServerError {
        code: i32,
        message: String,
    },
    /// No reply at all; the request stays pending.
    Ignore,
    /// Close the connection without replying.
    CloseConnection,
}

type HandlerFn = dyn Fn(Opcode, &[u8]) -> MockReply + Send + Sync;

/// A mock node listening on a loopback port.
pub(crate) struct MockNode {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<(Opcode, Vec<u8>)>>>,
}

impl MockNode {
    /// Starts a node whose post-startup requests are answered by
    /// `handler`.
    pub async fn start(
        handler: impl Fn(Opcode, &[u8]) -> MockReply + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock node");
        let addr = listener.local_addr().expect("mock node address");
        let handler: Arc<HandlerFn> = Arc::new(handler);
        let requests: Arc<Mutex<Vec<(Opcode, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));

        let accepted_requests = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    Arc::clone(&handler),
                    Arc::clone(&accepted_requests),
                ));
            }
        });

        Self { addr, requests }
    }

    /// Returns a client config pointing at this node.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1").with_port(self.addr.port())
    }

    /// Returns the port this node listens on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns every post-startup request received so far.
    pub fn requests(&self) -> Vec<(Opcode, Vec<u8>)> {
        self.requests.lock().expect("mock request log").clone()
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: Arc<HandlerFn>,
    requests: Arc<Mutex<Vec<(Opcode, Vec<u8>)>>>,
) {
    let Ok((startup, _)) = read_frame(&mut stream).await else {
        return;
    };
    if write_frame(&mut stream, startup.stream, Opcode::Ready, 0, &[])
        .await
        .is_err()
    {
        return;
    }

    loop {
        let Ok((header, body)) = read_frame(&mut stream).await else {
            return;
        };
        requests
            .lock()
            .expect("mock request log")
            .push((header.opcode, body.clone()));

        match handler(header.opcode, &body) {
            MockReply::Result(reply) => {
                if write_frame(&mut stream, header.stream, Opcode::Result, 0, &reply)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            MockReply::ResultWithWarnings(warnings, reply) => {
                let mut w = CqlWriter::new();
                w.write_string_list(&warnings).expect("encode warnings");
                w.write_raw(&reply);
                let bytes = w.into_bytes();
                if write_frame(&mut stream, header.stream, Opcode::Result, FLAG_WARNING, &bytes)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            MockReply::ServerError { code, message } => {
                let mut w = CqlWriter::new();
                w.write_i32(code);
                w.write_string(&message).expect("encode error message");
                let bytes = w.into_bytes();
                if write_frame(&mut stream, header.stream, Opcode::Error, 0, &bytes)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            MockReply::Ignore => {}
            MockReply::CloseConnection => return,
        }
    }
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<(FrameHeader, Vec<u8>)> {
    let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
    stream.read_exact(&mut header_bytes).await?;
    let mut reader = CqlReader::new(&header_bytes);
    let header = FrameHeader::decode(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let mut body = vec![0u8; header.length as usize];
    if !body.is_empty() {
        stream.read_exact(&mut body).await?;
    }
    Ok((header, body))
}

async fn write_frame(
    stream: &mut TcpStream,
    stream_id: i16,
    opcode: Opcode,
    flags: u8,
    body: &[u8],
) -> std::io::Result<()> {
    let header = FrameHeader {
        version: VERSION_RESPONSE,
        flags,
        stream: stream_id,
        opcode,
        length: body.len() as i32,
    };
    let mut w = CqlWriter::with_capacity(FRAME_HEADER_SIZE + body.len());
    header.serialize(&mut w).expect("encode frame header");
    w.write_raw(body);
    stream.write_all(w.as_bytes()).await
}

/// Builds a Void result body.
pub(crate) fn void_body() -> Vec<u8> {
    let mut w = CqlWriter::new();
    w.write_i32(RESULT_KIND_VOID);
    w.into_bytes().to_vec()
}

/// Builds a SetKeyspace result body.
pub(crate) fn set_keyspace_body(keyspace: &str) -> Vec<u8> {
    let mut w = CqlWriter::new();
    w.write_i32(RESULT_KIND_SET_KEYSPACE);
    w.write_string(keyspace).expect("encode keyspace");
    w.into_bytes().to_vec()
}

/// Builds a Rows result body. Columns are `(name, type tag)` pairs; each
/// row lists one optional payload per column (`None` encodes null).
pub(crate) fn rows_body(
    columns: &[(&str, u16)],
    rows: &[Vec<Option<Vec<u8>>>],
    paging_state: Option<&[u8]>,
    no_metadata: bool,
) -> Vec<u8> {
    let mut flags = 0;
    if paging_state.is_some() {
        flags |= ROWS_FLAG_HAS_MORE_PAGES;
    }
    if no_metadata {
        flags |= ROWS_FLAG_NO_METADATA;
    }

    let mut w = CqlWriter::new();
    w.write_i32(RESULT_KIND_ROWS);
    w.write_i32(flags);
    w.write_i32(columns.len() as i32);
    if let Some(state) = paging_state {
        w.write_bytes(Some(state)).expect("encode paging state");
    }
    if !no_metadata {
        for (name, tag) in columns {
            w.write_string("ks").expect("encode keyspace");
            w.write_string("t").expect("encode table");
            w.write_string(name).expect("encode column name");
            w.write_u16(*tag);
        }
    }
    w.write_i32(rows.len() as i32);
    for row in rows {
        for value in row {
            w.write_bytes(value.as_deref()).expect("encode row value");
        }
    }
    w.into_bytes().to_vec()
}

/// Builds a Prepared result body with a global `keyspace.table` spec.
/// Markers and result columns are `(name, type tag)` pairs; `pk_indexes`
/// lists the bind-marker positions forming the partition key.
pub(crate) fn prepared_body(
    id: &[u8],
    keyspace: &str,
    table: &str,
    markers: &[(&str, u16)],
    pk_indexes: &[i16],
    columns: &[(&str, u16)],
) -> Vec<u8> {
    let mut w = CqlWriter::new();
    w.write_i32(RESULT_KIND_PREPARED);
    w.write_short_bytes(id).expect("encode prepared id");

    w.write_i32(PREPARED_FLAG_GLOBAL_TABLE_SPEC);
    w.write_i32(markers.len() as i32);
    w.write_i32(pk_indexes.len() as i32);
    for pk in pk_indexes {
        w.write_i16(*pk);
    }
    w.write_string(keyspace).expect("encode keyspace");
    w.write_string(table).expect("encode table");
    for (name, tag) in markers {
        w.write_string(name).expect("encode marker name");
        w.write_u16(*tag);
    }

    w.write_i32(ROWS_FLAG_GLOBAL_TABLE_SPEC);
    w.write_i32(columns.len() as i32);
    w.write_string(keyspace).expect("encode keyspace");
    w.write_string(table).expect("encode table");
    for (name, tag) in columns {
        w.write_string(name).expect("encode column name");
        w.write_u16(*tag);
    }
    w.into_bytes().to_vec()
}
