//! Socket lifecycle, request multiplexing and the background reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_util::codec::Decoder;

use cassandra_core::protocol::constants::{FLAG_WARNING, FRAME_HEADER_SIZE};
use cassandra_core::protocol::{
    ErrorBody, ExecuteRequest, Frame, FrameCodec, FrameHeader, Opcode, PrepareRequest, Prepared,
    QueryParameters, QueryRequest, ResultBody, StartupRequest,
};
use cassandra_core::{CassandraError, CqlReader, CqlSerializable, CqlWriter, Result};

use super::{StreamData, StreamTable};
use crate::config::ClientConfig;
use crate::query::{Pager, QueryResult};
use crate::statement::Statement;

/// A connection to a single node.
///
/// One connection owns exactly one socket. Many logical requests share it
/// concurrently: each request is assigned a stream id and a completion
/// slot, and a background reader demultiplexes response frames back to
/// the waiting caller. Cloning is cheap and shares the same socket.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    host: String,
    port: u16,
    writer: Mutex<OwnedWriteHalf>,
    streams: Arc<StreamTable>,
    alive: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // Stops the background reader once the last handle goes away.
        let _ = self.shutdown.send(true);
    }
}

impl Connection {
    /// Connects to a node: TCP handshake, Startup exchange, and if the
    /// config names a default keyspace, a `USE` statement.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let host = config.host().to_string();
        let port = config.port();

        let mut stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| {
                CassandraError::Connection(format!("failed to connect to {}:{}: {}", host, port, e))
            })?;
        stream.set_nodelay(true).map_err(|e| {
            CassandraError::Connection(format!("failed to set TCP_NODELAY: {}", e))
        })?;

        startup(&mut stream).await?;
        tracing::debug!(host = %host, port = port, "connection ready");

        let (read_half, write_half) = stream.into_split();
        let streams = Arc::new(StreamTable::new());
        let alive = Arc::new(AtomicBool::new(true));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(read_loop(
            read_half,
            Arc::clone(&streams),
            Arc::clone(&alive),
            shutdown_rx,
            format!("{}:{}", host, port),
        ));

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                host,
                port,
                writer: Mutex::new(write_half),
                streams,
                alive,
                shutdown,
            }),
        };

        if let Some(keyspace) = config.default_keyspace() {
            let use_statement = Statement::with_query(format!("USE {}", keyspace)).build();
            connection.query(&use_statement).await?;
        }

        Ok(connection)
    }

    /// Returns the host this connection targets.
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Returns the port this connection targets.
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Returns the node's `host:port` address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.inner.host, self.inner.port)
    }

    /// Returns false once the connection has failed or been disconnected.
    ///
    /// The flag is advisory: a stale read only sends a request to a node
    /// that will fail it, which callers already tolerate.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dead(&self) {
        self.inner.alive.store(false, Ordering::Release);
    }

    /// Runs a statement and decodes its result.
    ///
    /// Text-bearing statements go out as Query frames, id-bearing ones as
    /// Execute frames. When the statement carries pre-known columns the
    /// request asks the server to skip result metadata.
    pub async fn query(&self, statement: &Statement) -> Result<QueryResult> {
        let data = self.send_statement(statement).await?;
        if data.header.opcode != Opcode::Result {
            return Err(CassandraError::Protocol(format!(
                "expected a result frame, got {:?}",
                data.header.opcode
            )));
        }
        let body = ResultBody::decode(&data.body, statement.columns().cloned())?;
        QueryResult::from_body(body, data.warnings)
    }

    /// Runs a statement and returns a pager over all of its pages.
    pub async fn query_pages(&self, statement: Statement) -> Result<Pager> {
        let first = self.query(&statement).await?;
        Ok(Pager::new(self.clone(), statement, first))
    }

    /// Prepares a statement on this node, returning its node-local id and
    /// the parameter/result shapes.
    pub async fn prepare(&self, query: &str) -> Result<Prepared> {
        let body = encode_body(&PrepareRequest { query })?;
        let data = self.request(Opcode::Prepare, body).await?;
        if data.header.opcode != Opcode::Result {
            return Err(CassandraError::Protocol(format!(
                "expected a result frame, got {:?}",
                data.header.opcode
            )));
        }
        match ResultBody::decode(&data.body, None)? {
            ResultBody::Prepared(prepared) => Ok(prepared),
            other => Err(CassandraError::Protocol(format!(
                "expected a prepared result, got {:?}",
                other
            ))),
        }
    }

    /// Disconnects from the node. Every pending request resolves with a
    /// connection error, and the connection cannot be reused.
    pub async fn disconnect(&self) {
        self.mark_dead();
        let _ = self.inner.shutdown.send(true);
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
        tracing::debug!(host = %self.inner.host, port = self.inner.port, "disconnected");
    }

    /// Returns the number of requests currently awaiting a response.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.inner.streams.in_flight()
    }

    async fn send_statement(&self, statement: &Statement) -> Result<StreamData> {
        let parameters = QueryParameters::positional(
            statement.consistency(),
            statement.parameters(),
            statement.columns().is_some(),
            statement.page_size(),
            statement.paging_state(),
        )?;

        if let Some(query) = statement.query() {
            let request = QueryRequest { query, parameters };
            self.request(Opcode::Query, encode_body(&request)?).await
        } else if let Some(id) = statement.prepared_id() {
            let request = ExecuteRequest { id, parameters };
            self.request(Opcode::Execute, encode_body(&request)?).await
        } else {
            Err(CassandraError::Protocol(
                "statement carries neither query text nor a prepared id".to_string(),
            ))
        }
    }

    /// Allocates a stream id, writes one frame, and awaits the response
    /// slot. Writers may interleave; the stream id keeps responses apart.
    async fn request(&self, opcode: Opcode, body: Bytes) -> Result<StreamData> {
        if !self.is_alive() {
            return Err(CassandraError::Connection(format!(
                "connection to {} is not alive",
                self.address()
            )));
        }

        let (stream_id, receiver) = self.inner.streams.register()?;
        let frame = Frame::new(FrameHeader::request(stream_id, opcode, 0), body);
        let bytes = match frame.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.inner.streams.discard(stream_id);
                return Err(e);
            }
        };

        let written = {
            let mut writer = self.inner.writer.lock().await;
            writer.write_all(&bytes).await
        };
        if let Err(e) = written {
            self.inner.streams.discard(stream_id);
            self.mark_dead();
            return Err(CassandraError::Connection(format!(
                "failed to write to {}: {}",
                self.address(),
                e
            )));
        }

        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CassandraError::Connection(
                "connection closed before the response arrived".to_string(),
            )),
        }
    }
}

fn encode_body<T: CqlSerializable>(value: &T) -> Result<Bytes> {
    let mut out = CqlWriter::with_capacity(value.size_of());
    value.serialize(&mut out)?;
    Ok(out.into_bytes().freeze())
}

/// Performs the Startup exchange on the still-unsplit socket: send the
/// option map, then expect Ready (or surface the server's Error).
async fn startup(stream: &mut TcpStream) -> Result<()> {
    let startup = StartupRequest::new();
    let frame = Frame::new(
        FrameHeader::request(0, Opcode::Startup, 0),
        encode_body(&startup)?,
    );
    stream
        .write_all(&frame.to_bytes()?)
        .await
        .map_err(|e| CassandraError::Connection(format!("failed to send startup: {}", e)))?;

    let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
    stream
        .read_exact(&mut header_bytes)
        .await
        .map_err(|e| CassandraError::Connection(format!("failed to read startup reply: {}", e)))?;
    let mut reader = CqlReader::new(&header_bytes);
    let header = FrameHeader::decode(&mut reader)?;

    let mut body = vec![0u8; header.length as usize];
    if !body.is_empty() {
        stream.read_exact(&mut body).await.map_err(|e| {
            CassandraError::Connection(format!("failed to read startup reply: {}", e))
        })?;
    }

    match header.opcode {
        Opcode::Ready => Ok(()),
        Opcode::Error => {
            let mut reader = CqlReader::new(&body);
            let error = ErrorBody::decode(&mut reader)?;
            Err(CassandraError::Server {
                code: error.code,
                message: error.message,
            })
        }
        other => Err(CassandraError::Protocol(format!(
            "expected ready or error during startup, got {:?}",
            other
        ))),
    }
}

/// The connection's sole reader. Decodes frames as bytes arrive, resolves
/// the matching completion slot per frame, and on any exit cause fails
/// every still-pending slot so no caller awaits forever.
async fn read_loop(
    mut read_half: OwnedReadHalf,
    streams: Arc<StreamTable>,
    alive: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    peer: String,
) {
    let reason = drive_reads(&mut read_half, &streams, &mut shutdown).await;
    alive.store(false, Ordering::Release);
    tracing::debug!(peer = %peer, reason = %reason, "reader stopped");
    streams.fail_all(&reason);
}

async fn drive_reads(
    read_half: &mut OwnedReadHalf,
    streams: &StreamTable,
    shutdown: &mut watch::Receiver<bool>,
) -> String {
    let mut codec = FrameCodec::new();
    let mut buffer = BytesMut::with_capacity(8192);
    loop {
        loop {
            match codec.decode(&mut buffer) {
                Ok(Some(frame)) => dispatch(streams, frame),
                Ok(None) => break,
                Err(e) => return format!("failed to decode frame: {}", e),
            }
        }
        tokio::select! {
            _ = shutdown.changed() => return "connection closed".to_string(),
            read = read_half.read_buf(&mut buffer) => match read {
                Ok(0) => return "connection closed by server".to_string(),
                Ok(_) => {}
                Err(e) => return format!("socket read failed: {}", e),
            },
        }
    }
}

fn dispatch(streams: &StreamTable, frame: Frame) {
    match streams.complete(frame.header.stream) {
        Some(slot) => {
            let _ = slot.send(resolve(frame));
        }
        None => {
            // A response nobody waits for (e.g. a cancelled request); the
            // body has already been consumed from the buffer.
            tracing::warn!(
                stream = frame.header.stream,
                "discarding response for unknown stream id"
            );
        }
    }
}

fn resolve(frame: Frame) -> Result<StreamData> {
    if frame.header.opcode == Opcode::Error {
        let mut reader = CqlReader::new(&frame.body);
        let error = ErrorBody::decode(&mut reader)?;
        return Err(CassandraError::Server {
            code: error.code,
            message: error.message,
        });
    }

    let mut warnings = Vec::new();
    let mut body = frame.body.clone();
    if frame.header.flags & FLAG_WARNING != 0 {
        let mut reader = CqlReader::new(&frame.body);
        warnings = reader.read_string_list()?;
        let consumed = frame.body.len() - reader.remaining();
        body = frame.body.slice(consumed..);
    }

    Ok(StreamData {
        header: frame.header,
        body,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_node::{self, MockNode, MockReply};
    use crate::query::ResultKind;
    use cassandra_core::CqlValue;

    #[tokio::test]
    async fn test_connect_and_void_query() {
        let node = MockNode::start(|_, _| MockReply::Result(mock_node::void_body())).await;
        let connection = Connection::connect(&node.config()).await.unwrap();
        assert!(connection.is_alive());

        let result = connection.query(&"INSERT INTO t (x) VALUES (1)".into()).await.unwrap();
        assert_eq!(result.kind(), ResultKind::Void);
        assert_eq!(result.len(), 0);
        assert_eq!(connection.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_default_keyspace_issues_use() {
        let node =
            MockNode::start(|_, _| MockReply::Result(mock_node::set_keyspace_body("store"))).await;
        let config = node.config().with_default_keyspace("store");
        let _connection = Connection::connect(&config).await.unwrap();

        let requests = node.requests();
        assert_eq!(requests.len(), 1);
        let (opcode, body) = &requests[0];
        assert_eq!(*opcode, Opcode::Query);
        let mut reader = CqlReader::new(body);
        assert_eq!(reader.read_long_string().unwrap(), "USE store");
    }

    #[tokio::test]
    async fn test_query_with_rows() {
        let node = MockNode::start(|_, _| {
            MockReply::Result(mock_node::rows_body(
                &[("n", 0x09)],
                &[vec![Some(7i32.to_be_bytes().to_vec())]],
                None,
                false,
            ))
        })
        .await;
        let connection = Connection::connect(&node.config()).await.unwrap();

        let result = connection.query(&"SELECT n FROM t".into()).await.unwrap();
        assert_eq!(result.kind(), ResultKind::Rows);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["n"], CqlValue::Int(7));
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let node = MockNode::start(|_, _| MockReply::ServerError {
            code: 0x2200,
            message: "unconfigured table".to_string(),
        })
        .await;
        let connection = Connection::connect(&node.config()).await.unwrap();

        let err = connection.query(&"SELECT 1".into()).await.unwrap_err();
        match err {
            CassandraError::Server { code, message } => {
                assert_eq!(code, 0x2200);
                assert_eq!(message, "unconfigured table");
            }
            other => panic!("expected server error, got {:?}", other),
        }
        // a server error fails the call, not the connection
        assert!(connection.is_alive());
    }

    #[tokio::test]
    async fn test_warnings_are_stripped_and_surfaced() {
        let node = MockNode::start(|_, _| {
            MockReply::ResultWithWarnings(
                vec!["Aggregation query used without partition key".to_string()],
                mock_node::void_body(),
            )
        })
        .await;
        let connection = Connection::connect(&node.config()).await.unwrap();

        let result = connection.query(&"SELECT count(*) FROM t".into()).await.unwrap();
        assert_eq!(result.kind(), ResultKind::Void);
        assert_eq!(
            result.warnings(),
            vec!["Aggregation query used without partition key".to_string()]
        );
    }

    #[tokio::test]
    async fn test_prepare_round_trip() {
        let node = MockNode::start(|opcode, _| {
            assert_eq!(opcode, Opcode::Prepare);
            MockReply::Result(mock_node::prepared_body(
                &[0xAA],
                "ks",
                "person",
                &[("name", 0x0D)],
                &[0],
                &[("name", 0x0D), ("age", 0x09)],
            ))
        })
        .await;
        let connection = Connection::connect(&node.config()).await.unwrap();

        let prepared = connection
            .prepare("SELECT * FROM person WHERE name = ?")
            .await
            .unwrap();
        assert_eq!(prepared.id, vec![0xAA]);
        assert_eq!(prepared.bind_markers.len(), 1);
        assert_eq!(prepared.bind_markers[0].partition_key_index, 0);
        assert_eq!(prepared.columns.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_queries_multiplex() {
        let node = MockNode::start(|_, body| {
            // answer each query with the digit embedded in its text
            let mut reader = CqlReader::new(body);
            let query = reader.read_long_string().unwrap();
            let value: i32 = query.rsplit(' ').next().unwrap().parse().unwrap();
            MockReply::Result(mock_node::rows_body(
                &[("n", 0x09)],
                &[vec![Some(value.to_be_bytes().to_vec())]],
                None,
                false,
            ))
        })
        .await;
        let connection = Connection::connect(&node.config()).await.unwrap();

        let (q1, q2, q3) = ("SELECT 1".into(), "SELECT 2".into(), "SELECT 3".into());
        let (a, b, c) = tokio::join!(
            connection.query(&q1),
            connection.query(&q2),
            connection.query(&q3),
        );
        assert_eq!(a.unwrap()[0]["n"], CqlValue::Int(1));
        assert_eq!(b.unwrap()[0]["n"], CqlValue::Int(2));
        assert_eq!(c.unwrap()[0]["n"], CqlValue::Int(3));
        assert_eq!(connection.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_resolves_pending_requests() {
        let node = MockNode::start(|_, _| MockReply::Ignore).await;
        let connection = Connection::connect(&node.config()).await.unwrap();

        let pending = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.query(&"SELECT 1".into()).await })
        };
        // wait for the request to be registered before disconnecting
        while connection.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        connection.disconnect().await;

        let outcome = pending.await.unwrap();
        assert!(matches!(outcome, Err(CassandraError::Connection(_))));
        assert!(!connection.is_alive());
        assert_eq!(connection.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_disconnected_connection_rejects_new_requests() {
        let node = MockNode::start(|_, _| MockReply::Result(mock_node::void_body())).await;
        let connection = Connection::connect(&node.config()).await.unwrap();
        connection.disconnect().await;

        let err = connection.query(&"SELECT 1".into()).await.unwrap_err();
        assert!(matches!(err, CassandraError::Connection(_)));
    }

    #[tokio::test]
    async fn test_server_close_fails_pending_and_marks_dead() {
        let node = MockNode::start(|_, _| MockReply::CloseConnection).await;
        let connection = Connection::connect(&node.config()).await.unwrap();

        let outcome = connection.query(&"SELECT 1".into()).await;
        assert!(matches!(outcome, Err(CassandraError::Connection(_))));
        // the reader observed the close and cleared the liveness flag
        while connection.is_alive() {
            tokio::task::yield_now().await;
        }
    }
}
