//! Error types for driver operations.

use std::io;
use thiserror::Error;

/// The main error type for driver operations.
#[derive(Debug, Error)]
pub enum CassandraError {
    /// Protocol-level errors (malformed or unexpected frames, unknown
    /// opcodes or result kinds).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An Error frame returned by the server, surfaced verbatim.
    #[error("server error {code}: {message}")]
    Server {
        /// The server-assigned error code.
        code: i32,
        /// The human-readable message carried by the error frame.
        message: String,
    },

    /// Routing errors (no live node, no ownership interval for a table).
    #[error("routing error: {0}")]
    Routing(String),

    /// A bound parameter whose runtime type does not match the prepared
    /// bind marker's declared type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// An attempt to bind a value the codec cannot serialize.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Connection-related errors (network failures, disconnections).
    #[error("connection error: {0}")]
    Connection(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A specialized `Result` type for driver operations.
pub type Result<T> = std::result::Result<T, CassandraError>;
