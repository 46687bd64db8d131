//! Async token-aware client for CQL native-protocol databases.
//!
//! The client multiplexes many concurrent requests over one socket per
//! node, decodes typed column values from the compact binary row format,
//! and routes prepared queries to the node owning the partition key's
//! token range.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cassandra_client::{ClientConfig, Connection, CqlValue, Statement};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("127.0.0.1").with_default_keyspace("store");
//!     let connection = Connection::connect(&config).await?;
//!
//!     let statement = Statement::with_query("SELECT * FROM person WHERE name = ?")
//!         .add_parameter(CqlValue::Text("ada".into()))
//!         .build();
//!     let result = connection.query(&statement).await?;
//!     for row in result.rows() {
//!         println!("{:?}", row.get("name"));
//!     }
//!
//!     connection.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! For multi-node clusters, [`ClusterBuilder`] connects every node, loads
//! the token-range ownership map and hands out a [`Cluster`] that prepares
//! statements on demand and executes each query on the node owning its
//! partition key.

#![warn(missing_docs)]

pub mod cluster;
pub mod config;
pub mod connection;
pub mod query;
pub mod statement;

#[cfg(test)]
pub(crate) mod mock_node;

pub use cassandra_core::{CassandraError, Column, ColumnType, CqlValue, Result, Row};
pub use cluster::{Cluster, ClusterBuilder, TokenRangeMap};
pub use config::ClientConfig;
pub use connection::Connection;
pub use query::{Pager, QueryResult, ResultKind};
pub use statement::{Statement, StatementBuilder};
