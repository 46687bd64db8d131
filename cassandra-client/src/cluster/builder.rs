//! Builds a [`Cluster`]: connects nodes, optionally discovers peers, and
//! loads the token-range ownership map.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use cassandra_core::{CassandraError, CqlValue, Result, Row};

use super::router::{Cluster, KeyspaceTable};
use super::token_map::TokenRangeMap;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::statement::Statement;

/// Builder for a [`Cluster`].
///
/// At least one node must be added; the rest of the cluster can be
/// discovered from it. System keyspaces can be blocked from the interval
/// map to keep it small.
#[derive(Debug, Default)]
pub struct ClusterBuilder {
    nodes: Vec<(String, Option<u16>)>,
    discover_peers: bool,
    default_keyspace: Option<String>,
    default_port: Option<u16>,
    blocked_keyspaces: HashSet<String>,
}

impl ClusterBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node on the default port.
    pub fn add_node(mut self, host: impl Into<String>) -> Self {
        self.nodes.push((host.into(), None));
        self
    }

    /// Adds a node on a specific port.
    pub fn add_node_with_port(mut self, host: impl Into<String>, port: u16) -> Self {
        self.nodes.push((host.into(), Some(port)));
        self
    }

    /// Discovers the remaining nodes from the first one's peer table.
    pub fn discover_peers(mut self) -> Self {
        self.discover_peers = true;
        self
    }

    /// Sets the keyspace every connection switches to after connecting.
    pub fn default_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.default_keyspace = Some(keyspace.into());
        self
    }

    /// Sets the port used for nodes added without one and for discovered
    /// peers.
    pub fn default_port(mut self, port: u16) -> Self {
        self.default_port = Some(port);
        self
    }

    /// Excludes a keyspace from the interval map. Recommended for the
    /// system keyspaces, which contribute many ranges.
    pub fn block_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.blocked_keyspaces.insert(keyspace.into());
        self
    }

    /// Connects every node and loads the token-range ownership map.
    pub async fn build(self) -> Result<Cluster> {
        if self.nodes.is_empty() {
            return Err(CassandraError::Routing(
                "cannot build a cluster without any nodes".to_string(),
            ));
        }

        let mut nodes: Vec<Connection> = Vec::with_capacity(self.nodes.len());
        let mut by_host: HashMap<String, Connection> = HashMap::new();
        for (host, port) in &self.nodes {
            let connection = self.connect(host, *port).await?;
            by_host
                .entry(host.clone())
                .or_insert_with(|| connection.clone());
            nodes.push(connection);
        }

        if self.discover_peers {
            self.find_peers(&mut nodes, &mut by_host).await?;
        }

        let intervals = self.load_token_ring(&nodes[0], &by_host).await?;
        Ok(Cluster::new(intervals, nodes))
    }

    async fn connect(&self, host: &str, port: Option<u16>) -> Result<Connection> {
        let mut config = ClientConfig::new(host);
        if let Some(port) = port.or(self.default_port) {
            config = config.with_port(port);
        }
        if let Some(keyspace) = &self.default_keyspace {
            config = config.with_default_keyspace(keyspace.clone());
        }
        Connection::connect(&config).await
    }

    async fn find_peers(
        &self,
        nodes: &mut Vec<Connection>,
        by_host: &mut HashMap<String, Connection>,
    ) -> Result<()> {
        let seed = nodes[0].clone();
        let peers = seed
            .query(&Statement::with_query("SELECT rpc_address FROM system.peers").build())
            .await?;

        for row in peers.rows() {
            let host = inet_value(row, "rpc_address")?.to_string();
            if by_host.contains_key(&host) {
                continue;
            }
            let connection = self.connect(&host, self.default_port).await?;
            by_host.insert(host, connection.clone());
            nodes.push(connection);
        }
        Ok(())
    }

    async fn load_token_ring(
        &self,
        seed: &Connection,
        by_host: &HashMap<String, Connection>,
    ) -> Result<HashMap<KeyspaceTable, TokenRangeMap<Connection>>> {
        let ring = seed
            .query(&Statement::with_query("SELECT * FROM system.token_ring").build())
            .await?;

        let mut intervals: HashMap<KeyspaceTable, TokenRangeMap<Connection>> = HashMap::new();
        for row in ring.rows() {
            let keyspace = text_value(row, "keyspace_name")?;
            if self.blocked_keyspaces.contains(&keyspace) {
                continue;
            }
            let table = text_value(row, "table_name")?;
            let start = token_value(row, "start_token")?;
            let end = token_value(row, "end_token")?;
            let endpoint = inet_value(row, "endpoint")?.to_string();

            let Some(owner) = by_host.get(&endpoint) else {
                tracing::warn!(endpoint = %endpoint, "token range owned by unknown node");
                continue;
            };
            intervals
                .entry(KeyspaceTable::new(keyspace, table))
                .or_default()
                .insert(start, end, owner.clone());
        }
        Ok(intervals)
    }
}

fn text_value(row: &Row, name: &str) -> Result<String> {
    match row.get(name) {
        Some(CqlValue::Text(value)) => Ok(value.clone()),
        other => Err(CassandraError::Protocol(format!(
            "expected a text value in column {}, got {:?}",
            name, other
        ))),
    }
}

fn inet_value(row: &Row, name: &str) -> Result<IpAddr> {
    match row.get(name) {
        Some(CqlValue::Inet(value)) => Ok(*value),
        other => Err(CassandraError::Protocol(format!(
            "expected an inet value in column {}, got {:?}",
            name, other
        ))),
    }
}

fn token_value(row: &Row, name: &str) -> Result<i64> {
    let text = text_value(row, name)?;
    text.parse::<i64>().map_err(|e| {
        CassandraError::Protocol(format!("invalid token in column {}: {}", name, e))
    })
}
