//! The cluster router: prepares statements on demand and executes each
//! query on the node owning its partition key's token range.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cassandra_core::murmur3;
use cassandra_core::protocol::Prepared;
use cassandra_core::types::ColumnType;
use cassandra_core::{CassandraError, Result};

use super::token_map::TokenRangeMap;
use crate::connection::Connection;
use crate::query::QueryResult;
use crate::statement::Statement;

/// The table-name sentinel meaning "every table in this keyspace".
pub(crate) const ALL_TABLES: &str = "<ALL>";

/// Key of the ownership map: one keyspace/table pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct KeyspaceTable {
    pub keyspace: String,
    pub table: String,
}

impl KeyspaceTable {
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }
}

/// A prepared statement shared across the cluster: the shape from the
/// first preparing node, plus each node's locally assigned id (servers
/// assign ids independently per node).
#[derive(Debug)]
struct PreparedEntry {
    prepared: Prepared,
    node_ids: Mutex<HashMap<String, Vec<u8>>>,
}

/// A set of connected nodes with a token-range ownership map.
///
/// Queries are prepared once per unique query text and executed on the
/// node owning the partition key's token, falling back to any live node
/// when routing information is unavailable. Node liveness is advisory:
/// dead nodes are skipped, never probed or reconnected.
#[derive(Debug)]
pub struct Cluster {
    intervals: HashMap<KeyspaceTable, TokenRangeMap<Connection>>,
    nodes: Vec<Connection>,
    prepareds: Mutex<HashMap<String, Arc<PreparedEntry>>>,
}

impl Cluster {
    pub(crate) fn new(
        intervals: HashMap<KeyspaceTable, TokenRangeMap<Connection>>,
        nodes: Vec<Connection>,
    ) -> Self {
        Self {
            intervals,
            nodes,
            prepareds: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of nodes in the cluster.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the ownership map has an entry for the table.
    #[cfg(test)]
    pub(crate) fn has_interval(&self, keyspace: &str, table: &str) -> bool {
        self.intervals
            .contains_key(&KeyspaceTable::new(keyspace, table))
    }

    /// Runs a text-bearing statement: prepares it if needed, validates
    /// its parameters, picks the owning node and executes there.
    pub async fn query(&self, statement: &Statement) -> Result<QueryResult> {
        let query_text = statement.query().ok_or_else(|| {
            CassandraError::Routing(
                "cluster statements must carry query text, not a prepared id".to_string(),
            )
        })?;

        let entry = self.prepared_for(query_text).await?;
        let prepared = &entry.prepared;

        let parameters = statement.parameters();
        if prepared.bind_markers.len() != parameters.len() {
            return Err(CassandraError::TypeMismatch(format!(
                "expected {} parameters, got {}",
                prepared.bind_markers.len(),
                parameters.len()
            )));
        }
        for (i, (marker, value)) in prepared.bind_markers.iter().zip(parameters).enumerate() {
            if matches!(marker.column_type, ColumnType::Custom) {
                continue;
            }
            if !value.matches_type(&marker.column_type) {
                return Err(CassandraError::TypeMismatch(format!(
                    "parameter {} of type {} does not match expected type {}",
                    i,
                    value.type_name(),
                    marker.column_type.name()
                )));
            }
        }

        let leading_pk = prepared
            .bind_markers
            .iter()
            .position(|marker| marker.partition_key_index == 0);

        let node = match leading_pk {
            Some(index) => {
                let key_bytes = parameters[index].to_param_bytes()?;
                let token = murmur3::primary_key_hash(&key_bytes);
                let owners = self.interval_for(prepared)?;
                owners
                    .query(token)
                    .find(|node| node.is_alive())
                    .cloned()
                    .or_else(|| self.find_any_alive_node())
            }
            None => self.find_any_alive_node(),
        };
        let node = node.ok_or_else(|| {
            CassandraError::Routing("could not find an alive node".to_string())
        })?;

        let id = self.node_local_id(&entry, &node, query_text).await?;

        let mut execute = Statement::with_prepared_id(id)
            .columns(Arc::clone(&prepared.columns))
            .parameters(parameters.to_vec())
            .consistency(statement.consistency());
        if let Some(page_size) = statement.page_size() {
            execute = execute.page_size(page_size);
        }
        if let Some(paging_state) = statement.paging_state() {
            execute = execute.paging_state(paging_state.to_vec());
        }

        node.query(&execute.build()).await
    }

    /// Disconnects every node. Pending requests on each resolve with a
    /// connection error.
    pub async fn disconnect(&self) {
        for node in &self.nodes {
            node.disconnect().await;
        }
    }

    /// Returns the cluster-wide prepared entry for a query, preparing it
    /// on any live node the first time the text is seen.
    async fn prepared_for(&self, query_text: &str) -> Result<Arc<PreparedEntry>> {
        if let Some(entry) = self
            .prepareds
            .lock()
            .expect("prepared cache lock poisoned")
            .get(query_text)
        {
            return Ok(Arc::clone(entry));
        }

        let node = self.find_any_alive_node().ok_or_else(|| {
            CassandraError::Routing("could not find an alive node".to_string())
        })?;
        let prepared = node.prepare(query_text).await?;
        tracing::debug!(query = query_text, node = %node.address(), "prepared statement");

        let entry = Arc::new(PreparedEntry {
            node_ids: Mutex::new(HashMap::from([(node.address(), prepared.id.clone())])),
            prepared,
        });
        let mut cache = self
            .prepareds
            .lock()
            .expect("prepared cache lock poisoned");
        // keep whichever entry won a concurrent race
        Ok(Arc::clone(
            cache.entry(query_text.to_string()).or_insert(entry),
        ))
    }

    /// Returns the chosen node's local id for the statement, preparing it
    /// there first if that node has not seen the query yet.
    async fn node_local_id(
        &self,
        entry: &PreparedEntry,
        node: &Connection,
        query_text: &str,
    ) -> Result<Vec<u8>> {
        let cached = entry
            .node_ids
            .lock()
            .expect("node id cache lock poisoned")
            .get(&node.address())
            .cloned();
        if let Some(id) = cached {
            return Ok(id);
        }

        let fresh = node.prepare(query_text).await?;
        let mut ids = entry
            .node_ids
            .lock()
            .expect("node id cache lock poisoned");
        Ok(ids
            .entry(node.address())
            .or_insert(fresh.id)
            .clone())
    }

    /// Looks up the ownership intervals for the statement's table,
    /// falling back to the keyspace-wide sentinel entry.
    fn interval_for(&self, prepared: &Prepared) -> Result<&TokenRangeMap<Connection>> {
        let (keyspace, table) = keyspace_table_of(prepared).ok_or_else(|| {
            CassandraError::Routing(
                "prepared metadata names no keyspace or table to route by".to_string(),
            )
        })?;

        self.intervals
            .get(&KeyspaceTable::new(keyspace.clone(), table.clone()))
            .or_else(|| {
                self.intervals
                    .get(&KeyspaceTable::new(keyspace.clone(), ALL_TABLES))
            })
            .ok_or_else(|| {
                CassandraError::Routing(format!(
                    "could not find a token interval for {}.{}",
                    keyspace, table
                ))
            })
    }

    fn find_any_alive_node(&self) -> Option<Connection> {
        self.nodes.iter().find(|node| node.is_alive()).cloned()
    }
}

/// The keyspace/table a prepared statement routes by: taken from the
/// result columns, or from the bind markers when no column carries one.
fn keyspace_table_of(prepared: &Prepared) -> Option<(String, String)> {
    prepared
        .columns
        .iter()
        .find_map(|column| Some((column.keyspace.clone()?, column.table.clone()?)))
        .or_else(|| {
            prepared
                .bind_markers
                .iter()
                .find_map(|marker| Some((marker.keyspace.clone()?, marker.table.clone()?)))
        })
}
