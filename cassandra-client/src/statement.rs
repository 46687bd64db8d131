//! Statements: the unit of work handed to a connection or cluster.

use std::sync::Arc;

use cassandra_core::protocol::constants::Consistency;
use cassandra_core::{Column, CqlValue};

/// What the statement executes: plain query text, or a previously
/// prepared statement's server-assigned id. Mutually exclusive.
#[derive(Debug, Clone)]
enum StatementKind {
    Query(String),
    Prepared(Vec<u8>),
}

/// An immutable description of one query to run.
///
/// Carries the parameter values, an optional pre-known result shape (so
/// the server can skip sending metadata), an optional page size and an
/// optional paging cursor to resume from. Paging across multiple fetches
/// is driven by [`Pager`](crate::Pager), which keeps its own advancing
/// cursor; a statement never changes once built.
#[derive(Debug, Clone)]
pub struct Statement {
    kind: StatementKind,
    parameters: Vec<CqlValue>,
    columns: Option<Arc<Vec<Column>>>,
    page_size: Option<i32>,
    paging_state: Option<Vec<u8>>,
    consistency: Consistency,
}

impl Statement {
    /// Starts building a statement around query text.
    pub fn with_query(query: impl Into<String>) -> StatementBuilder {
        StatementBuilder::new(StatementKind::Query(query.into()))
    }

    /// Starts building a statement around a prepared statement id.
    pub fn with_prepared_id(id: Vec<u8>) -> StatementBuilder {
        StatementBuilder::new(StatementKind::Prepared(id))
    }

    /// Returns the query text, if this is a text-bearing statement.
    pub fn query(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::Query(query) => Some(query),
            StatementKind::Prepared(_) => None,
        }
    }

    /// Returns the prepared id, if this is an id-bearing statement.
    pub fn prepared_id(&self) -> Option<&[u8]> {
        match &self.kind {
            StatementKind::Query(_) => None,
            StatementKind::Prepared(id) => Some(id),
        }
    }

    /// Returns the parameter values to bind.
    pub fn parameters(&self) -> &[CqlValue] {
        &self.parameters
    }

    /// Returns the pre-known result columns, if any.
    pub fn columns(&self) -> Option<&Arc<Vec<Column>>> {
        self.columns.as_ref()
    }

    /// Returns the requested result page size, if any.
    pub fn page_size(&self) -> Option<i32> {
        self.page_size
    }

    /// Returns the paging cursor to resume from, if any.
    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }

    /// Returns the consistency level passed through to the server.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Derives the follow-up statement for the next page: same target and
    /// parameters, with the server-issued cursor and the cached columns.
    pub(crate) fn next_page(
        &self,
        paging_state: Vec<u8>,
        columns: Arc<Vec<Column>>,
    ) -> Statement {
        let mut next = self.clone();
        next.paging_state = Some(paging_state);
        next.columns = Some(columns);
        next
    }
}

impl From<&str> for Statement {
    fn from(query: &str) -> Self {
        Statement::with_query(query).build()
    }
}

/// Builder for [`Statement`].
#[derive(Debug)]
pub struct StatementBuilder {
    kind: StatementKind,
    parameters: Vec<CqlValue>,
    columns: Option<Arc<Vec<Column>>>,
    page_size: Option<i32>,
    paging_state: Option<Vec<u8>>,
    consistency: Consistency,
}

impl StatementBuilder {
    fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            parameters: Vec::new(),
            columns: None,
            page_size: None,
            paging_state: None,
            consistency: Consistency::One,
        }
    }

    /// Replaces the parameter values.
    pub fn parameters(mut self, parameters: Vec<CqlValue>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Appends one parameter value.
    pub fn add_parameter(mut self, parameter: CqlValue) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Supplies a pre-known result shape. The request is then sent with
    /// the skip-metadata flag and the server omits column metadata.
    pub fn columns(mut self, columns: Arc<Vec<Column>>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Requests at most this many rows per result page.
    pub fn page_size(mut self, page_size: i32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Resumes from a server-issued paging cursor.
    pub fn paging_state(mut self, paging_state: Vec<u8>) -> Self {
        self.paging_state = Some(paging_state);
        self
    }

    /// Sets the consistency level. Defaults to [`Consistency::One`].
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Builds the statement.
    pub fn build(self) -> Statement {
        Statement {
            kind: self.kind,
            parameters: self.parameters,
            columns: self.columns,
            page_size: self.page_size,
            paging_state: self.paging_state,
            consistency: self.consistency,
        }
    }
}
