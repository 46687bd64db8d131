//! Query results and paged iteration.

use std::collections::VecDeque;
use std::ops::Index;
use std::sync::Arc;

use cassandra_core::protocol::ResultBody;
use cassandra_core::{CassandraError, Column, Result, Row};

use crate::connection::Connection;
use crate::statement::Statement;

/// What kind of result the server returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// The query returned nothing.
    Void,
    /// The query returned rows.
    Rows,
    /// The keyspace has been switched.
    SetKeyspace,
}

/// The decoded result of one request.
///
/// Rows are buffered in server order and accessible by index; results of
/// other kinds simply have no rows. Warnings the server attached to the
/// response are carried alongside.
#[derive(Debug)]
pub struct QueryResult {
    kind: ResultKind,
    columns: Arc<Vec<Column>>,
    rows: Vec<Row>,
    keyspace: Option<String>,
    paging_state: Option<Vec<u8>>,
    has_more_pages: bool,
    warnings: Vec<String>,
}

impl QueryResult {
    pub(crate) fn from_body(body: ResultBody, warnings: Vec<String>) -> Result<Self> {
        match body {
            ResultBody::Void => Ok(Self {
                kind: ResultKind::Void,
                columns: Arc::new(Vec::new()),
                rows: Vec::new(),
                keyspace: None,
                paging_state: None,
                has_more_pages: false,
                warnings,
            }),
            ResultBody::Rows(page) => Ok(Self {
                kind: ResultKind::Rows,
                has_more_pages: page.has_more_pages(),
                columns: page.columns,
                rows: page.rows,
                keyspace: None,
                paging_state: page.paging_state,
                warnings,
            }),
            ResultBody::SetKeyspace(keyspace) => Ok(Self {
                kind: ResultKind::SetKeyspace,
                columns: Arc::new(Vec::new()),
                rows: Vec::new(),
                keyspace: Some(keyspace),
                paging_state: None,
                has_more_pages: false,
                warnings,
            }),
            ResultBody::Prepared(_) => Err(CassandraError::Protocol(
                "unexpected prepared result for a query".to_string(),
            )),
        }
    }

    /// Returns the kind of result the server sent.
    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    /// Returns the number of buffered rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the result holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row at the given index.
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Returns the buffered rows in server order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consumes the result, returning its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Returns the result columns. Useful for caching a result shape and
    /// skipping server metadata on later requests.
    pub fn columns(&self) -> &Arc<Vec<Column>> {
        &self.columns
    }

    /// The keyspace switched to, for set-keyspace results.
    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    /// Warnings the server attached to the response.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns true if the server signaled that more pages exist.
    pub fn has_more_pages(&self) -> bool {
        self.has_more_pages
    }

    /// The cursor for the next page, when the server signaled one.
    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }
}

impl Index<usize> for QueryResult {
    type Output = Row;

    fn index(&self, index: usize) -> &Self::Output {
        &self.rows[index]
    }
}

/// A forward-only cursor over every page of a result.
///
/// Yields buffered rows first; when the server signaled more pages, it
/// transparently re-issues the statement with the returned paging cursor
/// (and the cached columns, so the server skips metadata) until no more
/// pages are signaled. The underlying statement never changes; this
/// cursor alone advances. Single-pass and not restartable.
#[derive(Debug)]
pub struct Pager {
    connection: Connection,
    statement: Statement,
    columns: Arc<Vec<Column>>,
    buffered: VecDeque<Row>,
    paging_state: Option<Vec<u8>>,
    has_more_pages: bool,
}

impl Pager {
    pub(crate) fn new(connection: Connection, statement: Statement, first: QueryResult) -> Self {
        Self {
            connection,
            statement,
            has_more_pages: first.has_more_pages,
            paging_state: first.paging_state.clone(),
            columns: Arc::clone(&first.columns),
            buffered: first.rows.into(),
        }
    }

    /// Returns true if unread rows remain buffered or the server signaled
    /// further pages.
    pub fn has_more(&self) -> bool {
        !self.buffered.is_empty() || self.has_more_pages
    }

    /// Returns the next row, fetching the next page when the buffer runs
    /// dry. Returns `None` once every page is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffered.pop_front() {
                return Ok(Some(row));
            }
            if !self.has_more_pages {
                return Ok(None);
            }
            self.fetch_next_page().await?;
        }
    }

    /// Collects every remaining row across all pages.
    pub async fn collect(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(self.buffered.len());
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        let cursor = self.paging_state.take().ok_or_else(|| {
            CassandraError::Protocol(
                "server signaled more pages without a paging state".to_string(),
            )
        })?;
        let follow_up = self.statement.next_page(cursor, Arc::clone(&self.columns));
        let result = self.connection.query(&follow_up).await?;

        self.has_more_pages = result.has_more_pages;
        self.paging_state = result.paging_state;
        self.buffered.extend(result.rows);
        Ok(())
    }
}
