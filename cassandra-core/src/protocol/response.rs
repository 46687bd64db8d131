//! Response body decoders: server errors, result kinds, rows metadata
//! and prepared-statement metadata.

use std::sync::Arc;

use super::constants::{
    PREPARED_FLAG_GLOBAL_TABLE_SPEC, RESULT_KIND_PREPARED, RESULT_KIND_ROWS,
    RESULT_KIND_SCHEMA_CHANGE, RESULT_KIND_SET_KEYSPACE, RESULT_KIND_VOID,
    ROWS_FLAG_GLOBAL_TABLE_SPEC, ROWS_FLAG_HAS_MORE_PAGES, ROWS_FLAG_NO_METADATA,
};
use crate::error::{CassandraError, Result};
use crate::serialization::CqlReader;
use crate::types::{Column, ColumnType, Row};

/// The body of an Error frame: a server error code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    /// The server-assigned error code.
    pub code: i32,
    /// The human-readable error message.
    pub message: String,
}

impl ErrorBody {
    /// Decodes an error body.
    pub fn decode(reader: &mut CqlReader<'_>) -> Result<Self> {
        let code = reader.read_i32()?;
        let message = reader.read_string()?;
        Ok(Self { code, message })
    }
}

/// A parameter placeholder in a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BindMarker {
    /// The marker's column name.
    pub name: String,
    /// The keyspace the marker's column belongs to.
    pub keyspace: Option<String>,
    /// The table the marker's column belongs to.
    pub table: Option<String>,
    /// The declared type a bound value must match.
    pub column_type: ColumnType,
    /// Position of this marker within the partition key, or -1 when the
    /// marker is not a partition-key component. The leading component has
    /// index 0 and drives token-aware routing.
    pub partition_key_index: i32,
}

/// A server-parsed statement: its opaque id, the parameter shape and the
/// result shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    /// The server-assigned statement id. Servers assign ids
    /// independently, so an id is only valid on the node that issued it.
    pub id: Vec<u8>,
    /// The parameter placeholders, in order.
    pub bind_markers: Vec<BindMarker>,
    /// The result columns, shared read-only across executions.
    pub columns: Arc<Vec<Column>>,
}

impl Prepared {
    /// Decodes a Prepared result body (after the result-kind tag).
    pub fn decode(reader: &mut CqlReader<'_>) -> Result<Self> {
        let id = reader.read_short_bytes()?;

        let flags = reader.read_i32()?;
        let bind_count = reader.read_i32()?;
        if bind_count < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid bind marker count: {}",
                bind_count
            )));
        }
        let pk_count = reader.read_i32()?;
        if pk_count < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid partition key count: {}",
                pk_count
            )));
        }
        let mut pk_indexes = Vec::with_capacity(pk_count as usize);
        for _ in 0..pk_count {
            pk_indexes.push(reader.read_i16()?);
        }

        let global = flags & PREPARED_FLAG_GLOBAL_TABLE_SPEC != 0;
        let (global_keyspace, global_table) = if global {
            (Some(reader.read_string()?), Some(reader.read_string()?))
        } else {
            (None, None)
        };

        let mut bind_markers = Vec::with_capacity(bind_count as usize);
        for i in 0..bind_count {
            let spec = Column::decode(reader, !global)?;
            let partition_key_index = pk_indexes
                .iter()
                .position(|&pk| pk as i32 == i)
                .map_or(-1, |p| p as i32);
            bind_markers.push(BindMarker {
                name: spec.name,
                keyspace: spec.keyspace.or_else(|| global_keyspace.clone()),
                table: spec.table.or_else(|| global_table.clone()),
                column_type: spec.column_type,
                partition_key_index,
            });
        }

        let metadata = RowsMetadata::decode(reader, None)?;

        Ok(Self {
            id,
            bind_markers,
            columns: metadata.columns,
        })
    }
}

/// The metadata section that precedes rows (and closes a Prepared body):
/// response flags, column count, optional paging state, optional global
/// table spec and the per-column specs.
#[derive(Debug)]
struct RowsMetadata {
    flags: i32,
    columns: Arc<Vec<Column>>,
    paging_state: Option<Vec<u8>>,
}

impl RowsMetadata {
    fn decode(
        reader: &mut CqlReader<'_>,
        pre_columns: Option<Arc<Vec<Column>>>,
    ) -> Result<Self> {
        let flags = reader.read_i32()?;
        let column_count = reader.read_i32()?;
        if column_count < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid column count: {}",
                column_count
            )));
        }

        let paging_state = if flags & ROWS_FLAG_HAS_MORE_PAGES != 0 {
            reader.read_bytes()?
        } else {
            None
        };

        let global = flags & ROWS_FLAG_GLOBAL_TABLE_SPEC != 0;
        let (global_keyspace, global_table) = if global {
            (Some(reader.read_string()?), Some(reader.read_string()?))
        } else {
            (None, None)
        };

        let columns = if flags & ROWS_FLAG_NO_METADATA != 0 {
            pre_columns.ok_or_else(|| {
                CassandraError::Protocol(
                    "column metadata omitted without cached columns".to_string(),
                )
            })?
        } else {
            let mut columns = Vec::with_capacity(column_count as usize);
            for _ in 0..column_count {
                let mut column = Column::decode(reader, !global)?;
                if global {
                    column.keyspace.clone_from(&global_keyspace);
                    column.table.clone_from(&global_table);
                }
                columns.push(column);
            }
            Arc::new(columns)
        };

        Ok(Self {
            flags,
            columns,
            paging_state,
        })
    }
}

/// One page of a Rows result.
#[derive(Debug)]
pub struct RowsPage {
    /// The response-metadata flags.
    pub flags: i32,
    /// The result columns, either freshly parsed or caller-supplied.
    pub columns: Arc<Vec<Column>>,
    /// The decoded rows, in server order.
    pub rows: Vec<Row>,
    /// The cursor for the next page, when the server signaled one.
    pub paging_state: Option<Vec<u8>>,
}

impl RowsPage {
    /// Returns true if the server signaled that more pages exist.
    pub fn has_more_pages(&self) -> bool {
        self.flags & ROWS_FLAG_HAS_MORE_PAGES != 0
    }

    fn decode(reader: &mut CqlReader<'_>, pre_columns: Option<Arc<Vec<Column>>>) -> Result<Self> {
        let metadata = RowsMetadata::decode(reader, pre_columns)?;

        let row_count = reader.read_i32()?;
        if row_count < 0 {
            return Err(CassandraError::Protocol(format!(
                "invalid row count: {}",
                row_count
            )));
        }
        let mut rows = Vec::with_capacity(row_count as usize);
        for _ in 0..row_count {
            rows.push(Row::decode(reader, &metadata.columns)?);
        }

        Ok(Self {
            flags: metadata.flags,
            columns: metadata.columns,
            rows,
            paging_state: metadata.paging_state,
        })
    }
}

/// A decoded Result frame body.
#[derive(Debug)]
pub enum ResultBody {
    /// The query returned nothing.
    Void,
    /// The query returned rows.
    Rows(RowsPage),
    /// The keyspace has been switched.
    SetKeyspace(String),
    /// A statement has been prepared.
    Prepared(Prepared),
}

impl ResultBody {
    /// Decodes a Result body from its leading kind tag.
    ///
    /// `pre_columns` resolves the skip-metadata case: when the request was
    /// sent with cached columns, the server omits metadata and the cached
    /// shape is used instead.
    pub fn decode(body: &[u8], pre_columns: Option<Arc<Vec<Column>>>) -> Result<Self> {
        let mut reader = CqlReader::new(body);
        let kind = reader.read_i32()?;
        match kind {
            RESULT_KIND_VOID => Ok(Self::Void),
            RESULT_KIND_ROWS => Ok(Self::Rows(RowsPage::decode(&mut reader, pre_columns)?)),
            RESULT_KIND_SET_KEYSPACE => Ok(Self::SetKeyspace(reader.read_string()?)),
            RESULT_KIND_PREPARED => Ok(Self::Prepared(Prepared::decode(&mut reader)?)),
            RESULT_KIND_SCHEMA_CHANGE => Err(CassandraError::Protocol(
                "schema change results are not supported".to_string(),
            )),
            other => Err(CassandraError::Protocol(format!(
                "unknown result kind: {}",
                other
            ))),
        }
    }
}
