//! Result column metadata.

use super::column_type::ColumnType;
use crate::error::Result;
use crate::serialization::CqlReader;

/// Metadata for one column of a result set or prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// The column name, unique within a result.
    pub name: String,
    /// The keyspace owning the column, when the server sent one.
    pub keyspace: Option<String>,
    /// The table owning the column, when the server sent one.
    pub table: Option<String>,
    /// The column's wire type descriptor.
    pub column_type: ColumnType,
}

impl Column {
    /// Creates column metadata by hand, e.g. for caching result shapes.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            keyspace: None,
            table: None,
            column_type,
        }
    }

    /// Decodes one column spec. When `with_table_spec` is set the column
    /// carries its own keyspace and table names before the column name;
    /// otherwise the metadata's global spec applies.
    pub fn decode(reader: &mut CqlReader<'_>, with_table_spec: bool) -> Result<Self> {
        let (keyspace, table) = if with_table_spec {
            (Some(reader.read_string()?), Some(reader.read_string()?))
        } else {
            (None, None)
        };
        let name = reader.read_string()?;
        let column_type = ColumnType::decode(reader)?;
        Ok(Self {
            name,
            keyspace,
            table,
            column_type,
        })
    }
}
