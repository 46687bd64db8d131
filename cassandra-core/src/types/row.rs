//! A decoded result row.

use std::collections::HashMap;
use std::ops::Index;

use super::column::Column;
use super::column_type::ColumnType;
use super::value::CqlValue;
use crate::error::{CassandraError, Result};
use crate::serialization::CqlReader;

/// An ordered mapping from column name to decoded value.
///
/// One row is produced per server-returned record; rows are immutable
/// once constructed and owned by the result that contains them.
#[derive(Debug, Clone)]
pub struct Row {
    entries: Vec<(String, CqlValue)>,
    index: HashMap<String, usize>,
}

impl Row {
    /// Decodes one row by parsing each column's value in declared order.
    pub fn decode(reader: &mut CqlReader<'_>, columns: &[Column]) -> Result<Self> {
        let mut row = Self::with_capacity(columns.len());
        for column in columns {
            let value = CqlValue::decode(reader, &column.column_type)?;
            row.insert(column.name.clone(), value)?;
        }
        Ok(row)
    }

    /// Decodes a nested row from a user-defined type's field list.
    pub fn decode_fields(
        reader: &mut CqlReader<'_>,
        fields: &[(String, ColumnType)],
    ) -> Result<Self> {
        let mut row = Self::with_capacity(fields.len());
        for (name, field_type) in fields {
            let value = CqlValue::decode(reader, field_type)?;
            row.insert(name.clone(), value)?;
        }
        Ok(row)
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    fn insert(&mut self, name: String, value: CqlValue) -> Result<()> {
        if self.index.contains_key(&name) {
            return Err(CassandraError::Protocol(format!(
                "duplicate column name in row: {}",
                name
            )));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
        Ok(())
    }

    /// Returns the value for the given column name.
    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Returns the value at the given column position.
    pub fn get_at(&self, position: usize) -> Option<&CqlValue> {
        self.entries.get(position).map(|(_, value)| value)
    }

    /// Returns the number of columns in the row.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CqlValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Index<&str> for Row {
    type Output = CqlValue;

    fn index(&self, name: &str) -> &Self::Output {
        self.get(name)
            .unwrap_or_else(|| panic!("no column named {:?}", name))
    }
}
