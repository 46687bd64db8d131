//! Request body serializers for Startup, Query, Execute and Prepare.

use std::collections::HashMap;

use super::constants::{
    Consistency, QUERY_FLAG_PAGE_SIZE, QUERY_FLAG_SKIP_METADATA, QUERY_FLAG_VALUES,
    QUERY_FLAG_WITH_NAMES_FOR_VALUES, QUERY_FLAG_WITH_PAGING_STATE, STARTUP_CQL_VERSION,
    STARTUP_CQL_VERSION_KEY,
};
use crate::error::Result;
use crate::serialization::writer::{
    bytes_size, long_string_size, short_bytes_size, string_map_size, string_size,
};
use crate::serialization::{CqlSerializable, CqlWriter};
use crate::types::CqlValue;

/// The Startup body: a string map of connection options.
#[derive(Debug)]
pub struct StartupRequest {
    options: HashMap<String, String>,
}

impl StartupRequest {
    /// Creates a startup request negotiating the supported CQL version.
    pub fn new() -> Self {
        let mut options = HashMap::new();
        options.insert(
            STARTUP_CQL_VERSION_KEY.to_string(),
            STARTUP_CQL_VERSION.to_string(),
        );
        Self { options }
    }
}

impl Default for StartupRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl CqlSerializable for StartupRequest {
    fn serialize(&self, out: &mut CqlWriter) -> Result<()> {
        out.write_string_map(&self.options)
    }

    fn size_of(&self) -> usize {
        string_map_size(&self.options)
    }
}

/// The flag-driven tail shared by Query and Execute bodies: consistency,
/// flags, optional values, optional page size, optional paging state.
///
/// Parameter values are wire-encoded up front so that `size_of` is exact
/// and encoding failures surface before any bytes hit the socket.
#[derive(Debug)]
pub struct QueryParameters<'a> {
    consistency: Consistency,
    values: Vec<(Option<String>, Vec<u8>)>,
    named: bool,
    skip_metadata: bool,
    page_size: Option<i32>,
    paging_state: Option<&'a [u8]>,
}

impl<'a> QueryParameters<'a> {
    /// Builds parameters with positional values.
    pub fn positional(
        consistency: Consistency,
        values: &[CqlValue],
        skip_metadata: bool,
        page_size: Option<i32>,
        paging_state: Option<&'a [u8]>,
    ) -> Result<Self> {
        let mut encoded = Vec::with_capacity(values.len());
        for value in values {
            encoded.push((None, value.to_param_bytes()?));
        }
        Ok(Self {
            consistency,
            values: encoded,
            named: false,
            skip_metadata,
            page_size,
            paging_state,
        })
    }

    /// Builds parameters with named values.
    pub fn named(
        consistency: Consistency,
        values: &[(String, CqlValue)],
        skip_metadata: bool,
        page_size: Option<i32>,
        paging_state: Option<&'a [u8]>,
    ) -> Result<Self> {
        let mut encoded = Vec::with_capacity(values.len());
        for (name, value) in values {
            encoded.push((Some(name.clone()), value.to_param_bytes()?));
        }
        Ok(Self {
            consistency,
            values: encoded,
            named: true,
            skip_metadata,
            page_size,
            paging_state,
        })
    }

    /// Returns the flags byte implied by the populated fields.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if !self.values.is_empty() {
            flags |= QUERY_FLAG_VALUES;
        }
        if self.named && !self.values.is_empty() {
            flags |= QUERY_FLAG_WITH_NAMES_FOR_VALUES;
        }
        if self.skip_metadata {
            flags |= QUERY_FLAG_SKIP_METADATA;
        }
        if self.page_size.is_some() {
            flags |= QUERY_FLAG_PAGE_SIZE;
        }
        if self.paging_state.is_some() {
            flags |= QUERY_FLAG_WITH_PAGING_STATE;
        }
        flags
    }
}

impl CqlSerializable for QueryParameters<'_> {
    fn serialize(&self, out: &mut CqlWriter) -> Result<()> {
        out.write_u16(self.consistency.value());
        out.write_u8(self.flags());
        if !self.values.is_empty() {
            out.write_i16(self.values.len() as i16);
            for (name, bytes) in &self.values {
                if let Some(name) = name {
                    out.write_string(name)?;
                }
                out.write_bytes(Some(bytes))?;
            }
        }
        if let Some(page_size) = self.page_size {
            out.write_i32(page_size);
        }
        if let Some(paging_state) = self.paging_state {
            out.write_bytes(Some(paging_state))?;
        }
        Ok(())
    }

    fn size_of(&self) -> usize {
        let mut size = 2 + 1;
        if !self.values.is_empty() {
            size += 2;
            for (name, bytes) in &self.values {
                if let Some(name) = name {
                    size += string_size(name);
                }
                size += bytes_size(Some(bytes));
            }
        }
        if self.page_size.is_some() {
            size += 4;
        }
        if let Some(paging_state) = self.paging_state {
            size += bytes_size(Some(paging_state));
        }
        size
    }
}

/// The Query body: a long-string query followed by [`QueryParameters`].
#[derive(Debug)]
pub struct QueryRequest<'a> {
    /// The CQL text to execute.
    pub query: &'a str,
    /// The flag-driven parameter tail.
    pub parameters: QueryParameters<'a>,
}

impl CqlSerializable for QueryRequest<'_> {
    fn serialize(&self, out: &mut CqlWriter) -> Result<()> {
        out.write_long_string(self.query)?;
        self.parameters.serialize(out)
    }

    fn size_of(&self) -> usize {
        long_string_size(self.query) + self.parameters.size_of()
    }
}

/// The Execute body: a short-bytes prepared id followed by
/// [`QueryParameters`].
#[derive(Debug)]
pub struct ExecuteRequest<'a> {
    /// The server-assigned prepared statement id.
    pub id: &'a [u8],
    /// The flag-driven parameter tail.
    pub parameters: QueryParameters<'a>,
}

impl CqlSerializable for ExecuteRequest<'_> {
    fn serialize(&self, out: &mut CqlWriter) -> Result<()> {
        out.write_short_bytes(self.id)?;
        self.parameters.serialize(out)
    }

    fn size_of(&self) -> usize {
        short_bytes_size(self.id) + self.parameters.size_of()
    }
}

/// The Prepare body: just the long-string query to parse.
#[derive(Debug)]
pub struct PrepareRequest<'a> {
    /// The CQL text to prepare.
    pub query: &'a str,
}

impl CqlSerializable for PrepareRequest<'_> {
    fn serialize(&self, out: &mut CqlWriter) -> Result<()> {
        out.write_long_string(self.query)
    }

    fn size_of(&self) -> usize {
        long_string_size(self.query)
    }
}
