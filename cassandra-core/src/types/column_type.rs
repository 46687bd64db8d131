//! The recursive column-type descriptor sent inline with result metadata.

use crate::error::{CassandraError, Result};
use crate::serialization::CqlReader;

/// A column's wire type, as described by the server's result metadata.
///
/// Composite kinds own their nested descriptors outright; the wire format
/// is strictly nested and finite, so the tree has no cycles. A descriptor
/// is parsed once per metadata response and shared read-only across all
/// rows of that result.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    /// A server-side custom type. The driver cannot decode its values.
    Custom,
    /// ASCII text.
    Ascii,
    /// 64-bit signed integer.
    Bigint,
    /// Opaque byte blob.
    Blob,
    /// Boolean.
    Boolean,
    /// Distributed counter.
    Counter,
    /// Arbitrary-precision decimal.
    Decimal,
    /// 64-bit floating point.
    Double,
    /// 32-bit floating point.
    Float,
    /// 32-bit signed integer.
    Int,
    /// Milliseconds since the epoch.
    Timestamp,
    /// RFC-4122 UUID.
    Uuid,
    /// UTF-8 text.
    Varchar,
    /// Arbitrary-precision integer.
    Varint,
    /// Time-based UUID.
    Timeuuid,
    /// IPv4 or IPv6 address.
    Inet,
    /// Day count centered on the epoch.
    Date,
    /// Nanoseconds since midnight.
    Time,
    /// 16-bit signed integer.
    Smallint,
    /// 8-bit signed integer.
    Tinyint,
    /// Ordered list of one nested type.
    List(Box<ColumnType>),
    /// Key/value map of two nested types.
    Map(Box<ColumnType>, Box<ColumnType>),
    /// Unique set of one nested type.
    Set(Box<ColumnType>),
    /// User-defined type: a named, ordered list of typed fields.
    Udt {
        /// The keyspace the type is declared in.
        keyspace: String,
        /// The type's name.
        name: String,
        /// The type's fields, in declaration order.
        fields: Vec<(String, ColumnType)>,
    },
    /// Heterogeneous ordered tuple.
    Tuple(Vec<ColumnType>),
}

impl ColumnType {
    /// Parses a descriptor from the cursor, recursing into composites.
    pub fn decode(reader: &mut CqlReader<'_>) -> Result<Self> {
        let tag = reader.read_u16()?;
        match tag {
            0x00 => Ok(Self::Custom),
            0x01 => Ok(Self::Ascii),
            0x02 => Ok(Self::Bigint),
            0x03 => Ok(Self::Blob),
            0x04 => Ok(Self::Boolean),
            0x05 => Ok(Self::Counter),
            0x06 => Ok(Self::Decimal),
            0x07 => Ok(Self::Double),
            0x08 => Ok(Self::Float),
            0x09 => Ok(Self::Int),
            0x0B => Ok(Self::Timestamp),
            0x0C => Ok(Self::Uuid),
            0x0D => Ok(Self::Varchar),
            0x0E => Ok(Self::Varint),
            0x0F => Ok(Self::Timeuuid),
            0x10 => Ok(Self::Inet),
            0x11 => Ok(Self::Date),
            0x12 => Ok(Self::Time),
            0x13 => Ok(Self::Smallint),
            0x14 => Ok(Self::Tinyint),
            0x20 => Ok(Self::List(Box::new(Self::decode(reader)?))),
            0x21 => {
                let key = Self::decode(reader)?;
                let value = Self::decode(reader)?;
                Ok(Self::Map(Box::new(key), Box::new(value)))
            }
            0x22 => Ok(Self::Set(Box::new(Self::decode(reader)?))),
            0x30 => {
                let keyspace = reader.read_string()?;
                let name = reader.read_string()?;
                let field_count = reader.read_i16()?;
                if field_count < 0 {
                    return Err(CassandraError::Protocol(format!(
                        "invalid UDT field count: {}",
                        field_count
                    )));
                }
                let mut fields = Vec::with_capacity(field_count as usize);
                for _ in 0..field_count {
                    let field_name = reader.read_string()?;
                    let field_type = Self::decode(reader)?;
                    fields.push((field_name, field_type));
                }
                Ok(Self::Udt {
                    keyspace,
                    name,
                    fields,
                })
            }
            0x31 => {
                let count = reader.read_i16()?;
                if count < 0 {
                    return Err(CassandraError::Protocol(format!(
                        "invalid tuple element count: {}",
                        count
                    )));
                }
                let mut types = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    types.push(Self::decode(reader)?);
                }
                Ok(Self::Tuple(types))
            }
            other => Err(CassandraError::Protocol(format!(
                "unknown column type tag: 0x{:04X}",
                other
            ))),
        }
    }

    /// Returns a short name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Ascii => "ascii",
            Self::Bigint => "bigint",
            Self::Blob => "blob",
            Self::Boolean => "boolean",
            Self::Counter => "counter",
            Self::Decimal => "decimal",
            Self::Double => "double",
            Self::Float => "float",
            Self::Int => "int",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::Varchar => "varchar",
            Self::Varint => "varint",
            Self::Timeuuid => "timeuuid",
            Self::Inet => "inet",
            Self::Date => "date",
            Self::Time => "time",
            Self::Smallint => "smallint",
            Self::Tinyint => "tinyint",
            Self::List(_) => "list",
            Self::Map(_, _) => "map",
            Self::Set(_) => "set",
            Self::Udt { .. } => "udt",
            Self::Tuple(_) => "tuple",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::CqlWriter;

    fn decode_all(bytes: &[u8]) -> ColumnType {
        let mut reader = CqlReader::new(bytes);
        let ty = ColumnType::decode(&mut reader).unwrap();
        assert!(reader.is_exhausted(), "descriptor left unconsumed bytes");
        ty
    }

    #[test]
    fn test_scalar_tags() {
        assert_eq!(decode_all(&[0x00, 0x02]), ColumnType::Bigint);
        assert_eq!(decode_all(&[0x00, 0x0D]), ColumnType::Varchar);
        assert_eq!(decode_all(&[0x00, 0x14]), ColumnType::Tinyint);
        assert_eq!(decode_all(&[0x00, 0x10]), ColumnType::Inet);
    }

    #[test]
    fn test_list_of_int() {
        let ty = decode_all(&[0x00, 0x20, 0x00, 0x09]);
        assert_eq!(ty, ColumnType::List(Box::new(ColumnType::Int)));
    }

    #[test]
    fn test_map_of_text_to_bigint() {
        let ty = decode_all(&[0x00, 0x21, 0x00, 0x0D, 0x00, 0x02]);
        assert_eq!(
            ty,
            ColumnType::Map(Box::new(ColumnType::Varchar), Box::new(ColumnType::Bigint))
        );
    }

    #[test]
    fn test_set_of_set_of_uuid() {
        let ty = decode_all(&[0x00, 0x22, 0x00, 0x22, 0x00, 0x0C]);
        assert_eq!(
            ty,
            ColumnType::Set(Box::new(ColumnType::Set(Box::new(ColumnType::Uuid))))
        );
    }

    #[test]
    fn test_udt_descriptor() {
        let mut w = CqlWriter::new();
        w.write_u16(0x30);
        w.write_string("ks").unwrap();
        w.write_string("address").unwrap();
        w.write_i16(2);
        w.write_string("street").unwrap();
        w.write_u16(0x0D);
        w.write_string("zip").unwrap();
        w.write_u16(0x09);

        let ty = decode_all(w.as_bytes());
        assert_eq!(
            ty,
            ColumnType::Udt {
                keyspace: "ks".to_string(),
                name: "address".to_string(),
                fields: vec![
                    ("street".to_string(), ColumnType::Varchar),
                    ("zip".to_string(), ColumnType::Int),
                ],
            }
        );
    }

    #[test]
    fn test_tuple_descriptor() {
        let ty = decode_all(&[0x00, 0x31, 0x00, 0x02, 0x00, 0x0D, 0x00, 0x09]);
        assert_eq!(
            ty,
            ColumnType::Tuple(vec![ColumnType::Varchar, ColumnType::Int])
        );
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut reader = CqlReader::new(&[0x00, 0x7F]);
        assert!(ColumnType::decode(&mut reader).is_err());
    }
}
