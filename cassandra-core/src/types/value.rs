//! The dynamic value model: decoding column values from the wire and
//! encoding bound parameters back into it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use num_bigint::BigInt;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::column_type::ColumnType;
use super::row::Row;
use crate::error::{CassandraError, Result};
use crate::serialization::CqlReader;

/// Days from year 0 to 1970-01-01 in the proleptic Gregorian calendar.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// The zero point of the wire date encoding: day 2^31 is the epoch day.
const DATE_CENTER: i64 = 1 << 31;

/// A decoded column value or a parameter to bind.
///
/// This is a closed sum type over every wire type the driver understands;
/// decode and encode sites dispatch over it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    /// An explicit null (wire length -1), distinct from empty values.
    Null,
    /// UTF-8 or ASCII text.
    Text(String),
    /// 64-bit signed integer.
    BigInt(i64),
    /// 32-bit signed integer (also carries counter reads).
    Int(i32),
    /// 16-bit signed integer.
    SmallInt(i16),
    /// 8-bit signed integer.
    TinyInt(i8),
    /// 32-bit floating point.
    Float(f32),
    /// 64-bit floating point.
    Double(f64),
    /// Boolean.
    Boolean(bool),
    /// Opaque byte blob.
    Blob(Vec<u8>),
    /// UUID (also carries time-based UUIDs).
    Uuid(Uuid),
    /// Milliseconds since the epoch.
    Timestamp(DateTime<Utc>),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day (also usable as a duration parameter).
    Time(Duration),
    /// IPv4 or IPv6 address.
    Inet(IpAddr),
    /// Arbitrary-precision integer.
    Varint(BigInt),
    /// Arbitrary-precision decimal.
    Decimal(Decimal),
    /// Ordered list, preserving duplicates.
    List(Vec<CqlValue>),
    /// Set with duplicates removed by value equality.
    Set(Vec<CqlValue>),
    /// Map with unique keys, in wire order.
    Map(Vec<(CqlValue, CqlValue)>),
    /// User-defined type value, a nested row.
    Udt(Row),
    /// Heterogeneous ordered tuple.
    Tuple(Vec<CqlValue>),
}

impl CqlValue {
    /// Decodes one value: a 32-bit length (negative means null) followed
    /// by a payload interpreted per the descriptor. Every branch leaves
    /// the cursor at the first unconsumed byte.
    pub fn decode(reader: &mut CqlReader<'_>, column_type: &ColumnType) -> Result<Self> {
        let length = reader.read_i32()?;
        if length < 0 {
            return Ok(Self::Null);
        }
        let length = length as usize;

        match column_type {
            ColumnType::Custom => Err(CassandraError::Protocol(
                "custom column types are not supported".to_string(),
            )),
            ColumnType::Ascii | ColumnType::Varchar => {
                let bytes = reader.read_raw(length)?;
                Ok(Self::Text(String::from_utf8_lossy(bytes).into_owned()))
            }
            ColumnType::Bigint => Ok(Self::BigInt(reader.read_i64()?)),
            ColumnType::Blob => Ok(Self::Blob(reader.read_raw(length)?.to_vec())),
            ColumnType::Boolean => Ok(Self::Boolean(reader.read_u8()? != 0)),
            ColumnType::Counter => Ok(Self::Int(reader.read_i32()?)),
            ColumnType::Decimal => {
                let scale = reader.read_i32()?;
                if scale < 0 {
                    return Err(CassandraError::Protocol(format!(
                        "negative decimal scale: {}",
                        scale
                    )));
                }
                let unscaled_len = length.checked_sub(4).ok_or_else(|| {
                    CassandraError::Protocol("decimal value shorter than its scale".to_string())
                })?;
                let unscaled = i128_from_be(reader.read_raw(unscaled_len)?)?;
                Decimal::try_from_i128_with_scale(unscaled, scale as u32)
                    .map(Self::Decimal)
                    .map_err(|e| CassandraError::Protocol(format!("invalid decimal value: {}", e)))
            }
            ColumnType::Double => Ok(Self::Double(reader.read_f64()?)),
            ColumnType::Float => Ok(Self::Float(reader.read_f32()?)),
            ColumnType::Int => Ok(Self::Int(reader.read_i32()?)),
            ColumnType::Timestamp => {
                let millis = reader.read_i64()?;
                DateTime::from_timestamp_millis(millis)
                    .map(Self::Timestamp)
                    .ok_or_else(|| {
                        CassandraError::Protocol(format!("timestamp out of range: {}", millis))
                    })
            }
            ColumnType::Uuid => Ok(Self::Uuid(Uuid::from_bytes(reader.read_array()?))),
            ColumnType::Timeuuid => {
                // Byte order reversed before interpretation.
                let mut bytes: [u8; 16] = reader.read_array()?;
                bytes.reverse();
                Ok(Self::Uuid(Uuid::from_bytes(bytes)))
            }
            ColumnType::Varint => Ok(Self::Varint(BigInt::from_signed_bytes_be(
                reader.read_raw(length)?,
            ))),
            ColumnType::Inet => match length {
                4 => {
                    let octets: [u8; 4] = reader.read_array()?;
                    Ok(Self::Inet(IpAddr::V4(Ipv4Addr::from(octets))))
                }
                16 => {
                    let octets: [u8; 16] = reader.read_array()?;
                    Ok(Self::Inet(IpAddr::V6(Ipv6Addr::from(octets))))
                }
                other => Err(CassandraError::Protocol(format!(
                    "invalid inet length: {}",
                    other
                ))),
            },
            ColumnType::Date => {
                let raw = reader.read_u32()?;
                let day = EPOCH_DAYS_FROM_CE + (raw as i64 - DATE_CENTER);
                i32::try_from(day)
                    .ok()
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .map(Self::Date)
                    .ok_or_else(|| {
                        CassandraError::Protocol(format!("date value out of range: {}", raw))
                    })
            }
            ColumnType::Time => {
                let raw = reader.read_i64()?;
                Ok(Self::Time(Duration::nanoseconds(raw.saturating_mul(100))))
            }
            ColumnType::Smallint => Ok(Self::SmallInt(reader.read_i16()?)),
            ColumnType::Tinyint => Ok(Self::TinyInt(reader.read_i8()?)),
            ColumnType::List(element) => {
                let count = read_element_count(reader)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::decode(reader, element)?);
                }
                Ok(Self::List(items))
            }
            ColumnType::Set(element) => {
                let count = read_element_count(reader)?;
                let mut items: Vec<CqlValue> = Vec::with_capacity(count);
                for _ in 0..count {
                    let item = Self::decode(reader, element)?;
                    if !items.contains(&item) {
                        items.push(item);
                    }
                }
                Ok(Self::Set(items))
            }
            ColumnType::Map(key_type, value_type) => {
                let count = read_element_count(reader)?;
                let mut entries: Vec<(CqlValue, CqlValue)> = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = Self::decode(reader, key_type)?;
                    let value = Self::decode(reader, value_type)?;
                    if entries.iter().any(|(existing, _)| *existing == key) {
                        return Err(CassandraError::Protocol(format!(
                            "duplicate map key: {}",
                            key.type_name()
                        )));
                    }
                    entries.push((key, value));
                }
                Ok(Self::Map(entries))
            }
            ColumnType::Udt { fields, .. } => Ok(Self::Udt(Row::decode_fields(reader, fields)?)),
            ColumnType::Tuple(types) => {
                let mut items = Vec::with_capacity(types.len());
                for element_type in types {
                    items.push(Self::decode(reader, element_type)?);
                }
                Ok(Self::Tuple(items))
            }
        }
    }

    /// Encodes this value into the wire form used for bound parameters.
    ///
    /// Only the types a parameter can carry are supported; anything else
    /// fails with an encoding error naming the value's type.
    pub fn to_param_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Text(s) => Ok(s.as_bytes().to_vec()),
            Self::BigInt(v) => Ok(v.to_be_bytes().to_vec()),
            Self::Int(v) => Ok(v.to_be_bytes().to_vec()),
            Self::SmallInt(v) => Ok(v.to_be_bytes().to_vec()),
            Self::TinyInt(v) => Ok(v.to_be_bytes().to_vec()),
            Self::Float(v) => Ok(v.to_be_bytes().to_vec()),
            Self::Double(v) => Ok(v.to_be_bytes().to_vec()),
            Self::Boolean(v) => Ok(vec![u8::from(*v)]),
            Self::Blob(bytes) => Ok(bytes.clone()),
            Self::Uuid(uuid) => Ok(uuid.as_bytes().to_vec()),
            Self::Timestamp(ts) => Ok(ts.timestamp_millis().to_be_bytes().to_vec()),
            Self::Time(duration) => {
                let nanos = duration.num_nanoseconds().ok_or_else(|| {
                    CassandraError::Encoding("duration overflows nanoseconds".to_string())
                })?;
                Ok(nanos.to_be_bytes().to_vec())
            }
            other => Err(CassandraError::Encoding(format!(
                "cannot encode value of type {}",
                other.type_name()
            ))),
        }
    }

    /// Returns whether this value is acceptable for a bind marker of the
    /// given declared type. Custom-typed markers accept anything.
    pub fn matches_type(&self, column_type: &ColumnType) -> bool {
        match (column_type, self) {
            (ColumnType::Custom, _) => true,
            (ColumnType::Ascii | ColumnType::Varchar, Self::Text(_)) => true,
            (ColumnType::Bigint, Self::BigInt(_)) => true,
            (ColumnType::Int | ColumnType::Counter, Self::Int(_)) => true,
            (ColumnType::Smallint, Self::SmallInt(_)) => true,
            (ColumnType::Tinyint, Self::TinyInt(_)) => true,
            (ColumnType::Float, Self::Float(_)) => true,
            (ColumnType::Double, Self::Double(_)) => true,
            (ColumnType::Boolean, Self::Boolean(_)) => true,
            (ColumnType::Blob, Self::Blob(_)) => true,
            (ColumnType::Uuid | ColumnType::Timeuuid, Self::Uuid(_)) => true,
            (ColumnType::Timestamp, Self::Timestamp(_)) => true,
            (ColumnType::Date, Self::Date(_)) => true,
            (ColumnType::Time, Self::Time(_)) => true,
            (ColumnType::Inet, Self::Inet(_)) => true,
            (ColumnType::Varint, Self::Varint(_)) => true,
            (ColumnType::Decimal, Self::Decimal(_)) => true,
            (ColumnType::List(_), Self::List(_)) => true,
            (ColumnType::Set(_), Self::Set(_)) => true,
            (ColumnType::Map(_, _), Self::Map(_)) => true,
            (ColumnType::Udt { .. }, Self::Udt(_)) => true,
            (ColumnType::Tuple(_), Self::Tuple(_)) => true,
            _ => false,
        }
    }

    /// Returns a short name for this value's runtime type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::BigInt(_) => "bigint",
            Self::Int(_) => "int",
            Self::SmallInt(_) => "smallint",
            Self::TinyInt(_) => "tinyint",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::Blob(_) => "blob",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Inet(_) => "inet",
            Self::Varint(_) => "varint",
            Self::Decimal(_) => "decimal",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Udt(_) => "udt",
            Self::Tuple(_) => "tuple",
        }
    }
}

fn read_element_count(reader: &mut CqlReader<'_>) -> Result<usize> {
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(CassandraError::Protocol(format!(
            "negative collection element count: {}",
            count
        )));
    }
    Ok(count as usize)
}

/// Interprets big-endian two's-complement bytes as an `i128`.
fn i128_from_be(bytes: &[u8]) -> Result<i128> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 16 {
        return Err(CassandraError::Protocol(format!(
            "integer value of {} bytes exceeds 128 bits",
            bytes.len()
        )));
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(i128::from_be_bytes(buf))
}
