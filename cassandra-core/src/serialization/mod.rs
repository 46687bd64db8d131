//! Binary primitive codec for the protocol's notation types.
//!
//! All multi-byte values on the wire are big-endian. Strings come in two
//! sizes: `[string]` with a 16-bit length prefix and `[long string]` with
//! a 32-bit prefix. `[bytes]` values use a 32-bit length where `-1` means
//! null (distinct from a zero-length value).

mod reader;
mod traits;
pub(crate) mod writer;

pub use reader::CqlReader;
pub use traits::CqlSerializable;
pub use writer::CqlWriter;
