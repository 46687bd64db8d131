//! Serialization trait shared by every request body and frame component.

use super::CqlWriter;
use crate::error::Result;

/// Trait for values that can be written in the protocol's binary format.
///
/// Implementors must uphold the exact-size contract: `serialize` writes
/// precisely `size_of` bytes. Callers rely on this to pre-size output
/// buffers and to fill in frame body lengths before the body is written.
pub trait CqlSerializable {
    /// Serializes this value to the given writer.
    fn serialize(&self, out: &mut CqlWriter) -> Result<()>;

    /// Returns the exact number of bytes `serialize` will write.
    fn size_of(&self) -> usize;

    /// Convenience method: serializes this value to a fresh buffer.
    fn to_bytes(&self) -> Result<Vec<u8>>
    where
        Self: Sized,
    {
        let mut out = CqlWriter::with_capacity(self.size_of());
        self.serialize(&mut out)?;
        Ok(out.into_bytes().to_vec())
    }
}
