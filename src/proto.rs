use std::io::{Read, Write};

/// Deserializes `Self` from a byte reader. Message-specific length and type
/// checks are left to the individual wire types in [`crate::wire`]; this
/// trait only carries the byte-level read.
pub trait Decode: Sized {
    type Error;

    fn decode<R>(reader: R) -> Result<Self, Self::Error>
    where
        R: Read;
}

/// Serializes `Self` to a byte writer.
pub trait Encode {
    type Error;

    fn encode<W>(&self, writer: W) -> Result<(), Self::Error>
    where
        W: Write;

    fn encode_to_vec(&self) -> Result<Vec<u8>, Self::Error> {
        let mut buf = Vec::with_capacity(self.size_hint());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Returns a hint about the expected size of `self` requires for encoding. The returned value
    /// is purely a hint and not a guarantee.
    #[inline]
    fn size_hint(&self) -> usize {
        0
    }
}
