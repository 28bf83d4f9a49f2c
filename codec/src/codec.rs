//! Core codec traits

use crate::error::Error;
use bytes::{Buf, BufMut, BytesMut};

/// Trait for types that can be written (encoded) to a buffer.
pub trait Write {
    /// Encodes this value by writing to a buffer.
    ///
    /// Implementations should panic if the buffer doesn't have enough capacity.
    fn write(&self, buf: &mut impl BufMut);
}

/// Trait for types that know how many bytes [Write::write] will produce.
pub trait EncodeSize {
    /// Returns the encoded length of this value.
    ///
    /// This method MUST return the exact number of bytes that will be written by `write()`.
    fn encode_size(&self) -> usize;
}

/// Trait for types that can be read (decoded) from a buffer.
pub trait Read: Sized {
    /// Reads a value from the buffer, consuming the necessary bytes.
    ///
    /// Returns an error if decoding fails (e.g., invalid data, not enough bytes).
    fn read(buf: &mut impl Buf) -> Result<Self, Error>;
}

/// Trait for types that can be encoded to a standalone buffer.
pub trait Encode: Write + EncodeSize {
    /// Encodes a value to a `BytesMut` buffer sized exactly for it.
    ///
    /// # Panics
    ///
    /// Panics if the `write` implementation does not write the expected number of bytes, or if
    /// a length-prefixed value is longer than `u32::MAX`.
    fn encode(&self) -> BytesMut {
        let len = self.encode_size();
        let mut buffer = BytesMut::with_capacity(len);
        self.write(&mut buffer);
        assert_eq!(buffer.len(), len, "write() did not write expected bytes");
        buffer
    }
}

impl<T: Write + EncodeSize> Encode for T {}

/// Trait for types that can be decoded from a buffer, ensuring the entire buffer is consumed.
pub trait Decode: Read {
    /// Decodes a value from a buffer, failing if any bytes are left over.
    fn decode(mut buf: impl Buf) -> Result<Self, Error> {
        let result = Self::read(&mut buf)?;
        let remaining = buf.remaining();
        if remaining > 0 {
            return Err(Error::ExtraData(remaining));
        }
        Ok(result)
    }
}

impl<T: Read> Decode for T {}
