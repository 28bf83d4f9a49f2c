//! Implementations of the codec traits for common types
//!
//! Every variable-length value is prefixed by its length as a big-endian `u32`. This keeps
//! the encoding unambiguous when values are concatenated (for example, an empty proposer
//! followed by a public key cannot be confused with a longer proposer).
//!
//! Encoding a value whose length does not fit in a `u32` panics.

use crate::{EncodeSize, Error, Read, Write};
use bytes::{Buf, BufMut, Bytes};
use std::collections::BTreeMap;

/// Size of the length prefix written before variable-length values.
pub const LENGTH_PREFIX: usize = 4;

macro_rules! impl_primitive {
    ($type:ty, $get:ident, $put:ident) => {
        impl Write for $type {
            #[inline]
            fn write(&self, buf: &mut impl BufMut) {
                buf.$put(*self);
            }
        }

        impl EncodeSize for $type {
            #[inline]
            fn encode_size(&self) -> usize {
                std::mem::size_of::<$type>()
            }
        }

        impl Read for $type {
            #[inline]
            fn read(buf: &mut impl Buf) -> Result<Self, Error> {
                if buf.remaining() < std::mem::size_of::<$type>() {
                    return Err(Error::EndOfBuffer);
                }
                Ok(buf.$get())
            }
        }
    };
}

impl_primitive!(u8, get_u8, put_u8);
impl_primitive!(u16, get_u16, put_u16);
impl_primitive!(u32, get_u32, put_u32);
impl_primitive!(u64, get_u64, put_u64);
impl_primitive!(i32, get_i32, put_i32);
impl_primitive!(i64, get_i64, put_i64);

impl Write for bool {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(u8::from(*self));
    }
}

impl EncodeSize for bool {
    #[inline]
    fn encode_size(&self) -> usize {
        1
    }
}

impl Read for bool {
    #[inline]
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        match u8::read(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::InvalidBool),
        }
    }
}

/// Writes a length prefix.
///
/// # Panics
///
/// Panics if `len` does not fit in a `u32`. Callers that accept unbounded input must bound it
/// before encoding.
fn write_len(len: usize, buf: &mut impl BufMut) {
    assert!(len <= u32::MAX as usize, "length exceeds u32::MAX");
    buf.put_u32(len as u32);
}

/// Reads a length prefix and checks that at least `min_each * len` bytes remain.
fn read_len(buf: &mut impl Buf, min_each: usize) -> Result<usize, Error> {
    let len = u32::read(buf)? as usize;
    if len.saturating_mul(min_each) > buf.remaining() {
        return Err(Error::EndOfBuffer);
    }
    Ok(len)
}

impl Write for Bytes {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.len(), buf);
        buf.put_slice(self);
    }
}

impl EncodeSize for Bytes {
    #[inline]
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX + self.len()
    }
}

impl Read for Bytes {
    #[inline]
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        let len = read_len(buf, 1)?;
        Ok(buf.copy_to_bytes(len))
    }
}

impl Write for String {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.len(), buf);
        buf.put_slice(self.as_bytes());
    }
}

impl EncodeSize for String {
    #[inline]
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX + self.len()
    }
}

impl Read for String {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        let raw = Bytes::read(buf)?;
        String::from_utf8(raw.to_vec()).map_err(|_| Error::InvalidUtf8)
    }
}

impl<const N: usize> Write for [u8; N] {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(self);
    }
}

impl<const N: usize> EncodeSize for [u8; N] {
    #[inline]
    fn encode_size(&self) -> usize {
        N
    }
}

impl<const N: usize> Read for [u8; N] {
    #[inline]
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < N {
            return Err(Error::EndOfBuffer);
        }
        let mut array = [0u8; N];
        buf.copy_to_slice(&mut array);
        Ok(array)
    }
}

impl<T: Write> Write for Option<T> {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Some(inner) => {
                buf.put_u8(1);
                inner.write(buf);
            }
            None => buf.put_u8(0),
        }
    }
}

impl<T: EncodeSize> EncodeSize for Option<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        1 + self.as_ref().map_or(0, EncodeSize::encode_size)
    }
}

impl<T: Read> Read for Option<T> {
    #[inline]
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        match u8::read(buf)? {
            0 => Ok(None),
            1 => Ok(Some(T::read(buf)?)),
            tag => Err(Error::InvalidTag(tag)),
        }
    }
}

impl<T: Write> Write for Vec<T> {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.len(), buf);
        for item in self {
            item.write(buf);
        }
    }
}

impl<T: EncodeSize> EncodeSize for Vec<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX + self.iter().map(EncodeSize::encode_size).sum::<usize>()
    }
}

impl<T: Read> Read for Vec<T> {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        // Every element occupies at least one byte, which bounds the allocation.
        let len = read_len(buf, 1)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::read(buf)?);
        }
        Ok(items)
    }
}

impl<K: Write, V: Write> Write for BTreeMap<K, V> {
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.len(), buf);
        for (key, value) in self {
            key.write(buf);
            value.write(buf);
        }
    }
}

impl<K: EncodeSize, V: EncodeSize> EncodeSize for BTreeMap<K, V> {
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX
            + self
                .iter()
                .map(|(key, value)| key.encode_size() + value.encode_size())
                .sum::<usize>()
    }
}

impl<K: Read + Ord, V: Read> Read for BTreeMap<K, V> {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        let len = read_len(buf, 2)?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = K::read(buf)?;
            let value = V::read(buf)?;

            // Keys must be strictly ascending so that each map has exactly one encoding.
            if let Some((previous, _)) = map.last_key_value() {
                if *previous >= key {
                    return Err(Error::Invalid("BTreeMap", "keys not ascending"));
                }
            }
            map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Decode, Encode};
    use test_case::test_case;

    #[test]
    fn test_length_prefix() {
        let mut buf = Vec::new();
        write_len(u32::MAX as usize, &mut buf);
        assert_eq!(buf, vec![0xff; LENGTH_PREFIX]);
    }

    #[test]
    #[should_panic(expected = "length exceeds u32::MAX")]
    fn test_length_prefix_overflow() {
        write_len(u32::MAX as usize + 1, &mut Vec::new());
    }

    #[test_case(0u8; "zero")]
    #[test_case(u8::MAX; "max")]
    fn test_u8(value: u8) {
        assert_eq!(u8::decode(value.encode()).unwrap(), value);
    }

    #[test]
    fn test_integers_big_endian() {
        assert_eq!(&1u32.encode()[..], &[0, 0, 0, 1]);
        assert_eq!(&(-1i64).encode()[..], &[0xff; 8]);
    }

    #[test]
    fn test_bool_rejects_invalid() {
        assert_eq!(bool::decode(&[2u8][..]), Err(Error::InvalidBool));
    }

    #[test]
    fn test_bytes_length_prefixed() {
        let value = Bytes::from_static(b"abc");
        let encoded = value.encode();
        assert_eq!(&encoded[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
        assert_eq!(Bytes::decode(encoded).unwrap(), value);

        // A prefix that promises more than is available must fail.
        assert_eq!(
            Bytes::decode(&[0u8, 0, 0, 9, 1][..]),
            Err(Error::EndOfBuffer)
        );
    }

    #[test]
    fn test_option_presence_tag() {
        let none: Option<u32> = None;
        assert_eq!(&none.encode()[..], &[0]);
        assert_eq!(&Some(1u32).encode()[..], &[1, 0, 0, 0, 1]);
        assert_eq!(
            Option::<u32>::decode(&[7u8][..]),
            Err(Error::InvalidTag(7))
        );
    }

    #[test]
    fn test_empty_and_absent_differ() {
        let empty = Some(Bytes::new()).encode();
        let absent = Option::<Bytes>::None.encode();
        assert_ne!(empty, absent);
    }

    #[test]
    fn test_vec_and_string() {
        let values = vec![String::from("a"), String::new(), String::from("xyz")];
        let decoded = Vec::<String>::decode(values.encode()).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_vec_length_bounded_by_buffer() {
        assert_eq!(
            Vec::<u8>::decode(&[0xffu8, 0xff, 0xff, 0xff][..]),
            Err(Error::EndOfBuffer)
        );
    }

    #[test]
    fn test_map_rejects_unordered_keys() {
        let mut map = BTreeMap::new();
        map.insert(1u8, 10u8);
        map.insert(2u8, 20u8);
        let encoded = map.encode();
        assert_eq!(BTreeMap::<u8, u8>::decode(encoded.clone()).unwrap(), map);

        let mut swapped = encoded.to_vec();
        swapped.swap(4, 6);
        assert!(matches!(
            BTreeMap::<u8, u8>::decode(&swapped[..]),
            Err(Error::Invalid(_, _))
        ));
    }
}
