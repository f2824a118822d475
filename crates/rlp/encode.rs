use bytes::BufMut;
use ethereum_types::{H256, U256};

use super::constants::{RLP_EMPTY_LIST, RLP_NULL};

/// Function for encoding a value to RLP.
/// For encoding the value into a buffer directly, use [`RLPEncode::encode`].
pub fn encode<T: RLPEncode>(value: T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

/// Writes an RLP header for a payload of `len` bytes. `base` selects the
/// marker range: `RLP_NULL` for strings, `RLP_EMPTY_LIST` for lists. Short
/// payloads get a one-byte header; longer ones a marker plus the length as a
/// minimal big-endian integer.
fn put_header(base: u8, len: usize, buf: &mut dyn BufMut) {
    if len < 56 {
        buf.put_u8(base + len as u8);
        return;
    }
    let be = (len as u64).to_be_bytes();
    let skip = (len as u64).leading_zeros() as usize / 8;
    buf.put_u8(base + 55 + (be.len() - skip) as u8);
    buf.put_slice(&be[skip..]);
}

/// Writes the RLP list header for a payload of the given length.
/// The payload itself is appended by the caller.
pub fn encode_length(payload_len: usize, buf: &mut dyn BufMut) {
    put_header(RLP_EMPTY_LIST, payload_len, buf);
}

/// Writes an unsigned integer as a minimal big-endian RLP string.
fn put_uint(value: u64, buf: &mut dyn BufMut) {
    if value == 0 {
        buf.put_u8(RLP_NULL);
    } else if value < RLP_NULL as u64 {
        // small enough to be its own encoding
        buf.put_u8(value as u8);
    } else {
        let be = value.to_be_bytes();
        let skip = value.leading_zeros() as usize / 8;
        buf.put_u8(RLP_NULL + (be.len() - skip) as u8);
        buf.put_slice(&be[skip..]);
    }
}

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    /// Encoded size in bytes. The records this engine encodes are small, so
    /// the default just materialises the encoding and measures it.
    fn length(&self) -> usize {
        self.encode_to_vec().len()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl RLPEncode for bool {
    #[inline(always)]
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u8(if *self { 0x01 } else { RLP_NULL });
    }

    #[inline(always)]
    fn length(&self) -> usize {
        1
    }
}

impl RLPEncode for u8 {
    fn encode(&self, buf: &mut dyn BufMut) {
        put_uint(u64::from(*self), buf);
    }
}

impl RLPEncode for u16 {
    fn encode(&self, buf: &mut dyn BufMut) {
        put_uint(u64::from(*self), buf);
    }
}

impl RLPEncode for u32 {
    fn encode(&self, buf: &mut dyn BufMut) {
        put_uint(u64::from(*self), buf);
    }
}

impl RLPEncode for u64 {
    fn encode(&self, buf: &mut dyn BufMut) {
        put_uint(*self, buf);
    }
}

impl RLPEncode for usize {
    fn encode(&self, buf: &mut dyn BufMut) {
        put_uint(*self as u64, buf);
    }
}

impl RLPEncode for [u8] {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            // a lone byte below the string marker stands for itself
            [byte] if *byte < RLP_NULL => buf.put_u8(*byte),
            _ => {
                put_header(RLP_NULL, self.len(), buf);
                buf.put_slice(self);
            }
        }
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    #[inline]
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

impl RLPEncode for H256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        let be = self.to_big_endian();
        let skip = self.leading_zeros() as usize / 8;
        be[skip..].encode(buf)
    }
}

// A Vec<T> is encoded as an RLP list of its elements. Byte payloads go
// through the `[u8]` impl instead.
impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        let payload_len = self.iter().map(|item| item.length()).sum();
        encode_length(payload_len, buf);
        for item in self {
            item.encode(buf);
        }
    }
}
