use super::{constants::RLP_EMPTY_LIST, error::RLPDecodeError};
use ethereum_types::{H256, U256};

/// Max payload size accepted when decoding.
/// While technically any size is RLP spec-compliant, there are no well-formed
/// trie nodes that could carry such big payloads, so they are either bugs or
/// malicious.
const MAX_RLP_BYTES: usize = 1024 * 1024 * 1024;

/// Trait for decoding RLP encoded slices of data.
/// The [`decode_unfinished`](RLPDecode::decode_unfinished) method decodes an
/// RLP item and returns the decoded value along with the remaining bytes;
/// [`decode`](RLPDecode::decode) additionally requires the input to be fully
/// consumed.
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }

        Ok(decoded)
    }
}

/// Decodes an RLP item from a slice of bytes.
/// It returns a 3-element tuple with the following elements:
/// - A boolean indicating if the item is a list or not.
/// - The payload of the item, without its prefix.
/// - The remaining bytes after the item.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let marker = *data.first().ok_or(RLPDecodeError::InvalidLength)?;
    match marker {
        // a byte below the string marker is its own payload
        0x00..=0x7F => Ok((false, &data[..1], &data[1..])),
        0x80..=0xBF => {
            let (payload, rest) = split_payload(data, marker - 0x80)?;
            Ok((false, payload, rest))
        }
        RLP_EMPTY_LIST..=0xFF => {
            let (payload, rest) = split_payload(data, marker - RLP_EMPTY_LIST)?;
            Ok((true, payload, rest))
        }
    }
}

/// Cuts the payload announced by an item's header out of `data` and returns
/// it with the bytes following the item. `code` is the marker byte with its
/// range base removed: values up to 55 are the payload length itself, larger
/// ones the width of a big-endian length field that follows the marker.
fn split_payload(data: &[u8], code: u8) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (header_len, payload_len) = if code <= 55 {
        (1, code as usize)
    } else {
        let width = (code - 55) as usize;
        let field = data
            .get(1..1 + width)
            .ok_or(RLPDecodeError::InvalidLength)?;
        let payload_len = usize::from_be_bytes(static_left_pad(field)?);
        if payload_len <= 55 {
            // must have used the short form
            return Err(RLPDecodeError::MalformedData);
        }
        (1 + width, payload_len)
    };
    if payload_len > MAX_RLP_BYTES {
        return Err(RLPDecodeError::InvalidLength);
    }
    let end = header_len
        .checked_add(payload_len)
        .filter(|end| *end <= data.len())
        .ok_or(RLPDecodeError::InvalidLength)?;
    Ok((&data[header_len..end], &data[end..]))
}

/// Decodes an RLP string item, rejecting lists.
/// Returns the string payload and the remaining bytes after the item.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (is_list, payload, rest) = decode_rlp_item(data)?;
    if is_list {
        return Err(RLPDecodeError::UnexpectedList);
    }
    Ok((payload, rest))
}

/// Returns the encoded representation of the next item (prefix included)
/// along with the remaining bytes after it.
pub fn get_item_with_prefix(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (_, _, rest) = decode_rlp_item(data)?;
    let item_len = data.len() - rest.len();
    Ok((&data[..item_len], rest))
}

/// Pads a slice of bytes with zeros on the left to make it a fixed size.
/// Returns an error on leading zeros or oversize input, both of which make an
/// integer encoding non-canonical.
pub fn static_left_pad<const N: usize>(bytes: &[u8]) -> Result<[u8; N], RLPDecodeError> {
    let mut padded_bytes = [0; N];

    if bytes.is_empty() {
        return Ok(padded_bytes);
    }

    if bytes[0] == 0 {
        return Err(RLPDecodeError::MalformedData);
    }

    if bytes.len() > N {
        return Err(RLPDecodeError::InvalidLength);
    }

    padded_bytes[N.saturating_sub(bytes.len())..].copy_from_slice(bytes);
    Ok(padded_bytes)
}

/// Shared body of the unsigned-integer impls: a byte string zero-padded to
/// the width of the target type.
fn decode_uint<const N: usize>(rlp: &[u8]) -> Result<([u8; N], &[u8]), RLPDecodeError> {
    let (bytes, rest) = decode_bytes(rlp)?;
    Ok((static_left_pad(bytes)?, rest))
}

impl RLPDecode for bool {
    #[inline(always)]
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        match buf.first() {
            Some(0x80) => Ok((false, &buf[1..])),
            Some(0x01) => Ok((true, &buf[1..])),
            Some(_) => Err(RLPDecodeError::MalformedData),
            None => Err(RLPDecodeError::InvalidLength),
        }
    }
}

impl RLPDecode for u8 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (be, rest) = decode_uint(rlp)?;
        Ok((u8::from_be_bytes(be), rest))
    }
}

impl RLPDecode for u16 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (be, rest) = decode_uint(rlp)?;
        Ok((u16::from_be_bytes(be), rest))
    }
}

impl RLPDecode for u32 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (be, rest) = decode_uint(rlp)?;
        Ok((u32::from_be_bytes(be), rest))
    }
}

impl RLPDecode for u64 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (be, rest) = decode_uint(rlp)?;
        Ok((u64::from_be_bytes(be), rest))
    }
}

impl RLPDecode for usize {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (be, rest) = decode_uint(rlp)?;
        Ok((usize::from_be_bytes(be), rest))
    }
}

impl<const N: usize> RLPDecode for [u8; N] {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (decoded_bytes, rest) = decode_bytes(rlp)?;
        let value = decoded_bytes
            .try_into()
            .map_err(|_| RLPDecodeError::InvalidLength)?;

        Ok((value, rest))
    }
}

impl RLPDecode for H256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (value, rest) = RLPDecode::decode_unfinished(rlp)?;
        Ok((H256(value), rest))
    }
}

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let padded_bytes: [u8; 32] = static_left_pad(bytes)?;
        Ok((U256::from_big_endian(&padded_bytes), rest))
    }
}

// The list counterpart of the `Vec<T>` encoding; byte strings decode through
// `decode_bytes` or the fixed-size array impl instead.
impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::new();
        let mut remaining = payload;
        while !remaining.is_empty() {
            let (item, after) = T::decode_unfinished(remaining)?;
            items.push(item);
            remaining = after;
        }
        Ok((items, rest))
    }
}
