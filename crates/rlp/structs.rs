use super::{
    decode::{RLPDecode, decode_rlp_item, get_item_with_prefix},
    encode::{RLPEncode, encode_length},
    error::RLPDecodeError,
};
use bytes::BufMut;

/// # Struct decoding helper
///
/// Used to decode a struct from RLP format.
/// The struct's fields must implement [`RLPDecode`].
/// The struct is expected as a list, with its values being the fields
/// in the order they are passed to [`Decoder::decode_field`].
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        match decode_rlp_item(buf)? {
            (true, payload, remaining) => Ok(Self { payload, remaining }),
            (false, _, _) => Err(RLPDecodeError::UnexpectedString),
        }
    }

    pub fn decode_field<T: RLPDecode>(self, name: &'static str) -> Result<(T, Self), RLPDecodeError> {
        let (field, rest) = <T as RLPDecode>::decode_unfinished(self.payload)
            .map_err(|err| RLPDecodeError::FieldDecodeError(name, Box::new(err)))?;
        let updated_self = Self {
            payload: rest,
            ..self
        };
        Ok((field, updated_self))
    }

    /// Returns the next field without decoding it, i.e. the payload bytes including its prefix.
    pub fn get_encoded_item(self) -> Result<(Vec<u8>, Self), RLPDecodeError> {
        match get_item_with_prefix(self.payload) {
            Ok((field, rest)) => {
                let updated_self = Self {
                    payload: rest,
                    ..self
                };
                Ok((field.to_vec(), updated_self))
            }
            Err(err) => Err(err),
        }
    }

    /// Finishes decoding the struct and returns the remaining bytes after the item.
    /// If the item's payload is not empty, returns an error.
    pub const fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if self.payload.is_empty() {
            Ok(self.remaining)
        } else {
            Err(RLPDecodeError::MalformedData)
        }
    }

    /// Returns true if the decoder has finished decoding the given input
    pub const fn is_done(&self) -> bool {
        self.payload.is_empty()
    }
}

/// # Struct encoding helper
///
/// Encodes a struct as an RLP list of its fields, in the order they are
/// passed to [`Encoder::encode_field`].
#[must_use = "`Encoder` must be consumed with `finish` to write the encoding"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self {
            buf,
            temp_buf: Vec::new(),
        }
    }

    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        <T as RLPEncode>::encode(value, &mut self.temp_buf);
        self
    }

    /// Appends an already-encoded item to the list payload as-is.
    pub fn encode_raw(mut self, value: &[u8]) -> Self {
        self.temp_buf.put_slice(value);
        self
    }

    /// Writes the list header and payload into the target buffer.
    pub fn finish(self) {
        encode_length(self.temp_buf.len(), self.buf);
        self.buf.put_slice(&self.temp_buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Simple {
        a: u8,
        b: u16,
    }

    impl RLPEncode for Simple {
        fn encode(&self, buf: &mut dyn BufMut) {
            Encoder::new(buf)
                .encode_field(&self.a)
                .encode_field(&self.b)
                .finish();
        }
    }

    impl RLPDecode for Simple {
        fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
            let decoder = Decoder::new(rlp)?;
            let (a, decoder) = decoder.decode_field("a")?;
            let (b, decoder) = decoder.decode_field("b")?;
            let rest = decoder.finish()?;
            Ok((Simple { a, b }, rest))
        }
    }

    #[test]
    fn simple_struct_roundtrip() {
        let value = Simple { a: 61, b: 75 };
        let encoded = value.encode_to_vec();
        assert_eq!(encoded, vec![0xc2, 61, 75]);
        assert_eq!(Simple::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn decoder_rejects_extra_payload() {
        // list [61, 75, 0x01] decoded as a two-field struct
        let encoded = vec![0xc3, 61, 75, 0x01];
        let decoder = Decoder::new(&encoded).unwrap();
        let (_, decoder) = decoder.decode_field::<u8>("a").unwrap();
        let (_, decoder) = decoder.decode_field::<u16>("b").unwrap();
        assert!(decoder.finish().is_err());
    }
}
