//! # strata-rlp
//!
//! Recursive Length Prefix (RLP) encoding and decoding for the strata trie
//! store. RLP is the canonical serialization used when computing Merkle keys
//! of trie nodes and account records.
//!
//! ## Core Traits
//!
//! - [`encode::RLPEncode`]: Trait for types that can be RLP-encoded
//! - [`decode::RLPDecode`]: Trait for types that can be RLP-decoded
//!
//! For structured records, the [`structs::Encoder`] and [`structs::Decoder`]
//! builders encode/decode field by field.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod structs;
