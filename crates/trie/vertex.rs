use bytes::BufMut;
use ethereum_types::{H256, U256};
use sha3::{Digest, Keccak256};
use strata_rlp::encode::RLPEncode;
use strata_rlp::structs::Encoder;

use crate::nibbles::Nibbles;
use crate::vid::VertexId;
use crate::EMPTY_ROOT_HASH;

pub(crate) fn keccak(data: &[u8]) -> H256 {
    H256::from_slice(Keccak256::new().chain_update(data).finalize().as_slice())
}

/// Merkle key of a vertex: the Keccak-256 of its RLP encoding, or the
/// encoding itself when shorter than 32 bytes. `Void` marks a key that is
/// unknown or has been invalidated by a structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashKey {
    #[default]
    Void,
    Hash(H256),
    /// Embedded RLP blob, 1..=31 bytes.
    Inline([u8; 31], u8),
}

impl HashKey {
    pub const fn is_valid(&self) -> bool {
        !matches!(self, HashKey::Void)
    }

    /// Key for a node with the given RLP encoding: embedded when short,
    /// hashed otherwise.
    pub fn from_rlp(rlp: &[u8]) -> Self {
        if rlp.len() < 32 {
            let mut data = [0u8; 31];
            data[..rlp.len()].copy_from_slice(rlp);
            HashKey::Inline(data, rlp.len() as u8)
        } else {
            HashKey::Hash(keccak(rlp))
        }
    }

    /// Rebuilds a key from its serialised form: 32 bytes for a hash,
    /// 1..=31 for an embedded blob, empty for void.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            0 => Some(HashKey::Void),
            32 => Some(HashKey::Hash(H256::from_slice(bytes))),
            n if n < 32 => {
                let mut data = [0u8; 31];
                data[..n].copy_from_slice(bytes);
                Some(HashKey::Inline(data, n as u8))
            }
            _ => None,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            HashKey::Void => &[],
            HashKey::Hash(hash) => hash.as_bytes(),
            HashKey::Inline(data, len) => &data[..*len as usize],
        }
    }

    /// Widens the key to a 32-byte hash: embedded blobs are hashed, a void
    /// key maps to the empty-trie root.
    pub fn finalize(&self) -> H256 {
        match self {
            HashKey::Void => *EMPTY_ROOT_HASH,
            HashKey::Hash(hash) => *hash,
            HashKey::Inline(data, len) => keccak(&data[..*len as usize]),
        }
    }
}

impl From<H256> for HashKey {
    fn from(hash: H256) -> Self {
        HashKey::Hash(hash)
    }
}

/// Leaf payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Opaque bytes, spliced into the leaf as-is.
    Raw(Vec<u8>),
    /// Structured account record.
    Account(AccountPayload),
    /// Storage-slot bytes.
    Storage(Vec<u8>),
}

impl Payload {
    /// The leaf value bytes as they enter the node RLP. Accounts need the
    /// resolved key of their storage subtrie root.
    pub(crate) fn value_rlp(&self, storage_key: Option<HashKey>) -> Vec<u8> {
        match self {
            Payload::Raw(bytes) | Payload::Storage(bytes) => bytes.clone(),
            Payload::Account(account) => account.encode_rlp(storage_key),
        }
    }

    /// The storage subtrie root, when this payload carries one.
    pub fn storage_root(&self) -> Option<VertexId> {
        match self {
            Payload::Account(account) => account.storage_root,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPayload {
    pub nonce: u64,
    pub balance: U256,
    /// Root vertex of the account's storage subtrie, if it has one.
    pub storage_root: Option<VertexId>,
    pub code_hash: H256,
}

impl AccountPayload {
    pub(crate) fn encode_rlp(&self, storage_key: Option<HashKey>) -> Vec<u8> {
        let storage_hash = storage_key
            .map(|key| key.finalize())
            .unwrap_or(*EMPTY_ROOT_HASH);
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&self.nonce)
            .encode_field(&self.balance)
            .encode_field(&storage_hash)
            .encode_field(&self.code_hash)
            .finish();
        buf
    }
}

impl RLPEncode for AccountPayload {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_slice(&self.encode_rlp(None));
    }
}

/// A trie vertex.
///
/// Structural invariants: an extension prefix is never empty and its child
/// always exists; a branch carries at least two children. A leaf prefix may
/// be empty only directly under a branch that consumed the whole path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vertex {
    Leaf {
        pfx: Nibbles,
        payload: Payload,
    },
    Ext {
        pfx: Nibbles,
        vid: VertexId,
    },
    Branch {
        children: [Option<VertexId>; 16],
    },
}

impl Vertex {
    pub fn new_branch() -> Self {
        Vertex::Branch {
            children: [None; 16],
        }
    }

    /// Number of children set on a branch; zero for other variants.
    pub fn branch_count(&self) -> usize {
        match self {
            Vertex::Branch { children } => children.iter().flatten().count(),
            _ => 0,
        }
    }

    /// The single `(nibble, child)` pair of a branch, if exactly one is set.
    pub fn branch_single_child(&self) -> Option<(u8, VertexId)> {
        match self {
            Vertex::Branch { children } => {
                let mut found = None;
                for (nibble, child) in children.iter().enumerate() {
                    if let Some(vid) = child {
                        if found.is_some() {
                            return None;
                        }
                        found = Some((nibble as u8, *vid));
                    }
                }
                found
            }
            _ => None,
        }
    }

    /// Direct children of this vertex.
    pub fn children(&self) -> Vec<VertexId> {
        match self {
            Vertex::Leaf { .. } => vec![],
            Vertex::Ext { vid, .. } => vec![*vid],
            Vertex::Branch { children } => children.iter().flatten().copied().collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_key_from_rlp_embeds_short_blobs() {
        let key = HashKey::from_rlp(&[0xc1, 0x80]);
        assert!(matches!(key, HashKey::Inline(_, 2)));
        assert_eq!(key.as_slice(), &[0xc1, 0x80]);
    }

    #[test]
    fn hash_key_from_rlp_hashes_long_blobs() {
        let blob = [0xAAu8; 32];
        let key = HashKey::from_rlp(&blob);
        assert_eq!(key, HashKey::Hash(keccak(&blob)));
    }

    #[test]
    fn hash_key_slice_roundtrip() {
        for key in [
            HashKey::Void,
            HashKey::from_rlp(&[0xc1, 0x80]),
            HashKey::Hash(keccak(b"abc")),
        ] {
            assert_eq!(HashKey::from_slice(key.as_slice()), Some(key));
        }
        assert!(HashKey::from_slice(&[0u8; 33]).is_none());
    }

    #[test]
    fn branch_single_child() {
        let mut children = [None; 16];
        children[7] = Some(VertexId(9));
        let branch = Vertex::Branch { children };
        assert_eq!(branch.branch_single_child(), Some((7, VertexId(9))));

        let mut children = children;
        children[2] = Some(VertexId(4));
        let branch = Vertex::Branch { children };
        assert_eq!(branch.branch_count(), 2);
        assert_eq!(branch.branch_single_child(), None);
    }

    #[test]
    fn account_payload_rlp_uses_empty_root_without_storage() {
        let account = AccountPayload {
            nonce: 1,
            balance: U256::from(1000u64),
            storage_root: None,
            code_hash: keccak(&[]),
        };
        let rlp = account.encode_rlp(None);
        // nonce + balance + two 32-byte hashes
        assert!(rlp.len() > 68);
        assert_eq!(rlp, account.encode_rlp(Some(HashKey::Void)));
    }
}
