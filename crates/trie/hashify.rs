//! Incremental Merkle-key recomputation.
//!
//! For every registered root, the vertices transitively dirty under it get
//! fresh keys in a bottom-up sweep: a vertex key is the Keccak-256 of its
//! node RLP, or the RLP itself when shorter than 32 bytes.

use strata_rlp::encode::{encode_length, RLPEncode};
use tracing::trace;

use crate::errors::{err, ErrorKind, Result};
use crate::store::TrieStore;
use crate::vertex::{HashKey, Vertex};
use crate::vid::VertexId;

pub(crate) fn hashify(store: &mut TrieStore) -> Result<HashKey> {
    let roots: Vec<VertexId> = store.roots.iter().copied().collect();
    for root in roots {
        if store.vtx(root)?.is_none() {
            continue;
        }
        let mut in_flight = Vec::new();
        let key = resolve_key(store, root, &mut in_flight)?;
        if let Some(expected) = store.proof_keys.get(&root).copied() {
            if key != expected {
                return err(root, ErrorKind::HashifyProofHashMismatch);
            }
        }
        trace!(%root, "hashify: root key resolved");
    }
    store.top.fin.dirty.clear();
    store.root_key(VertexId::ROOT)
}

/// Resolves the key of one vertex, recursing into unresolved dependencies
/// first. `in_flight` guards against reference cycles, which surface as
/// `HashifyVtxUnresolved` rather than an endless loop.
fn resolve_key(
    store: &mut TrieStore,
    vid: VertexId,
    in_flight: &mut Vec<VertexId>,
) -> Result<HashKey> {
    if !store.top.fin.dirty.contains(&vid) {
        let key = store.key_of(vid)?;
        if key.is_valid() {
            return Ok(key);
        }
    }
    if in_flight.contains(&vid) {
        return err(vid, ErrorKind::HashifyVtxUnresolved);
    }
    let Some(vtx) = store.vtx(vid)? else {
        return err(vid, ErrorKind::HashifyVtxUnresolved);
    };

    in_flight.push(vid);
    let rlp = match vtx {
        Vertex::Leaf { pfx, payload } => {
            let storage_key = match payload.storage_root() {
                Some(sub_root) => Some(resolve_key(store, sub_root, in_flight)?),
                None => None,
            };
            leaf_rlp(&pfx.encode_compact(true), &payload.value_rlp(storage_key))
        }
        Vertex::Ext { pfx, vid: child } => {
            let child_key = resolve_key(store, child, in_flight)?;
            ext_rlp(&pfx.encode_compact(false), &child_key)
        }
        Vertex::Branch { children } => {
            let mut keys = [HashKey::Void; 16];
            for (nibble, child) in children.iter().enumerate() {
                if let Some(child) = child {
                    keys[nibble] = resolve_key(store, *child, in_flight)?;
                }
            }
            branch_rlp(&keys)
        }
    };
    in_flight.pop();

    let key = HashKey::from_rlp(&rlp);
    store.top.put_key(vid, key);
    store.top.fin.dirty.remove(&vid);
    Ok(key)
}

fn child_ref_len(key: &HashKey) -> usize {
    match key {
        HashKey::Void => 1,
        HashKey::Hash(_) => 33,
        HashKey::Inline(_, len) => *len as usize,
    }
}

fn put_child_ref(key: &HashKey, buf: &mut Vec<u8>) {
    match key {
        HashKey::Void => buf.push(0x80),
        HashKey::Hash(hash) => hash.as_bytes().encode(buf),
        // an embedded node is spliced in as-is
        HashKey::Inline(data, len) => buf.extend_from_slice(&data[..*len as usize]),
    }
}

pub(crate) fn leaf_rlp(hp: &[u8], value: &[u8]) -> Vec<u8> {
    let inner_len = hp.length() + value.length();
    let mut buf = Vec::with_capacity(inner_len + 4);
    encode_length(inner_len, &mut buf);
    hp.encode(&mut buf);
    value.encode(&mut buf);
    buf
}

pub(crate) fn ext_rlp(hp: &[u8], child: &HashKey) -> Vec<u8> {
    let inner_len = hp.length() + child_ref_len(child);
    let mut buf = Vec::with_capacity(inner_len + 4);
    encode_length(inner_len, &mut buf);
    hp.encode(&mut buf);
    put_child_ref(child, &mut buf);
    buf
}

pub(crate) fn branch_rlp(children: &[HashKey; 16]) -> Vec<u8> {
    let inner_len = 1 + children.iter().map(child_ref_len).sum::<usize>();
    let mut buf = Vec::with_capacity(inner_len + 4);
    encode_length(inner_len, &mut buf);
    for child in children {
        put_child_ref(child, &mut buf);
    }
    // empty value slot
    buf.push(0x80);
    buf
}
