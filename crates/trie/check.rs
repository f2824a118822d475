//! Consistency checkers over the working layer and the backend.

use std::collections::BTreeSet;

use crate::errors::{err, ErrorKind, Result};
use crate::hashify;
use crate::store::TrieStore;
use crate::vertex::{HashKey, Vertex};
use crate::vid::{VertexId, LEAST_FREE_VID};

impl TrieStore {
    /// Validates the working layer: structural vertex invariants and that
    /// the generator's free ids do not collide with live vertices.
    pub fn check(&self) -> Result<()> {
        for (vid, entry) in &self.top.delta.vtx {
            let Some(vtx) = entry else { continue };
            match vtx {
                Vertex::Leaf { .. } => {}
                Vertex::Ext { pfx, vid: child } => {
                    if pfx.is_empty() || !child.is_valid() {
                        return err(*vid, ErrorKind::CheckLayerGarbled);
                    }
                }
                Vertex::Branch { .. } => {
                    if vtx.branch_count() < 2 {
                        return err(*vid, ErrorKind::CheckLayerGarbled);
                    }
                }
            }
        }

        let state = self.top.fin.vgen.canonical_state();
        if let Some((&wildcard, explicit)) = state.split_last() {
            for free in explicit {
                if self.vtx(*free)?.is_some() {
                    return err(*free, ErrorKind::CheckLayerGarbled);
                }
            }
            for (vid, entry) in &self.top.delta.vtx {
                if entry.is_some() && vid.0 >= wildcard.0.max(LEAST_FREE_VID) {
                    return err(*vid, ErrorKind::CheckLayerGarbled);
                }
            }
        }
        Ok(())
    }

    /// Validates the backend: every stored vertex has a key, every key
    /// recomputes from its vertex, and the stored generator covers every
    /// free id and only free ids.
    pub fn check_backend(&self) -> Result<()> {
        let mut max_vid = 0u64;
        for (vid, vtx) in self.backend.walk_vtx() {
            max_vid = max_vid.max(vid.0);
            let stored = match self.backend.get_key(vid) {
                Ok(key) => key,
                Err(error) if error.kind == ErrorKind::GetKeyNotFound => {
                    return err(vid, ErrorKind::CheckBeKeyMissing);
                }
                Err(error) => return Err(error),
            };
            let computed = self.backend_node_key(&vtx)?;
            if computed != stored {
                return err(vid, ErrorKind::CheckBeKeyMismatch);
            }
        }

        let state = match self.backend.get_idg() {
            Ok(state) => state,
            Err(error) if error.kind == ErrorKind::GetIdgNotFound => vec![],
            Err(error) => return Err(error),
        };
        let Some((&wildcard, explicit)) = state.split_last() else {
            // no generator state: only legal for a backend without vertices
            return if max_vid == 0 {
                Ok(())
            } else {
                err(VertexId(max_vid), ErrorKind::CheckBeVGenGarbled)
            };
        };
        let explicit: BTreeSet<u64> = explicit.iter().map(|vid| vid.0).collect();
        for id in LEAST_FREE_VID..=max_vid {
            let free = explicit.contains(&id) || id >= wildcard.0;
            let live = self.backend.get_vtx(VertexId(id))?.is_some();
            if free == live {
                return err(VertexId(id), ErrorKind::CheckBeVGenGarbled);
            }
        }
        Ok(())
    }

    /// Recomputes a backend vertex's key from backend data only.
    fn backend_node_key(&self, vtx: &Vertex) -> Result<HashKey> {
        let child_key = |child: VertexId| -> Result<HashKey> {
            match self.backend.get_key(child) {
                Ok(key) => Ok(key),
                Err(error) if error.kind == ErrorKind::GetKeyNotFound => {
                    err(child, ErrorKind::CheckBeKeyMissing)
                }
                Err(error) => Err(error),
            }
        };
        let rlp = match vtx {
            Vertex::Leaf { pfx, payload } => {
                let storage_key = match payload.storage_root() {
                    Some(sub_root) => Some(child_key(sub_root)?),
                    None => None,
                };
                hashify::leaf_rlp(&pfx.encode_compact(true), &payload.value_rlp(storage_key))
            }
            Vertex::Ext { pfx, vid: child } => {
                hashify::ext_rlp(&pfx.encode_compact(false), &child_key(*child)?)
            }
            Vertex::Branch { children } => {
                let mut keys = [HashKey::Void; 16];
                for (nibble, child) in children.iter().enumerate() {
                    if let Some(child) = child {
                        keys[nibble] = child_key(*child)?;
                    }
                }
                hashify::branch_rlp(&keys)
            }
        };
        Ok(HashKey::from_rlp(&rlp))
    }
}
