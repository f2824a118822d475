use std::collections::{HashMap, HashSet};

use crate::vertex::{HashKey, Vertex};
use crate::vid::{VertexId, VidGenerator};

/// Structural overrides a layer holds on top of what lies beneath it.
///
/// A `None` vertex entry marks a deletion. A `Void` key entry marks a key
/// invalidated by a structural edit, awaiting hashify (or deletion).
#[derive(Debug, Clone, Default)]
pub struct LayerDelta {
    pub vtx: HashMap<VertexId, Option<Vertex>>,
    pub key: HashMap<VertexId, HashKey>,
}

impl LayerDelta {
    pub fn is_empty(&self) -> bool {
        self.vtx.is_empty() && self.key.is_empty()
    }
}

/// Non-delta portion of a layer: the id generator, ids locked by a proof
/// import, and the set of vertices whose keys need recomputation.
#[derive(Debug, Clone, Default)]
pub struct LayerFinal {
    pub vgen: VidGenerator,
    pub locked: HashSet<VertexId>,
    pub dirty: HashSet<VertexId>,
}

/// A copy-on-write view of the trie's in-memory state. Layers stack during
/// transactions; the top layer is cumulative over its ancestors.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub delta: LayerDelta,
    pub fin: LayerFinal,
    pub tx_uid: u64,
}

impl Layer {
    /// Vertex lookup within this layer only. The outer `Option` is a miss,
    /// the inner `None` a recorded deletion.
    pub fn get_vtx(&self, vid: VertexId) -> Option<Option<&Vertex>> {
        self.delta.vtx.get(&vid).map(|entry| entry.as_ref())
    }

    pub fn put_vtx(&mut self, vid: VertexId, vtx: Vertex) {
        self.delta.vtx.insert(vid, Some(vtx));
        self.fin.dirty.insert(vid);
    }

    /// Records a deletion and invalidates the vertex's key.
    pub fn del_vtx(&mut self, vid: VertexId) {
        self.delta.vtx.insert(vid, None);
        self.delta.key.insert(vid, HashKey::Void);
        self.fin.dirty.remove(&vid);
    }

    pub fn get_key(&self, vid: VertexId) -> Option<HashKey> {
        self.delta.key.get(&vid).copied()
    }

    pub fn put_key(&mut self, vid: VertexId, key: HashKey) {
        self.delta.key.insert(vid, key);
    }

    /// Invalidates a key ahead of a structural edit.
    pub fn void_key(&mut self, vid: VertexId) {
        self.delta.key.insert(vid, HashKey::Void);
        self.fin.dirty.insert(vid);
    }
}
