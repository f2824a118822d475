//! In-order traversal over one trie of the store.

use crate::nibbles::Nibbles;
use crate::store::TrieStore;
use crate::vertex::{Payload, Vertex};
use crate::vid::VertexId;

/// Iterator yielding `(path, payload)` pairs left-to-right, resolving
/// vertices through layers, filter and backend. Unresolvable boundary
/// entries of a partial trie are skipped.
pub struct TrieIterator<'a> {
    store: &'a TrieStore,
    stack: Vec<(Nibbles, VertexId)>,
}

impl TrieStore {
    /// Walks the trie rooted at `root` in path order.
    pub fn iter(&self, root: VertexId) -> TrieIterator<'_> {
        TrieIterator {
            store: self,
            stack: vec![(Nibbles::default(), root)],
        }
    }
}

impl Iterator for TrieIterator<'_> {
    type Item = (Nibbles, Payload);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, vid)) = self.stack.pop() {
            let Ok(Some(vtx)) = self.store.vtx(vid) else {
                continue;
            };
            match vtx {
                Vertex::Leaf { pfx, payload } => return Some((path.concat(&pfx), payload)),
                Vertex::Ext { pfx, vid } => self.stack.push((path.concat(&pfx), vid)),
                Vertex::Branch { children } => {
                    // pushed right-to-left so the lowest nibble pops first
                    for nibble in (0..children.len()).rev() {
                        if let Some(child) = children[nibble] {
                            self.stack.push((path.append_new(nibble as u8), child));
                        }
                    }
                }
            }
        }
        None
    }
}
