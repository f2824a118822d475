//! Insert and update: splices `(path, payload)` pairs into the working
//! layer, splitting branches and extensions as needed.

use std::collections::HashMap;

use strata_rlp::decode::decode_bytes;
use strata_rlp::structs::Decoder;
use tracing::trace;

use crate::errors::{err, ErrorKind, Result};
use crate::hike::{hike_up, Hike};
use crate::nibbles::Nibbles;
use crate::store::TrieStore;
use crate::vertex::{HashKey, Payload, Vertex};
use crate::vid::VertexId;

impl TrieStore {
    /// Inserts or updates the payload stored under `path` in the trie rooted
    /// at `root`.
    ///
    /// Re-inserting an identical payload reports `LeafPathCachedAlready`
    /// (or `LeafPathOnBackendAlready` when the duplicate lives below the
    /// working layer); callers may count either as a duplicate rather than a
    /// failure.
    pub fn merge(&mut self, root: VertexId, path: &[u8], payload: Payload) -> Result<()> {
        let nibbles = Nibbles::from_bytes(path);
        if nibbles.is_empty() {
            return err(root, ErrorKind::HikeEmptyPath);
        }
        if !self.roots.contains(&root) {
            return err(root, ErrorKind::MergeRootMissing);
        }

        // an account payload ties its storage subtrie to this path
        let owner = match &payload {
            Payload::Account(account) => {
                account.storage_root.map(|sub_root| (sub_root, path.to_vec()))
            }
            _ => None,
        };

        let result = match hike_up(self, root, &nibbles) {
            Ok(hike) => self.update_leaf(&hike, payload),
            Err(failure) => match failure.error.kind {
                ErrorKind::HikeRootMissing => {
                    if self.is_locked(root) {
                        return err(root, ErrorKind::MergeLeafProofModeLock);
                    }
                    self.top.put_vtx(
                        root,
                        Vertex::Leaf {
                            pfx: nibbles,
                            payload,
                        },
                    );
                    self.top.void_key(root);
                    Ok(())
                }
                ErrorKind::HikeLeafUnexpected => self.split_leaf(&failure.hike, payload),
                ErrorKind::HikeBranchMissingEdge => self.fill_branch(&failure.hike, payload),
                ErrorKind::HikeExtTailMismatch => self.split_ext(&failure.hike, payload),
                _ => Err(failure.error),
            },
        };
        if result.is_ok() {
            if let Some((sub_root, owner_path)) = owner {
                self.storage_owner.insert(sub_root, owner_path);
            }
            if root != VertexId::ROOT {
                self.dirty_owner(root);
            }
        }
        result
    }

    /// Invalidates the primary-trie Merkle path of the account owning the
    /// given storage subtrie, so hashify re-hashes the account record with
    /// the subtrie's fresh root key.
    pub(crate) fn dirty_owner(&mut self, root: VertexId) {
        let Some(owner_path) = self.storage_owner.get(&root).cloned() else {
            return;
        };
        let nibbles = Nibbles::from_bytes(&owner_path);
        if let Ok(hike) = hike_up(self, VertexId::ROOT, &nibbles) {
            self.clear_keys(&hike);
        }
    }

    /// Invalidate the Merkle keys of every vertex the hike walked through.
    pub(crate) fn clear_keys(&mut self, hike: &Hike) {
        for leg in &hike.legs {
            self.top.void_key(leg.vid);
        }
    }

    fn update_leaf(&mut self, hike: &Hike, payload: Payload) -> Result<()> {
        let Some(leg) = hike.last() else {
            return err(hike.root, ErrorKind::MergeAssemblyFailed);
        };
        let Vertex::Leaf { pfx, payload: old } = &leg.vtx else {
            return err(leg.vid, ErrorKind::MergeAssemblyFailed);
        };
        if *old == payload {
            let kind = if self.top.get_vtx(leg.vid).is_some() {
                ErrorKind::LeafPathCachedAlready
            } else {
                ErrorKind::LeafPathOnBackendAlready
            };
            return err(leg.vid, kind);
        }
        if self.is_locked(leg.vid) {
            return err(leg.vid, ErrorKind::MergeLeafProofModeLock);
        }
        let vid = leg.vid;
        let pfx = pfx.clone();
        self.clear_keys(hike);
        self.top.put_vtx(vid, Vertex::Leaf { pfx, payload });
        trace!(%vid, "merge: leaf payload replaced");
        Ok(())
    }

    /// A leaf was reached but the tails differ: grow a branch at the
    /// divergence point carrying both leaves, behind a shared-prefix
    /// extension when needed.
    fn split_leaf(&mut self, hike: &Hike, payload: Payload) -> Result<()> {
        let Some(leg) = hike.last() else {
            return err(hike.root, ErrorKind::MergeAssemblyFailed);
        };
        let Vertex::Leaf {
            pfx: old_pfx,
            payload: old_payload,
        } = &leg.vtx
        else {
            return err(leg.vid, ErrorKind::MergeAssemblyFailed);
        };
        if self.is_locked(leg.vid) {
            return err(leg.vid, ErrorKind::MergeLeafProofModeLock);
        }
        let tail = &hike.tail;
        let fork = tail.count_prefix(old_pfx);
        if fork >= tail.len() || fork >= old_pfx.len() {
            // one path is a strict prefix of the other; keys are fixed-width
            return err(leg.vid, ErrorKind::MergeAssemblyFailed);
        }
        let vid = leg.vid;
        let old_pfx = old_pfx.clone();
        let old_payload = old_payload.clone();

        let moved_vid = self.top.fin.vgen.fetch();
        let new_vid = self.top.fin.vgen.fetch();
        let mut children = [None; 16];
        children[old_pfx.at(fork) as usize] = Some(moved_vid);
        children[tail.at(fork) as usize] = Some(new_vid);

        let moved = Vertex::Leaf {
            pfx: old_pfx.offset(fork + 1),
            payload: old_payload,
        };
        let fresh = Vertex::Leaf {
            pfx: tail.offset(fork + 1),
            payload,
        };
        let shared_pfx = tail.slice(0, fork);

        self.clear_keys(hike);
        self.top.put_vtx(moved_vid, moved);
        self.top.put_vtx(new_vid, fresh);
        if shared_pfx.is_empty() {
            self.top.put_vtx(vid, Vertex::Branch { children });
        } else {
            let branch_vid = self.top.fin.vgen.fetch();
            self.top.put_vtx(branch_vid, Vertex::Branch { children });
            self.top.put_vtx(
                vid,
                Vertex::Ext {
                    pfx: shared_pfx,
                    vid: branch_vid,
                },
            );
        }
        trace!(%vid, "merge: leaf split into branch");
        Ok(())
    }

    /// A branch had no edge for the next nibble: hang a fresh leaf there.
    fn fill_branch(&mut self, hike: &Hike, payload: Payload) -> Result<()> {
        let Some(leg) = hike.last() else {
            return err(hike.root, ErrorKind::MergeAssemblyFailed);
        };
        let Vertex::Branch { children } = &leg.vtx else {
            return err(leg.vid, ErrorKind::MergeAssemblyFailed);
        };
        if self.is_locked(leg.vid) {
            return err(leg.vid, ErrorKind::MergeBranchLinkLockedKey);
        }
        let vid = leg.vid;
        let tail = &hike.tail;
        let nibble = tail.at(0) as usize;
        let leaf_vid = self.top.fin.vgen.fetch();
        let leaf = Vertex::Leaf {
            pfx: tail.offset(1),
            payload,
        };
        let mut children = *children;
        children[nibble] = Some(leaf_vid);

        self.clear_keys(hike);
        self.top.put_vtx(leaf_vid, leaf);
        self.top.put_vtx(vid, Vertex::Branch { children });
        trace!(%vid, nibble, "merge: leaf hung off branch");
        Ok(())
    }

    /// An extension prefix diverged from the path: split it at the fork into
    /// (shared-prefix extension →) branch → (old-remainder extension →) old
    /// child, with the new leaf on the diverging edge.
    fn split_ext(&mut self, hike: &Hike, payload: Payload) -> Result<()> {
        let Some(leg) = hike.last() else {
            return err(hike.root, ErrorKind::MergeAssemblyFailed);
        };
        let Vertex::Ext {
            pfx: old_pfx,
            vid: old_child,
        } = &leg.vtx
        else {
            return err(leg.vid, ErrorKind::MergeAssemblyFailed);
        };
        if self.is_locked(leg.vid) {
            return err(leg.vid, ErrorKind::MergeBranchLinkLockedKey);
        }
        let tail = &hike.tail;
        let fork = tail.count_prefix(old_pfx);
        if fork >= tail.len() {
            return err(leg.vid, ErrorKind::MergeAssemblyFailed);
        }
        let vid = leg.vid;
        let old_pfx = old_pfx.clone();
        let old_child = *old_child;

        let mut children = [None; 16];
        let old_rest = old_pfx.offset(fork + 1);

        self.clear_keys(hike);
        if old_rest.is_empty() {
            children[old_pfx.at(fork) as usize] = Some(old_child);
        } else {
            let ext_vid = self.top.fin.vgen.fetch();
            self.top.put_vtx(
                ext_vid,
                Vertex::Ext {
                    pfx: old_rest,
                    vid: old_child,
                },
            );
            children[old_pfx.at(fork) as usize] = Some(ext_vid);
        }

        let new_vid = self.top.fin.vgen.fetch();
        self.top.put_vtx(
            new_vid,
            Vertex::Leaf {
                pfx: tail.offset(fork + 1),
                payload,
            },
        );
        children[tail.at(fork) as usize] = Some(new_vid);

        let shared_pfx = tail.slice(0, fork);
        if shared_pfx.is_empty() {
            self.top.put_vtx(vid, Vertex::Branch { children });
        } else {
            let branch_vid = self.top.fin.vgen.fetch();
            self.top.put_vtx(branch_vid, Vertex::Branch { children });
            self.top.put_vtx(
                vid,
                Vertex::Ext {
                    pfx: shared_pfx,
                    vid: branch_vid,
                },
            );
        }
        trace!(%vid, "merge: extension split at fork");
        Ok(())
    }

    /// Imports the nodes of a Merkle proof as a partial trie under `root`.
    ///
    /// Every imported vertex gets its key pre-registered and its id
    /// proof-locked; nodes the proof references but does not contain stay as
    /// key-only boundary entries. Hashify later verifies the computed root
    /// against `root_key`. Returns the number of vertices imported.
    pub fn merge_proof(
        &mut self,
        root: VertexId,
        root_key: HashKey,
        nodes: &[Vec<u8>],
    ) -> Result<usize> {
        if !self.roots.contains(&root) {
            return err(root, ErrorKind::MergeRootMissing);
        }
        let mut by_key: HashMap<HashKey, ProofNode> = HashMap::new();
        for blob in nodes {
            let node = decode_proof_node(blob)?;
            by_key.insert(HashKey::from_rlp(blob), node);
        }

        let mut imported = 0;
        let mut queue: Vec<(VertexId, HashKey)> = vec![(root, root_key)];
        while let Some((vid, key)) = queue.pop() {
            self.top.put_key(vid, key);
            self.top.fin.locked.insert(vid);

            // an embedded reference is the node itself; anything else must
            // come out of the proof set or stays a boundary entry
            let node = match key {
                HashKey::Inline(data, len) => decode_proof_node(&data[..len as usize])?,
                _ => match by_key.get(&key) {
                    Some(node) => node.clone(),
                    None => continue,
                },
            };
            let vtx = match node {
                ProofNode::Leaf { pfx, value } => Vertex::Leaf {
                    pfx,
                    payload: Payload::Raw(value),
                },
                ProofNode::Ext { pfx, child } => {
                    let child_vid = self.top.fin.vgen.fetch();
                    queue.push((child_vid, child));
                    Vertex::Ext {
                        pfx,
                        vid: child_vid,
                    }
                }
                ProofNode::Branch { children } => {
                    let mut vids = [None; 16];
                    for (nibble, child) in children.into_iter().enumerate() {
                        if child.is_valid() {
                            let child_vid = self.top.fin.vgen.fetch();
                            queue.push((child_vid, child));
                            vids[nibble] = Some(child_vid);
                        }
                    }
                    Vertex::Branch { children: vids }
                }
            };
            // inserted with its key already agreed, so not marked dirty
            self.top.delta.vtx.insert(vid, Some(vtx));
            imported += 1;
        }

        self.proof_keys.insert(root, root_key);
        trace!(%root, imported, "merge: proof nodes imported");
        Ok(imported)
    }
}

#[derive(Debug, Clone)]
enum ProofNode {
    Leaf { pfx: Nibbles, value: Vec<u8> },
    Ext { pfx: Nibbles, child: HashKey },
    Branch { children: [HashKey; 16] },
}

/// Decodes an RLP trie node: a 2-item list is a leaf or extension depending
/// on the hex-prefix terminator, a 17-item list a branch.
fn decode_proof_node(rlp: &[u8]) -> Result<ProofNode> {
    let garbled = || ErrorKind::MergeProofGarbled.into();

    let mut items = vec![];
    let mut decoder = Decoder::new(rlp).map_err(|_| garbled())?;
    loop {
        let item;
        (item, decoder) = decoder.get_encoded_item().map_err(|_| garbled())?;
        items.push(item);
        if decoder.is_done() || items.len() > 17 {
            break;
        }
    }

    match items.len() {
        2 => {
            let (hp, _) = decode_bytes(&items[0]).map_err(|_| garbled())?;
            let Some((pfx, is_leaf)) = Nibbles::decode_compact(hp) else {
                return Err(garbled());
            };
            if is_leaf {
                let (value, _) = decode_bytes(&items[1]).map_err(|_| garbled())?;
                Ok(ProofNode::Leaf {
                    pfx,
                    value: value.to_vec(),
                })
            } else {
                Ok(ProofNode::Ext {
                    pfx,
                    child: decode_child_ref(&items[1]),
                })
            }
        }
        17 => {
            let mut children = [HashKey::Void; 16];
            for (nibble, item) in items.iter().take(16).enumerate() {
                children[nibble] = decode_child_ref(item);
            }
            Ok(ProofNode::Branch { children })
        }
        _ => Err(garbled()),
    }
}

fn decode_child_ref(rlp: &[u8]) -> HashKey {
    match decode_bytes(rlp) {
        Ok((hash, rest)) if hash.len() == 32 && rest.is_empty() => {
            HashKey::from_slice(hash).unwrap_or(HashKey::Void)
        }
        Ok((bytes, rest)) if bytes.is_empty() && rest.is_empty() => HashKey::Void,
        _ => HashKey::from_rlp(rlp),
    }
}
