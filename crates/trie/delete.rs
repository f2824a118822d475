//! Leaf and subtree removal, collapsing branches and extensions so the trie
//! keeps its canonical shape.

use tracing::trace;

use crate::errors::{err, ErrorKind, Result};
use crate::hike::{hike_up, Hike, Leg};
use crate::nibbles::Nibbles;
use crate::store::TrieStore;
use crate::vertex::Vertex;
use crate::vid::VertexId;

impl TrieStore {
    /// Removes the leaf stored under `path` in the trie rooted at `root`.
    ///
    /// A branch left with a single child collapses into an extension, merges
    /// into an adjacent extension, or absorbs into its remaining leaf; ids
    /// freed by collapsing go back to the generator.
    pub fn delete(&mut self, root: VertexId, path: &[u8]) -> Result<()> {
        let nibbles = Nibbles::from_bytes(path);
        if nibbles.is_empty() {
            return err(root, ErrorKind::HikeEmptyPath);
        }
        let hike = match hike_up(self, root, &nibbles) {
            Ok(hike) => hike,
            Err(failure) => {
                return match failure.error.kind {
                    ErrorKind::HikeRootMissing
                    | ErrorKind::HikeBranchMissingEdge
                    | ErrorKind::HikeLeafUnexpected
                    | ErrorKind::HikeExtTailMismatch => {
                        err(failure.error.vid, ErrorKind::DelPathNotFound)
                    }
                    _ => Err(failure.error),
                };
            }
        };
        let Some(leaf_leg) = hike.last() else {
            return err(root, ErrorKind::DelPathNotFound);
        };
        if self.is_locked(leaf_leg.vid) {
            return err(leaf_leg.vid, ErrorKind::DelLeafLocked);
        }
        let leaf_vid = leaf_leg.vid;

        // a sole leaf at the root empties the trie; the root id itself goes
        // back to the generator
        if hike.legs.len() == 1 {
            self.clear_keys(&hike);
            self.top.del_vtx(leaf_vid);
            self.top.fin.vgen.dispose(leaf_vid);
            if leaf_vid != VertexId::ROOT {
                self.roots.remove(&leaf_vid);
                self.dirty_owner(leaf_vid);
            }
            trace!(root = %leaf_vid, "delete: trie emptied");
            return Ok(());
        }

        let parent = &hike.legs[hike.legs.len() - 2];
        let Vertex::Branch { children } = &parent.vtx else {
            return err(parent.vid, ErrorKind::DelBranchExpected);
        };
        let Some(parent_nibble) = parent.nibble else {
            return err(parent.vid, ErrorKind::DelBranchExpected);
        };
        let parent_vid = parent.vid;
        let mut children = *children;
        children[parent_nibble as usize] = None;

        self.clear_keys(&hike);
        self.top.del_vtx(leaf_vid);
        self.top.fin.vgen.dispose(leaf_vid);

        let remaining: Vec<(u8, VertexId)> = children
            .iter()
            .enumerate()
            .filter_map(|(nibble, child)| child.map(|vid| (nibble as u8, vid)))
            .collect();
        let result = match remaining.as_slice() {
            [] => err(parent_vid, ErrorKind::DelBranchExpected),
            [(nibble, sibling)] => self.collapse_branch(&hike, parent_vid, *nibble, *sibling),
            _ => {
                self.top.put_vtx(parent_vid, Vertex::Branch { children });
                Ok(())
            }
        };
        if result.is_ok() && root != VertexId::ROOT {
            self.dirty_owner(root);
        }
        result
    }

    /// Rewrites a branch that was left with one child. The shape after the
    /// collapse depends on what that child is; an extension directly above
    /// the branch is folded in as well.
    fn collapse_branch(
        &mut self,
        hike: &Hike,
        branch_vid: VertexId,
        nibble: u8,
        sibling_vid: VertexId,
    ) -> Result<()> {
        if self.is_locked(branch_vid) {
            return err(branch_vid, ErrorKind::DelBranchLocked);
        }
        let Some(sibling) = self.vtx(sibling_vid)? else {
            return err(sibling_vid, ErrorKind::GetVtxNotFound);
        };

        // extension directly above the collapsing branch, if any
        let above: Option<&Leg> = (hike.legs.len() >= 3)
            .then(|| &hike.legs[hike.legs.len() - 3])
            .filter(|leg| matches!(leg.vtx, Vertex::Ext { .. }));
        if let Some(leg) = above {
            if self.is_locked(leg.vid) {
                return err(leg.vid, ErrorKind::DelBranchLocked);
            }
        }

        let mut stub = Nibbles::from_hex(vec![nibble]);
        match sibling {
            Vertex::Leaf { pfx, payload } => {
                if self.is_locked(sibling_vid) {
                    return err(sibling_vid, ErrorKind::DelLeafLocked);
                }
                self.top.del_vtx(sibling_vid);
                self.top.fin.vgen.dispose(sibling_vid);
                stub = stub.concat(&pfx);
                match above {
                    Some(leg) => {
                        let Vertex::Ext { pfx: ext_pfx, .. } = &leg.vtx else {
                            return err(leg.vid, ErrorKind::DelBranchExpected);
                        };
                        let ext_vid = leg.vid;
                        let pfx = ext_pfx.concat(&stub);
                        self.top.del_vtx(branch_vid);
                        self.top.fin.vgen.dispose(branch_vid);
                        self.top.put_vtx(ext_vid, Vertex::Leaf { pfx, payload });
                    }
                    None => {
                        self.top
                            .put_vtx(branch_vid, Vertex::Leaf { pfx: stub, payload });
                    }
                }
            }
            Vertex::Branch { .. } => match above {
                Some(leg) => {
                    let Vertex::Ext { pfx: ext_pfx, .. } = &leg.vtx else {
                        return err(leg.vid, ErrorKind::DelBranchExpected);
                    };
                    let ext_vid = leg.vid;
                    let pfx = ext_pfx.concat(&stub);
                    self.top.del_vtx(branch_vid);
                    self.top.fin.vgen.dispose(branch_vid);
                    self.top.put_vtx(
                        ext_vid,
                        Vertex::Ext {
                            pfx,
                            vid: sibling_vid,
                        },
                    );
                }
                None => {
                    self.top.put_vtx(
                        branch_vid,
                        Vertex::Ext {
                            pfx: stub,
                            vid: sibling_vid,
                        },
                    );
                }
            },
            Vertex::Ext { pfx, vid: grand } => {
                if self.is_locked(sibling_vid) {
                    return err(sibling_vid, ErrorKind::DelBranchLocked);
                }
                self.top.del_vtx(sibling_vid);
                self.top.fin.vgen.dispose(sibling_vid);
                stub = stub.concat(&pfx);
                match above {
                    Some(leg) => {
                        let Vertex::Ext { pfx: ext_pfx, .. } = &leg.vtx else {
                            return err(leg.vid, ErrorKind::DelBranchExpected);
                        };
                        let ext_vid = leg.vid;
                        let pfx = ext_pfx.concat(&stub);
                        self.top.del_vtx(branch_vid);
                        self.top.fin.vgen.dispose(branch_vid);
                        self.top
                            .put_vtx(ext_vid, Vertex::Ext { pfx, vid: grand });
                    }
                    None => {
                        self.top.put_vtx(
                            branch_vid,
                            Vertex::Ext {
                                pfx: stub,
                                vid: grand,
                            },
                        );
                    }
                }
            }
        }
        trace!(branch = %branch_vid, "delete: branch collapsed");
        Ok(())
    }

    /// Removes the whole subtrie under `root`, refusing when it exceeds the
    /// configured vertex bound.
    pub fn del_tree(&mut self, root: VertexId) -> Result<()> {
        if self.vtx(root)?.is_none() {
            return err(root, ErrorKind::DelRootMissing);
        }

        let mut stack = vec![root];
        let mut doomed = Vec::new();
        while let Some(vid) = stack.pop() {
            if doomed.len() >= self.config.del_tree_limit {
                return err(root, ErrorKind::DelSubTreeTooBig);
            }
            let Some(vtx) = self.vtx(vid)? else {
                // boundary entry of a partial trie; nothing stored for it
                continue;
            };
            if self.is_locked(vid) {
                let kind = match vtx {
                    Vertex::Leaf { .. } => ErrorKind::DelLeafLocked,
                    _ => ErrorKind::DelBranchLocked,
                };
                return err(vid, kind);
            }
            stack.extend(vtx.children());
            doomed.push(vid);
        }

        let count = doomed.len();
        for vid in doomed {
            self.top.del_vtx(vid);
            self.top.fin.vgen.dispose(vid);
        }
        if root != VertexId::ROOT {
            self.roots.remove(&root);
            self.dirty_owner(root);
            self.storage_owner.remove(&root);
        }
        self.proof_keys.remove(&root);
        trace!(%root, count, "delete: subtree removed");
        Ok(())
    }
}
