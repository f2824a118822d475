//! Path walker: resolves a nibble path from a trie root down to a leaf.

use crate::errors::{ErrorKind, TrieError};
use crate::nibbles::Nibbles;
use crate::store::TrieStore;
use crate::vertex::Vertex;
use crate::vid::VertexId;

/// One step of a resolved path.
#[derive(Debug, Clone)]
pub struct Leg {
    pub vid: VertexId,
    pub vtx: Vertex,
    /// Nibble consumed descending out of this vertex (branches only).
    pub nibble: Option<u8>,
}

/// A resolved root-to-tip path: the legs walked plus whatever part of the
/// path was left unconsumed.
#[derive(Debug, Clone, Default)]
pub struct Hike {
    pub root: VertexId,
    pub legs: Vec<Leg>,
    pub tail: Nibbles,
}

impl Hike {
    /// The last leg walked, if any.
    pub fn last(&self) -> Option<&Leg> {
        self.legs.last()
    }
}

/// A hike that stopped early, keeping what was walked so far. Merge uses the
/// partial hike to decide where and how to splice new vertices in.
#[derive(Debug)]
pub struct HikeFailure {
    pub hike: Hike,
    pub error: TrieError,
}

impl HikeFailure {
    fn new(hike: Hike, vid: VertexId, kind: ErrorKind) -> Self {
        Self {
            hike,
            error: TrieError::new(vid, kind),
        }
    }
}

/// Walks `path` down from `root`. On success the full path was consumed and
/// the last leg is the matching leaf; otherwise the partial hike comes back
/// with the reason the walk stopped.
pub(crate) fn hike_up(
    store: &TrieStore,
    root: VertexId,
    path: &Nibbles,
) -> std::result::Result<Hike, HikeFailure> {
    let mut hike = Hike {
        root,
        legs: vec![],
        tail: path.clone(),
    };
    if path.is_empty() {
        return Err(HikeFailure::new(hike, root, ErrorKind::HikeEmptyPath));
    }

    let mut vid = root;
    loop {
        let vtx = match store.vtx(vid) {
            Ok(Some(vtx)) => vtx,
            Ok(None) => {
                let kind = if hike.legs.is_empty() {
                    ErrorKind::HikeRootMissing
                } else {
                    ErrorKind::GetVtxNotFound
                };
                return Err(HikeFailure::new(hike, vid, kind));
            }
            Err(error) => return Err(HikeFailure { hike, error }),
        };

        match vtx {
            Vertex::Leaf { ref pfx, .. } => {
                if hike.tail == *pfx {
                    hike.tail = Nibbles::default();
                    hike.legs.push(Leg {
                        vid,
                        vtx,
                        nibble: None,
                    });
                    return Ok(hike);
                }
                hike.legs.push(Leg {
                    vid,
                    vtx,
                    nibble: None,
                });
                return Err(HikeFailure::new(hike, vid, ErrorKind::HikeLeafUnexpected));
            }
            Vertex::Ext { ref pfx, vid: child } => {
                if hike.tail.skip_prefix(pfx) {
                    hike.legs.push(Leg {
                        vid,
                        vtx,
                        nibble: None,
                    });
                    vid = child;
                } else {
                    hike.legs.push(Leg {
                        vid,
                        vtx,
                        nibble: None,
                    });
                    return Err(HikeFailure::new(
                        hike,
                        vid,
                        ErrorKind::HikeExtTailMismatch,
                    ));
                }
            }
            Vertex::Branch { children } => {
                if hike.tail.is_empty() {
                    hike.legs.push(Leg {
                        vid,
                        vtx,
                        nibble: None,
                    });
                    return Err(HikeFailure::new(hike, vid, ErrorKind::HikeEmptyPath));
                }
                let nibble = hike.tail.at(0);
                match children[nibble as usize] {
                    Some(child) => {
                        hike.tail.next();
                        hike.legs.push(Leg {
                            vid,
                            vtx,
                            nibble: Some(nibble),
                        });
                        vid = child;
                    }
                    None => {
                        hike.legs.push(Leg {
                            vid,
                            vtx,
                            nibble: Some(nibble),
                        });
                        return Err(HikeFailure::new(
                            hike,
                            vid,
                            ErrorKind::HikeBranchMissingEdge,
                        ));
                    }
                }
            }
        }
    }
}
