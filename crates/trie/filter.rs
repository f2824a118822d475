//! Forward-filter assembly, filter composition, and reverse filters.
//!
//! A filter is a reversible delta between two trie roots: vertex and key
//! overrides plus a generator snapshot. Forward filters capture what a layer
//! changes against the backend; reverse filters (stored in the journal) undo
//! a persisted forward filter.

use std::collections::HashMap;

use tracing::trace;

use crate::backend::Backend;
use crate::errors::{err, ErrorKind, Result};
use crate::layer::Layer;
use crate::vertex::{HashKey, Vertex};
use crate::vid::VertexId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// State root this filter applies on.
    pub src: HashKey,
    /// State root reached after applying this filter.
    pub trg: HashKey,
    /// Vertex overrides; `None` entries delete.
    pub s_tab: HashMap<VertexId, Option<Vertex>>,
    /// Key overrides; `Void` entries delete.
    pub k_map: HashMap<VertexId, HashKey>,
    /// Generator state at the target, canonical form.
    pub vgen: Vec<VertexId>,
}

/// Projects the top layer onto a forward filter spanning `src` (the state
/// visible beneath the layer) to `trg` (the layer's own root key).
///
/// Returns `None` when the layer holds no structural change and both roots
/// agree, so a no-op round trip does not pollute the journal.
pub fn assemble(top: &Layer, src: HashKey, trg: HashKey) -> Option<Filter> {
    if top.delta.vtx.is_empty() && src == trg {
        return None;
    }
    Some(Filter {
        src,
        trg,
        s_tab: top.delta.vtx.clone(),
        k_map: top.delta.key.clone(),
        vgen: top.fin.vgen.canonical_state(),
    })
}

/// Composes `first ∘ second` into one equivalent filter: applying the result
/// equals applying `first` then `second`.
///
/// Requires `second.src == first.trg`, else `FilTrgSrcMismatch`. Overrides of
/// `second` win; the generator snapshot is `second`'s.
pub fn merge(first: Filter, second: Filter) -> Result<Filter> {
    if second.src != first.trg {
        return err(VertexId::NONE, ErrorKind::FilTrgSrcMismatch);
    }
    let mut merged = first;
    merged.trg = second.trg;
    merged.vgen = second.vgen;
    for (vid, vtx) in second.s_tab {
        merged.s_tab.insert(vid, vtx);
    }
    for (vid, key) in second.k_map {
        merged.k_map.insert(vid, key);
    }
    trace!(
        records = merged.s_tab.len(),
        "filter: composed two filters"
    );
    Ok(merged)
}

/// Builds the inverse of `fwd` against the backend's current contents: the
/// filter that, applied after `fwd` has been flushed, restores today's state.
pub fn reverse(fwd: &Filter, backend: &dyn Backend) -> Result<Filter> {
    let mut rev = Filter {
        src: fwd.trg,
        trg: fwd.src,
        vgen: match backend.get_idg() {
            Ok(state) => state,
            Err(error) if error.kind == ErrorKind::GetIdgNotFound => vec![],
            Err(error) => return Err(error),
        },
        ..Filter::default()
    };
    for vid in fwd.s_tab.keys() {
        rev.s_tab.insert(*vid, backend.get_vtx(*vid)?);
    }
    for vid in fwd.k_map.keys() {
        let key = match backend.get_key(*vid) {
            Ok(key) => key,
            Err(error) if error.kind == ErrorKind::GetKeyNotFound => HashKey::Void,
            Err(error) => return Err(error),
        };
        rev.k_map.insert(*vid, key);
    }
    Ok(rev)
}
