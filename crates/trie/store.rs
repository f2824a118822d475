//! The store descriptor: the current top layer, the transaction stack, and
//! the path down to the shared backend.
//!
//! Vertex and key reads resolve top layer first, then the descriptor's
//! read-only filter, then the backend. Several descriptors may share one
//! backend; exactly one of them (the centre) holds write permission.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::backend::{Backend, MemBackend};
use crate::codec;
use crate::errors::{err, ErrorKind, Result, TrieError};
use crate::filter::{self, Filter};
use crate::hashify;
use crate::hike::{hike_up, Leg};
use crate::journal::{EntryMeta, FilterId, Journal, SchedCfg};
use crate::layer::Layer;
use crate::nibbles::Nibbles;
use crate::vertex::{HashKey, Payload, Vertex};
use crate::vid::{VertexId, VidGenerator};
use crate::EMPTY_ROOT_HASH;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `del_tree` refuses subtrees larger than this many vertices.
    pub del_tree_limit: usize,
    /// Journal tier layout.
    pub journal: SchedCfg,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            del_tree_limit: 1 << 20,
            journal: SchedCfg::default(),
        }
    }
}

pub(crate) type DescId = u64;

/// State shared between descriptors of one backend: who is centre, each
/// descriptor's read-only filter, and the journal mirror.
pub(crate) struct Shared {
    pub(crate) centre: DescId,
    next_desc: DescId,
    pub(crate) filters: HashMap<DescId, Option<Filter>>,
    pub(crate) journal: Journal,
}

/// Descriptor of a layered authenticated trie store.
pub struct TrieStore {
    pub(crate) top: Layer,
    pub(crate) stack: Vec<Layer>,
    /// Registered trie roots sharing the vertex space. Always contains the
    /// primary root.
    pub(crate) roots: BTreeSet<VertexId>,
    /// Root keys pre-registered by a proof import, checked by hashify.
    pub(crate) proof_keys: HashMap<VertexId, HashKey>,
    /// Primary-trie path of the account owning each storage subtrie root.
    /// Editing a subtrie invalidates the owning account's Merkle path.
    pub(crate) storage_owner: HashMap<VertexId, Vec<u8>>,
    pub(crate) tx_uid_gen: u64,
    pub(crate) backend: Arc<dyn Backend>,
    shared: Arc<Mutex<Shared>>,
    desc: DescId,
    pub(crate) config: StoreConfig,
}

impl std::fmt::Debug for TrieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrieStore").field("desc", &self.desc).finish()
    }
}

impl TrieStore {
    /// Opens a store over a fresh in-memory backend.
    pub fn new_mem() -> Self {
        let shared = Shared {
            centre: 1,
            next_desc: 2,
            filters: HashMap::from([(1, None)]),
            journal: Journal::new(SchedCfg::default()),
        };
        Self {
            top: Layer::default(),
            stack: vec![],
            roots: BTreeSet::from([VertexId::ROOT]),
            proof_keys: HashMap::new(),
            storage_owner: HashMap::new(),
            tx_uid_gen: 0,
            backend: Arc::new(MemBackend::new()),
            shared: Arc::new(Mutex::new(shared)),
            desc: 1,
            config: StoreConfig::default(),
        }
    }

    /// Opens a store over an existing backend, loading the generator and
    /// journal state. The new descriptor becomes the centre.
    pub fn open(backend: Arc<dyn Backend>, config: StoreConfig) -> Result<Self> {
        let vgen = match backend.get_idg() {
            Ok(state) => VidGenerator::from_state(state),
            Err(error) if error.kind == ErrorKind::GetIdgNotFound => VidGenerator::new(),
            Err(error) => return Err(error),
        };
        let journal = match backend.get_fqs() {
            Ok(state) => {
                Journal::load(config.journal.clone(), &state, |qid| backend.get_fil(qid))?
            }
            Err(error) if error.kind == ErrorKind::GetFqsNotFound => {
                Journal::new(config.journal.clone())
            }
            Err(error) => return Err(error),
        };
        let shared = Shared {
            centre: 1,
            next_desc: 2,
            filters: HashMap::from([(1, None)]),
            journal,
        };
        let mut top = Layer::default();
        top.fin.vgen = vgen;
        Ok(Self {
            top,
            stack: vec![],
            roots: BTreeSet::from([VertexId::ROOT]),
            proof_keys: HashMap::new(),
            storage_owner: HashMap::new(),
            tx_uid_gen: 0,
            backend,
            shared: Arc::new(Mutex::new(shared)),
            desc: 1,
            config,
        })
    }

    pub(crate) fn with_shared<T>(
        &self,
        f: impl FnOnce(&mut Shared) -> Result<T>,
    ) -> Result<T> {
        let mut shared = self
            .shared
            .lock()
            .map_err(|_| TrieError::from(ErrorKind::BackendFailed))?;
        f(&mut shared)
    }

    // -- layered reads ------------------------------------------------------

    /// Vertex lookup through top layer, read-only filter, backend.
    pub(crate) fn vtx(&self, vid: VertexId) -> Result<Option<Vertex>> {
        if let Some(entry) = self.top.get_vtx(vid) {
            return Ok(entry.cloned());
        }
        let filtered = self.with_shared(|shared| {
            Ok(shared
                .filters
                .get(&self.desc)
                .and_then(|filter| filter.as_ref())
                .and_then(|filter| filter.s_tab.get(&vid).cloned()))
        })?;
        if let Some(entry) = filtered {
            return Ok(entry);
        }
        self.backend.get_vtx(vid)
    }

    /// Merkle-key lookup through the same fall-through chain. An id unknown
    /// everywhere reads as `Void`.
    pub(crate) fn key_of(&self, vid: VertexId) -> Result<HashKey> {
        if let Some(key) = self.top.get_key(vid) {
            return Ok(key);
        }
        let filtered = self.with_shared(|shared| {
            Ok(shared
                .filters
                .get(&self.desc)
                .and_then(|filter| filter.as_ref())
                .and_then(|filter| filter.k_map.get(&vid).copied()))
        })?;
        if let Some(key) = filtered {
            return Ok(key);
        }
        match self.backend.get_key(vid) {
            Ok(key) => Ok(key),
            Err(error) if error.kind == ErrorKind::GetKeyNotFound => Ok(HashKey::Void),
            Err(error) => Err(error),
        }
    }

    /// State-root key as visible beneath the top layer (read-only filter,
    /// then backend). The empty-trie key when nothing is stored.
    pub(crate) fn base_root_key(&self) -> Result<HashKey> {
        let filtered = self.with_shared(|shared| {
            Ok(shared
                .filters
                .get(&self.desc)
                .and_then(|filter| filter.as_ref())
                .map(|filter| filter.trg))
        })?;
        if let Some(key) = filtered {
            return Ok(key);
        }
        match self.backend.get_key(VertexId::ROOT) {
            Ok(key) => Ok(key),
            Err(error) if error.kind == ErrorKind::GetKeyNotFound => {
                Ok(HashKey::Hash(*EMPTY_ROOT_HASH))
            }
            Err(error) => Err(error),
        }
    }

    /// Looks the payload stored under `path` up in the trie rooted at
    /// `root`.
    pub fn fetch(&self, root: VertexId, path: &[u8]) -> Result<Payload> {
        let nibbles = Nibbles::from_bytes(path);
        if nibbles.is_empty() {
            return err(root, ErrorKind::HikeEmptyPath);
        }
        match hike_up(self, root, &nibbles) {
            Ok(hike) => match hike.last() {
                Some(Leg {
                    vtx: Vertex::Leaf { payload, .. },
                    ..
                }) => Ok(payload.clone()),
                Some(leg) => err(leg.vid, ErrorKind::FetchPathNotFound),
                None => err(root, ErrorKind::FetchPathNotFound),
            },
            Err(failure) => match failure.error.kind {
                ErrorKind::HikeRootMissing
                | ErrorKind::HikeBranchMissingEdge
                | ErrorKind::HikeLeafUnexpected
                | ErrorKind::HikeExtTailMismatch => {
                    err(failure.error.vid, ErrorKind::FetchPathNotFound)
                }
                _ => Err(failure.error),
            },
        }
    }

    /// Merkle key of a registered root; assumes hashify has run for a live
    /// trie. An unused root reads as the empty-trie key.
    pub fn root_key(&self, root: VertexId) -> Result<HashKey> {
        if self.vtx(root)?.is_none() {
            return Ok(HashKey::Hash(*EMPTY_ROOT_HASH));
        }
        self.key_of(root)
    }

    /// Recomputes Merkle keys for all dirty vertices and returns the primary
    /// state-root key.
    pub fn hashify(&mut self) -> Result<HashKey> {
        hashify::hashify(self)
    }

    /// Registers a fresh subtrie root (e.g. for an account's storage trie).
    pub fn new_root(&mut self) -> VertexId {
        let vid = self.top.fin.vgen.fetch();
        self.roots.insert(vid);
        vid
    }

    pub fn is_locked(&self, vid: VertexId) -> bool {
        self.top.fin.locked.contains(&vid)
    }

    // -- centre handling ----------------------------------------------------

    /// Whether this descriptor holds write permission on the backend.
    pub fn is_centre(&self) -> Result<bool> {
        self.with_shared(|shared| Ok(shared.centre == self.desc))
    }

    /// Transfers write permission to this descriptor.
    pub fn re_centre(&mut self) -> Result<()> {
        self.with_shared(|shared| {
            shared.centre = self.desc;
            Ok(())
        })
    }

    // -- persist ------------------------------------------------------------

    /// Folds the top layer into the read-only filter, keeping everything in
    /// memory for a later flush.
    pub fn stow(&mut self) -> Result<()> {
        self.stow_inner(false)
    }

    /// Folds the top layer into the read-only filter and flushes the result
    /// to the backend, journalling the reverse delta.
    pub fn persist(&mut self) -> Result<()> {
        self.stow_inner(true)
    }

    fn stow_inner(&mut self, flush: bool) -> Result<()> {
        if self.top.tx_uid >= crate::tx::EXEC_TX_UID {
            return err(VertexId::NONE, ErrorKind::TxExecDirectiveLocked);
        }
        if !self.stack.is_empty() {
            return err(VertexId::NONE, ErrorKind::TxPendingTx);
        }
        if !self.is_centre()? {
            return err(VertexId::NONE, ErrorKind::FilBackendRoMode);
        }

        hashify::hashify(self)?;
        let src = self.base_root_key()?;
        let trg = self.root_key(VertexId::ROOT)?;
        let fwd = filter::assemble(&self.top, src, trg);

        let existing = self.with_shared(|shared| {
            Ok(shared.filters.get_mut(&self.desc).and_then(Option::take))
        })?;
        let folded = match (existing, fwd) {
            (None, None) => None,
            (Some(filter), None) => Some(filter),
            (None, Some(filter)) => Some(filter),
            (Some(older), Some(newer)) => Some(filter::merge(older, newer)?),
        };

        // the layer's contents now live in the filter (or on disk shortly)
        self.top.delta = Default::default();
        self.top.fin.dirty.clear();
        self.top.fin.vgen.reorg();
        self.with_shared(|shared| {
            shared.filters.insert(self.desc, folded);
            Ok(())
        })?;

        if !flush {
            return Ok(());
        }
        // a flush failure below leaves the filter stowed, nothing is lost
        let ro = self.with_shared(|shared| {
            Ok(shared.filters.get(&self.desc).cloned().flatten())
        })?;
        match ro {
            Some(ro) => self.flush_filter(ro),
            None => Ok(()),
        }
    }

    /// Writes a read-only filter through to the backend: journal bookkeeping,
    /// one atomic batch, then the sibling rebase.
    fn flush_filter(&mut self, ro: Filter) -> Result<()> {
        let ro_blob = codec::encode_filter(&ro)?;

        // scratch journal; committed into shared state only after put_end
        let mut journal = self.with_shared(|shared| Ok(shared.journal.clone()))?;
        let rev = filter::reverse(&ro, &*self.backend)?;

        let head_is_reverse = match journal.fetch(0) {
            Ok(head) => codec::encode_filter(head)? == ro_blob,
            Err(_) => false,
        };
        let fil_puts = if head_is_reverse {
            debug!("persist: filter reverts newest journal entry, deleting it");
            journal.delete(1)?
        } else {
            journal.store(rev.clone(), None)?
        };

        let mut batch = self.backend.put_begin()?;
        let vtx_records: Vec<(VertexId, Option<Vertex>)> =
            ro.s_tab.iter().map(|(vid, vtx)| (*vid, vtx.clone())).collect();
        batch.put_vtx(&vtx_records)?;
        let key_records: Vec<(VertexId, HashKey)> =
            ro.k_map.iter().map(|(vid, key)| (*vid, *key)).collect();
        batch.put_key(&key_records);
        batch.put_idg(&ro.vgen);
        batch.put_fil(&fil_puts)?;
        batch.put_fqs(&journal.state());

        // assemble the new sibling filters in scratch before writing, so a
        // mid-way failure leaves every descriptor untouched
        let sibling_scratch: Vec<(DescId, Option<Filter>)> = {
            let siblings = self.with_shared(|shared| {
                Ok(shared
                    .filters
                    .iter()
                    .filter(|(desc, _)| **desc != self.desc)
                    .map(|(desc, filter)| (*desc, filter.clone()))
                    .collect::<Vec<_>>())
            })?;
            let mut scratch = Vec::with_capacity(siblings.len());
            for (desc, sibling_filter) in siblings {
                let rebased = match sibling_filter {
                    None => rev.clone(),
                    Some(filter) => filter::merge(rev.clone(), filter)?,
                };
                scratch.push((desc, Some(rebased)));
            }
            scratch
        };

        self.backend.put_end(batch)?;
        debug!(
            vertices = ro.s_tab.len(),
            keys = ro.k_map.len(),
            journal_len = journal.len(),
            "persist: filter flushed to backend"
        );

        self.with_shared(|shared| {
            shared.journal = journal;
            shared.filters.insert(self.desc, None);
            for (desc, filter) in sibling_scratch {
                shared.filters.insert(desc, filter);
            }
            Ok(())
        })?;
        self.top.fin.vgen = VidGenerator::from_state(ro.vgen);
        Ok(())
    }

    // -- journal access -----------------------------------------------------

    /// The `back_steps`-th journal entry, newest first.
    pub fn journal_fetch(&self, back_steps: usize) -> Result<Filter> {
        self.with_shared(|shared| shared.journal.fetch(back_steps).map(Filter::clone))
    }

    /// Entry covering exactly the given filter id, or with `earlier_ok` the
    /// nearest older one.
    pub fn journal_lookup(
        &self,
        fid: FilterId,
        earlier_ok: bool,
    ) -> Result<Option<(EntryMeta, Filter)>> {
        self.with_shared(|shared| {
            Ok(shared
                .journal
                .lookup(fid, earlier_ok)
                .map(|(meta, filter)| (meta, filter.clone())))
        })
    }

    pub fn journal_len(&self) -> Result<usize> {
        self.with_shared(|shared| Ok(shared.journal.len()))
    }

    // -- forking ------------------------------------------------------------

    fn register_sibling(&self, filter: Option<Filter>) -> Result<DescId> {
        self.with_shared(|shared| {
            let desc = shared.next_desc;
            shared.next_desc += 1;
            shared.filters.insert(desc, filter);
            Ok(desc)
        })
    }

    /// Sibling descriptor with the same view of the current state. The clone
    /// reads through the same backend and is not the centre.
    pub fn fork_top(&self) -> Result<TrieStore> {
        let filter = self.with_shared(|shared| {
            Ok(shared.filters.get(&self.desc).cloned().flatten())
        })?;
        let desc = self.register_sibling(filter)?;
        let mut top = self.top.clone();
        top.tx_uid = 0;
        Ok(TrieStore {
            top,
            stack: vec![],
            roots: self.roots.clone(),
            proof_keys: self.proof_keys.clone(),
            storage_owner: self.storage_owner.clone(),
            tx_uid_gen: 0,
            backend: Arc::clone(&self.backend),
            shared: Arc::clone(&self.shared),
            desc,
            config: self.config.clone(),
        })
    }

    /// Historical descriptor: composes the newest `episode` journal entries
    /// into its read-only filter, so it reads the state from `episode`
    /// persists ago.
    pub fn fork(&self, episode: usize) -> Result<TrieStore> {
        let composed = self.with_shared(|shared| {
            if episode > shared.journal.len() {
                return err(VertexId::NONE, ErrorKind::FilBackStepsExpected);
            }
            let mut composed: Option<Filter> = None;
            for step in 0..episode {
                let entry = shared.journal.fetch(step)?.clone();
                composed = Some(match composed {
                    None => entry,
                    Some(acc) => filter::merge(acc, entry)?,
                });
            }
            Ok(composed)
        })?;

        let vgen_state = match &composed {
            Some(filter) => filter.vgen.clone(),
            None => match self.backend.get_idg() {
                Ok(state) => state,
                Err(error) if error.kind == ErrorKind::GetIdgNotFound => vec![],
                Err(error) => return Err(error),
            },
        };
        let desc = self.register_sibling(composed)?;
        debug!(episode, desc, "fork: historical descriptor created");

        let mut top = Layer::default();
        top.fin.vgen = VidGenerator::from_state(vgen_state);
        Ok(TrieStore {
            top,
            stack: vec![],
            roots: BTreeSet::from([VertexId::ROOT]),
            proof_keys: HashMap::new(),
            storage_owner: HashMap::new(),
            tx_uid_gen: 0,
            backend: Arc::clone(&self.backend),
            shared: Arc::clone(&self.shared),
            desc,
            config: self.config.clone(),
        })
    }
}

impl Drop for TrieStore {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.filters.remove(&self.desc);
        }
    }
}
