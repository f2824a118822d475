use thiserror::Error;

use crate::vid::VertexId;

/// Flat error kinds, grouped by subsystem. Every public operation surfaces
/// exactly one of these together with the most specific vertex id implicated
/// (see [`TrieError`]).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Codec
    #[error("codec: record too short")]
    CodecTooShort,
    #[error("codec: record size garbled")]
    CodecSizeGarbled,
    #[error("codec: wrong record type")]
    CodecWrongType,
    #[error("codec: field overflow")]
    CodecOverflow,

    // Hike
    #[error("hike: no branch edge for path nibble")]
    HikeBranchMissingEdge,
    #[error("hike: extension prefix does not match path")]
    HikeExtTailMismatch,
    #[error("hike: leaf prefix does not match path")]
    HikeLeafUnexpected,
    #[error("hike: empty path")]
    HikeEmptyPath,
    #[error("hike: root vertex missing")]
    HikeRootMissing,

    // Fetch
    #[error("fetch: path not found")]
    FetchPathNotFound,

    // Merge
    #[error("merge: root vertex missing")]
    MergeRootMissing,
    #[error("merge: branch link is proof-locked")]
    MergeBranchLinkLockedKey,
    #[error("merge: leaf is proof-locked")]
    MergeLeafProofModeLock,
    #[error("merge: internal assembly failed")]
    MergeAssemblyFailed,
    #[error("merge: payload already cached for path")]
    LeafPathCachedAlready,
    #[error("merge: payload already on backend for path")]
    LeafPathOnBackendAlready,
    #[error("merge: proof node garbled")]
    MergeProofGarbled,

    // Delete
    #[error("delete: path not found")]
    DelPathNotFound,
    #[error("delete: leaf is proof-locked")]
    DelLeafLocked,
    #[error("delete: branch is proof-locked")]
    DelBranchLocked,
    #[error("delete: subtree exceeds size bound")]
    DelSubTreeTooBig,
    #[error("delete: root vertex missing")]
    DelRootMissing,
    #[error("delete: leaf parent is not a branch")]
    DelBranchExpected,

    // Hashify
    #[error("hashify: unresolved vertex dependency")]
    HashifyVtxUnresolved,
    #[error("hashify: computed root differs from proof key")]
    HashifyProofHashMismatch,

    // Transactions
    #[error("tx: argument is not the top transaction")]
    TxNotTopTx,
    #[error("tx: stale transaction handle")]
    TxStaleTx,
    #[error("tx: layer stack underflow")]
    TxStackUnderflow,
    #[error("tx: base transaction locked by execute mode")]
    TxExecBaseTxLocked,
    #[error("tx: execute mode must not nest")]
    TxExecNestingAttempt,
    #[error("tx: directive not available in execute mode")]
    TxExecDirectiveLocked,
    #[error("tx: transactions still pending")]
    TxPendingTx,

    // Filter / journal
    #[error("filter: source and target roots do not chain")]
    FilTrgSrcMismatch,
    #[error("filter: journal holds fewer episodes than requested")]
    FilBackStepsExpected,
    #[error("filter: descriptor holds no write permission")]
    FilBackendRoMode,

    // Backend getters
    #[error("get: vertex not on backend")]
    GetVtxNotFound,
    #[error("get: key not on backend")]
    GetKeyNotFound,
    #[error("get: id generator not on backend")]
    GetIdgNotFound,
    #[error("get: filter not on backend")]
    GetFilNotFound,
    #[error("get: scheduler state not on backend")]
    GetFqsNotFound,

    // Backend
    #[error("backend: driver failure")]
    BackendFailed,

    // Checker
    #[error("check: backend vertex without key")]
    CheckBeKeyMissing,
    #[error("check: backend key does not match vertex")]
    CheckBeKeyMismatch,
    #[error("check: backend id generator garbled")]
    CheckBeVGenGarbled,
    #[error("check: layer structure garbled")]
    CheckLayerGarbled,
}

/// Error carrier: the kind plus the most specific vertex id implicated.
/// Operations with no meaningful context vertex use [`VertexId::NONE`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{kind} [ctx vertex {vid:?}]")]
pub struct TrieError {
    pub vid: VertexId,
    pub kind: ErrorKind,
}

impl TrieError {
    pub const fn new(vid: VertexId, kind: ErrorKind) -> Self {
        Self { vid, kind }
    }
}

impl From<ErrorKind> for TrieError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(VertexId::NONE, kind)
    }
}

pub type Result<T> = std::result::Result<T, TrieError>;

/// Shorthand for building an `Err` with a context vertex.
pub(crate) fn err<T>(vid: VertexId, kind: ErrorKind) -> Result<T> {
    Err(TrieError::new(vid, kind))
}
