use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use super::{Backend, PutBatch};
use crate::codec;
use crate::errors::{err, ErrorKind, Result};
use crate::filter::Filter;
use crate::journal::{JournalState, QueueId};
use crate::vertex::{HashKey, Vertex};
use crate::vid::VertexId;

#[derive(Debug, Default)]
struct MemBackendInner {
    vtx: BTreeMap<u64, Vec<u8>>,
    key: BTreeMap<u64, Vec<u8>>,
    idg: Option<Vec<u8>>,
    fil: BTreeMap<u64, Vec<u8>>,
    fqs: Option<Vec<u8>>,
}

/// In-memory implementation of the [`Backend`] trait. The reference driver
/// for tests and volatile databases; stores the same serialised blobs a
/// durable driver would.
#[derive(Debug, Clone, Default)]
pub struct MemBackend {
    inner: Arc<Mutex<MemBackendInner>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut MemBackendInner) -> Result<T>) -> Result<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| crate::errors::TrieError::from(ErrorKind::BackendFailed))?;
        f(&mut inner)
    }
}

impl Backend for MemBackend {
    fn get_vtx(&self, vid: VertexId) -> Result<Option<Vertex>> {
        self.with_inner(|inner| {
            inner
                .vtx
                .get(&vid.0)
                .map(|blob| codec::decode_vertex(blob))
                .transpose()
        })
    }

    fn get_key(&self, vid: VertexId) -> Result<HashKey> {
        self.with_inner(|inner| match inner.key.get(&vid.0) {
            Some(blob) => {
                HashKey::from_slice(blob).ok_or_else(|| ErrorKind::CodecSizeGarbled.into())
            }
            None => err(vid, ErrorKind::GetKeyNotFound),
        })
    }

    fn get_idg(&self) -> Result<Vec<VertexId>> {
        self.with_inner(|inner| match &inner.idg {
            Some(blob) => codec::decode_idg(blob),
            None => err(VertexId::NONE, ErrorKind::GetIdgNotFound),
        })
    }

    fn get_fil(&self, qid: QueueId) -> Result<Filter> {
        self.with_inner(|inner| match inner.fil.get(&qid.0) {
            Some(blob) => codec::decode_filter(blob),
            None => err(VertexId::NONE, ErrorKind::GetFilNotFound),
        })
    }

    fn get_fqs(&self) -> Result<JournalState> {
        self.with_inner(|inner| match &inner.fqs {
            Some(blob) => codec::decode_journal_state(blob),
            None => err(VertexId::NONE, ErrorKind::GetFqsNotFound),
        })
    }

    fn put_end(&self, batch: PutBatch) -> Result<()> {
        self.with_inner(|inner| {
            for (vid, blob) in batch.vtx {
                match blob {
                    Some(blob) => {
                        inner.vtx.insert(vid.0, blob);
                    }
                    None => {
                        inner.vtx.remove(&vid.0);
                    }
                }
            }
            for (vid, key) in batch.key {
                if key.is_valid() {
                    inner.key.insert(vid.0, key.as_slice().to_vec());
                } else {
                    inner.key.remove(&vid.0);
                }
            }
            if let Some(idg) = batch.idg {
                inner.idg = Some(idg);
            }
            for (qid, blob) in batch.fil {
                match blob {
                    Some(blob) => {
                        inner.fil.insert(qid.0, blob);
                    }
                    None => {
                        inner.fil.remove(&qid.0);
                    }
                }
            }
            if let Some(fqs) = batch.fqs {
                inner.fqs = Some(fqs);
            }
            Ok(())
        })
    }

    fn walk_vtx(&self) -> Box<dyn Iterator<Item = (VertexId, Vertex)>> {
        let snapshot: Vec<_> = match self.inner.lock() {
            Ok(inner) => inner
                .vtx
                .iter()
                .filter_map(|(vid, blob)| {
                    codec::decode_vertex(blob).ok().map(|vtx| (VertexId(*vid), vtx))
                })
                .collect(),
            Err(_) => vec![],
        };
        Box::new(snapshot.into_iter())
    }

    fn walk_key(&self) -> Box<dyn Iterator<Item = (VertexId, HashKey)>> {
        let snapshot: Vec<_> = match self.inner.lock() {
            Ok(inner) => inner
                .key
                .iter()
                .filter_map(|(vid, blob)| {
                    HashKey::from_slice(blob).map(|key| (VertexId(*vid), key))
                })
                .collect(),
            Err(_) => vec![],
        };
        Box::new(snapshot.into_iter())
    }

    fn walk_fil(&self) -> Box<dyn Iterator<Item = (QueueId, Filter)>> {
        let snapshot: Vec<_> = match self.inner.lock() {
            Ok(inner) => inner
                .fil
                .iter()
                .filter_map(|(qid, blob)| {
                    codec::decode_filter(blob).ok().map(|fil| (QueueId(*qid), fil))
                })
                .collect(),
            Err(_) => vec![],
        };
        Box::new(snapshot.into_iter())
    }
}
