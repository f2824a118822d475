pub mod memory;

use crate::codec;
use crate::errors::Result;
use crate::filter::Filter;
use crate::journal::{JournalState, QueueId};
use crate::vertex::{HashKey, Vertex};
use crate::vid::VertexId;

pub use memory::MemBackend;

/// Staged batch of writes, applied atomically by [`Backend::put_end`].
///
/// Vertices and filters are serialised while staging so a codec failure
/// surfaces before anything touches the driver.
#[derive(Debug, Default)]
pub struct PutBatch {
    pub(crate) vtx: Vec<(VertexId, Option<Vec<u8>>)>,
    pub(crate) key: Vec<(VertexId, HashKey)>,
    pub(crate) idg: Option<Vec<u8>>,
    pub(crate) fil: Vec<(QueueId, Option<Vec<u8>>)>,
    pub(crate) fqs: Option<Vec<u8>>,
}

impl PutBatch {
    pub fn put_vtx(&mut self, records: &[(VertexId, Option<Vertex>)]) -> Result<()> {
        for (vid, vtx) in records {
            let blob = match vtx {
                Some(vtx) => Some(codec::encode_vertex(vtx)?),
                None => None,
            };
            self.vtx.push((*vid, blob));
        }
        Ok(())
    }

    pub fn put_key(&mut self, records: &[(VertexId, HashKey)]) {
        self.key.extend_from_slice(records);
    }

    pub fn put_idg(&mut self, state: &[VertexId]) {
        self.idg = Some(codec::encode_idg(state));
    }

    pub fn put_fil(&mut self, records: &[(QueueId, Option<Filter>)]) -> Result<()> {
        for (qid, filter) in records {
            let blob = match filter {
                Some(filter) => Some(codec::encode_filter(filter)?),
                None => None,
            };
            self.fil.push((*qid, blob));
        }
        Ok(())
    }

    pub fn put_fqs(&mut self, state: &JournalState) {
        self.fqs = Some(codec::encode_journal_state(state));
    }
}

/// Contract of the durable key-value driver underneath the engine.
///
/// Four namespaces: vertices and keys by id, the id-generator blob, filters
/// by queue id plus the scheduler-state blob. Writes only happen through a
/// [`PutBatch`] committed by `put_end`; readers and walkers may run at any
/// time between batches.
pub trait Backend: Send + Sync {
    fn get_vtx(&self, vid: VertexId) -> Result<Option<Vertex>>;

    /// Fails with `GetKeyNotFound` for an unknown id.
    fn get_key(&self, vid: VertexId) -> Result<HashKey>;

    /// Fails with `GetIdgNotFound` when no generator state was ever stored.
    fn get_idg(&self) -> Result<Vec<VertexId>>;

    /// Fails with `GetFilNotFound` for an empty queue slot.
    fn get_fil(&self, qid: QueueId) -> Result<Filter>;

    /// Fails with `GetFqsNotFound` when no scheduler state was ever stored.
    fn get_fqs(&self) -> Result<JournalState>;

    fn put_begin(&self) -> Result<PutBatch> {
        Ok(PutBatch::default())
    }

    /// Applies the whole batch atomically.
    fn put_end(&self, batch: PutBatch) -> Result<()>;

    /// Lazy walk over the vertex namespace in id order.
    fn walk_vtx(&self) -> Box<dyn Iterator<Item = (VertexId, Vertex)>>;

    /// Lazy walk over the key namespace in id order.
    fn walk_key(&self) -> Box<dyn Iterator<Item = (VertexId, HashKey)>>;

    /// Lazy walk over the filter namespace in queue-id order.
    fn walk_fil(&self) -> Box<dyn Iterator<Item = (QueueId, Filter)>>;
}
