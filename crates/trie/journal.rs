//! Cascaded FIFO of reversible filters.
//!
//! The queue is organised in tiers. Fresh entries land at the head of tier
//! zero; when a tier holds more than its width, its oldest entries are
//! demoted into the next tier, compacted together according to that tier's
//! dilution factor. Overflow of the last tier ages the oldest history out.
//!
//! Every entry carries the [`FilterId`] range of the persists it covers and a
//! [`QueueId`] naming its slot on the backend.

use std::collections::VecDeque;

use tracing::debug;

use crate::errors::{err, ErrorKind, Result};
use crate::filter::{self, Filter};
use crate::vid::VertexId;

/// Backend slot of a journal entry: tier in the top byte, slot serial below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub u64);

impl QueueId {
    pub fn new(tier: usize, slot: u64) -> Self {
        QueueId(((tier as u64) << 56) | slot)
    }

    pub fn tier(&self) -> usize {
        (self.0 >> 56) as usize
    }

    pub fn slot(&self) -> u64 {
        self.0 & ((1 << 56) - 1)
    }
}

/// Serial number of a persisted filter, monotonically assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterId(pub u64);

/// Tier tuning: live width, compaction dilution, slot-number capacity.
#[derive(Debug, Clone, Copy)]
pub struct TierCfg {
    /// Entries the tier holds before demoting.
    pub width: usize,
    /// How many extra entries are folded into one on demotion
    /// (0 demotes single entries unmerged).
    pub dilution: usize,
    /// Slot numbers wrap at this count; must exceed `width`.
    pub capacity: u64,
}

/// Scheduler tuning, one entry per tier.
#[derive(Debug, Clone)]
pub struct SchedCfg(pub Vec<TierCfg>);

impl Default for SchedCfg {
    fn default() -> Self {
        SchedCfg(vec![
            TierCfg { width: 4, dilution: 0, capacity: 10 },
            TierCfg { width: 3, dilution: 3, capacity: 10 },
            TierCfg { width: 3, dilution: 4, capacity: 10 },
            TierCfg { width: 3, dilution: 5, capacity: 10 },
        ])
    }
}

/// Persistent metadata of one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub qid: QueueId,
    /// Oldest persist folded into this entry.
    pub fid_lo: FilterId,
    /// Newest persist folded into this entry.
    pub fid_hi: FilterId,
}

/// Persistent per-tier state: next slot serial plus entry metadata,
/// newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierState {
    pub serial: u64,
    pub entries: Vec<EntryMeta>,
}

/// The scheduler state as serialised into the backend's `S` namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalState {
    pub tiers: Vec<TierState>,
}

#[derive(Debug, Clone)]
struct Entry {
    meta: EntryMeta,
    filter: Filter,
}

/// In-memory journal, mirroring the backend FIFO. Only the centre descriptor
/// mutates it; every mutation returns the matching backend put-set.
#[derive(Debug, Clone)]
pub struct Journal {
    cfg: SchedCfg,
    tiers: Vec<VecDeque<Entry>>,
    serials: Vec<u64>,
    next_fid: FilterId,
}

impl Journal {
    pub fn new(cfg: SchedCfg) -> Self {
        let n = cfg.0.len();
        Self {
            cfg,
            tiers: (0..n).map(|_| VecDeque::new()).collect(),
            serials: vec![0; n],
            next_fid: FilterId(1),
        }
    }

    /// Rebuilds the journal from persisted scheduler state, fetching entry
    /// filters through the given lookup.
    pub fn load(
        cfg: SchedCfg,
        state: &JournalState,
        mut get_fil: impl FnMut(QueueId) -> Result<Filter>,
    ) -> Result<Self> {
        let mut journal = Journal::new(cfg);
        let mut max_fid = 0;
        for (tier_no, tier) in state.tiers.iter().enumerate() {
            if tier_no >= journal.tiers.len() {
                return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
            }
            journal.serials[tier_no] = tier.serial;
            for meta in &tier.entries {
                max_fid = max_fid.max(meta.fid_hi.0);
                let filter = get_fil(meta.qid)?;
                journal.tiers[tier_no].push_back(Entry {
                    meta: *meta,
                    filter,
                });
            }
        }
        journal.next_fid = FilterId(max_fid + 1);
        Ok(journal)
    }

    /// Total number of queue entries across all tiers.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(|tier| tier.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialisable scheduler state.
    pub fn state(&self) -> JournalState {
        JournalState {
            tiers: self
                .tiers
                .iter()
                .zip(&self.serials)
                .map(|(entries, serial)| TierState {
                    serial: *serial,
                    entries: entries.iter().map(|entry| entry.meta).collect(),
                })
                .collect(),
        }
    }

    /// The `back_steps`-th entry counted from the newest (zero-based).
    pub fn fetch(&self, back_steps: usize) -> Result<&Filter> {
        self.entries()
            .nth(back_steps)
            .map(|entry| &entry.filter)
            .ok_or_else(|| ErrorKind::FilBackStepsExpected.into())
    }

    /// The metadata belonging to [`Journal::fetch`]'s result.
    pub fn fetch_meta(&self, back_steps: usize) -> Result<EntryMeta> {
        self.entries()
            .nth(back_steps)
            .map(|entry| entry.meta)
            .ok_or_else(|| ErrorKind::FilBackStepsExpected.into())
    }

    /// Finds the entry whose newest covered persist is `fid`. With
    /// `earlier_ok` the nearest older entry is returned instead when no entry
    /// matches exactly.
    pub fn lookup(&self, fid: FilterId, earlier_ok: bool) -> Option<(EntryMeta, &Filter)> {
        let mut best: Option<&Entry> = None;
        for entry in self.entries() {
            if entry.meta.fid_hi == fid {
                return Some((entry.meta, &entry.filter));
            }
            if earlier_ok && entry.meta.fid_hi < fid {
                let better = match best {
                    Some(b) => entry.meta.fid_hi > b.meta.fid_hi,
                    None => true,
                };
                if better {
                    best = Some(entry);
                }
            }
        }
        best.map(|entry| (entry.meta, &entry.filter))
    }

    /// Enqueues a fresh reverse filter as the new head. With `next_fid` the
    /// id counter is bumped at least to that value first.
    ///
    /// Returns the backend put-set: the new slot, every slot rewritten by
    /// compaction, and aged-out deletions.
    pub fn store(
        &mut self,
        filter: Filter,
        next_fid: Option<FilterId>,
    ) -> Result<Vec<(QueueId, Option<Filter>)>> {
        if let Some(fid) = next_fid {
            self.next_fid = self.next_fid.max(fid);
        }
        let fid = self.next_fid;
        self.next_fid = FilterId(fid.0 + 1);

        let mut puts = Vec::new();
        let qid = self.next_qid(0);
        let entry = Entry {
            meta: EntryMeta {
                qid,
                fid_lo: fid,
                fid_hi: fid,
            },
            filter,
        };
        puts.push((qid, Some(entry.filter.clone())));
        self.tiers[0].push_front(entry);
        debug!(fid = fid.0, qid = qid.0, "journal: stored reverse filter");

        self.cascade(&mut puts)?;
        Ok(puts)
    }

    /// Removes the newest `count` entries (used when a fresh filter reverts
    /// recently persisted history). Returns the backend deletions.
    pub fn delete(&mut self, count: usize) -> Result<Vec<(QueueId, Option<Filter>)>> {
        if count > self.len() {
            return err(VertexId::NONE, ErrorKind::FilBackStepsExpected);
        }
        let mut dels = Vec::with_capacity(count);
        for tier in self.tiers.iter_mut() {
            while dels.len() < count {
                match tier.pop_front() {
                    Some(entry) => dels.push((entry.meta.qid, None)),
                    None => break,
                }
            }
        }
        Ok(dels)
    }

    /// All entries, newest first.
    fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.tiers.iter().flat_map(|tier| tier.iter())
    }

    fn next_qid(&mut self, tier: usize) -> QueueId {
        let serial = self.serials[tier];
        self.serials[tier] = serial.wrapping_add(1);
        QueueId::new(tier, serial % self.cfg.0[tier].capacity)
    }

    /// Demotes overflow down the tiers, compacting according to each tier's
    /// dilution, and ages out overflow of the last tier.
    fn cascade(&mut self, puts: &mut Vec<(QueueId, Option<Filter>)>) -> Result<()> {
        for tier_no in 0..self.tiers.len() {
            let width = self.cfg.0[tier_no].width;
            while self.tiers[tier_no].len() > width {
                let group = (self.cfg.0[tier_no].dilution + 1).min(self.tiers[tier_no].len());
                // oldest `group` entries, newest of the group first
                let start = self.tiers[tier_no].len() - group;
                let mut drained: Vec<Entry> =
                    self.tiers[tier_no].drain(start..).collect();
                for entry in &drained {
                    puts.push((entry.meta.qid, None));
                }

                if tier_no + 1 >= self.tiers.len() {
                    debug!(
                        dropped = drained.len(),
                        "journal: history aged out of last tier"
                    );
                    break;
                }

                // entries chain newest to oldest; folding them keeps the
                // newest src and the oldest trg
                let mut merged = match drained.first() {
                    Some(first) => first.clone(),
                    None => break,
                };
                for older in drained.drain(1..) {
                    merged.filter = filter::merge(merged.filter, older.filter)?;
                    merged.meta.fid_lo = older.meta.fid_lo;
                }
                let qid = self.next_qid(tier_no + 1);
                merged.meta.qid = qid;
                puts.push((qid, Some(merged.filter.clone())));
                self.tiers[tier_no + 1].push_front(merged);
            }
        }
        Ok(())
    }
}

impl Default for Journal {
    fn default() -> Self {
        Journal::new(SchedCfg::default())
    }
}
