use std::fmt;

/// Smallest vertex id the generator will hand out. Ids below this value are
/// reserved; id 1 names the primary state root.
pub const LEAST_FREE_VID: u64 = 2;

/// Stable dense integer naming a trie vertex within the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub u64);

impl VertexId {
    /// Null id, used as "no context" marker in errors.
    pub const NONE: VertexId = VertexId(0);
    /// The primary state root.
    pub const ROOT: VertexId = VertexId(1);

    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl From<u64> for VertexId {
    fn from(value: u64) -> Self {
        VertexId(value)
    }
}

/// Allocator and recycler of vertex ids.
///
/// The state is a sequence of free ids. All entries are free; the last entry
/// is a wildcard meaning "this id and everything above it". Explicitly freed
/// ids are kept in front of the wildcard and are recycled first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VidGenerator {
    state: Vec<VertexId>,
}

impl VidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: Vec<VertexId>) -> Self {
        Self { state }
    }

    /// The raw free-id sequence, wildcard last.
    pub fn state(&self) -> &[VertexId] {
        &self.state
    }

    pub fn into_state(self) -> Vec<VertexId> {
        self.state
    }

    /// Allocates the next vertex id.
    ///
    /// Recycled ids are preferred; with none left the wildcard is consumed
    /// and replaced by its successor. Reserved ids that were disposed on a
    /// full trie collapse are skipped over.
    pub fn fetch(&mut self) -> VertexId {
        loop {
            let vid = match self.state.len() {
                0 => {
                    self.state.push(VertexId(LEAST_FREE_VID + 1));
                    VertexId(LEAST_FREE_VID)
                }
                1 => {
                    let vid = self.state[0];
                    self.state[0] = VertexId(vid.0 + 1);
                    vid
                }
                n => self.state.remove(n - 2),
            };
            if vid.0 >= LEAST_FREE_VID {
                return vid;
            }
        }
    }

    /// Returns an id to the free sequence, in front of the wildcard.
    pub fn dispose(&mut self, vid: VertexId) {
        match self.state.len() {
            0 => self.state.push(vid),
            n => self.state.insert(n - 1, vid),
        }
    }

    /// Compacts the free sequence into canonical form: explicit free ids
    /// sorted ascending, with the run contiguously below the wildcard folded
    /// into it. Required before the state is serialised.
    pub fn reorg(&mut self) {
        let Some((&wildcard, explicit)) = self.state.split_last() else {
            // canonical form always carries a wildcard
            self.state.push(VertexId(LEAST_FREE_VID));
            return;
        };
        let mut explicit: Vec<VertexId> = explicit.to_vec();
        explicit.sort_unstable();
        explicit.dedup();

        let mut wildcard = wildcard;
        while let Some(&last) = explicit.last() {
            if last.0 + 1 == wildcard.0 {
                wildcard = last;
                explicit.pop();
            } else {
                break;
            }
        }

        explicit.push(wildcard);
        self.state = explicit;
    }

    /// A reorged copy of the state, leaving `self` untouched.
    pub fn canonical_state(&self) -> Vec<VertexId> {
        let mut copy = self.clone();
        copy.reorg();
        copy.into_state()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fetch_from_empty_counts_up() {
        let mut vgen = VidGenerator::new();
        assert_eq!(vgen.fetch(), VertexId(2));
        assert_eq!(vgen.fetch(), VertexId(3));
        assert_eq!(vgen.fetch(), VertexId(4));
        assert_eq!(vgen.state(), &[VertexId(5)]);
    }

    #[test]
    fn dispose_then_fetch_recycles() {
        let mut vgen = VidGenerator::new();
        for _ in 0..5 {
            vgen.fetch();
        }
        vgen.dispose(VertexId(3));
        vgen.dispose(VertexId(5));
        assert_eq!(vgen.fetch(), VertexId(5));
        assert_eq!(vgen.fetch(), VertexId(3));
        assert_eq!(vgen.fetch(), VertexId(7));
    }

    #[test]
    fn reorg_folds_contiguous_run() {
        let mut vgen = VidGenerator::from_state(vec![
            VertexId(3),
            VertexId(4),
            VertexId(8),
            VertexId(9),
        ]);
        vgen.reorg();
        assert_eq!(vgen.state(), &[VertexId(3), VertexId(4), VertexId(8)]);
    }

    #[test]
    fn reorg_collapses_fully_freed_space() {
        // everything from 1 upward free again
        let mut vgen = VidGenerator::from_state(vec![
            VertexId(2),
            VertexId(4),
            VertexId(3),
            VertexId(1),
            VertexId(5),
        ]);
        vgen.reorg();
        assert_eq!(vgen.state(), &[VertexId(1)]);
    }

    #[test]
    fn fetch_skips_reserved_ids() {
        let mut vgen = VidGenerator::from_state(vec![VertexId(1)]);
        assert_eq!(vgen.fetch(), VertexId(2));
        assert_eq!(vgen.state(), &[VertexId(3)]);
    }
}
