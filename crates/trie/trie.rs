//! Layered authenticated key-value store over a Merkle Patricia Trie.
//!
//! The engine keeps vertices in dense-id tables, maintains Keccak-256 root
//! keys incrementally, stacks copy-on-write layers for nested transactions,
//! and reconciles in-memory state with a durable backend through journaled
//! reversible filters.

pub mod backend;
mod check;
pub mod codec;
mod delete;
pub mod errors;
mod filter;
mod hashify;
mod hike;
mod iter;
mod journal;
mod layer;
mod merge;
mod nibbles;
mod store;
mod tx;
mod vertex;
mod vid;

use ethereum_types::H256;
use sha3::{Digest, Keccak256};
use strata_rlp::constants::RLP_NULL;

use lazy_static::lazy_static;

lazy_static! {
    // Hash value for an empty trie, equal to keccak(RLP_NULL)
    pub static ref EMPTY_ROOT_HASH: H256 = H256::from_slice(
        Keccak256::new()
            .chain_update([RLP_NULL])
            .finalize()
            .as_slice(),
    );
}

pub use self::backend::{Backend, MemBackend, PutBatch};
pub use self::errors::{ErrorKind, Result, TrieError};
pub use self::filter::Filter;
pub use self::iter::TrieIterator;
pub use self::journal::{
    EntryMeta, FilterId, Journal, JournalState, QueueId, SchedCfg, TierCfg, TierState,
};
pub use self::layer::Layer;
pub use self::nibbles::Nibbles;
pub use self::store::{StoreConfig, TrieStore};
pub use self::tx::TrieTx;
pub use self::vertex::{AccountPayload, HashKey, Payload, Vertex};
pub use self::vid::{VertexId, VidGenerator, LEAST_FREE_VID};

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;
    use proptest::{
        collection::{btree_set, vec},
        prelude::*,
        proptest,
    };

    fn path(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    fn raw(bytes: &[u8]) -> Payload {
        Payload::Raw(bytes.to_vec())
    }

    #[test]
    fn empty_root_hash_constant() {
        assert_eq!(
            EMPTY_ROOT_HASH.as_bytes(),
            hex!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421")
        );
    }

    #[test]
    fn empty_store_has_empty_root() {
        let mut db = TrieStore::new_mem();
        let key = db.hashify().unwrap();
        assert_eq!(key, HashKey::Hash(*EMPTY_ROOT_HASH));
    }

    // Scenario: insert three accounts, compute root.
    #[test]
    fn insert_three_paths_allocates_densely() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x00), raw(&[0xc0])).unwrap();
        db.merge(VertexId::ROOT, &path(0x11), raw(&[0xc0])).unwrap();
        db.merge(VertexId::ROOT, &path(0x22), raw(&[0xc0])).unwrap();

        let key = db.hashify().unwrap();
        assert!(matches!(key, HashKey::Hash(h) if h != *EMPTY_ROOT_HASH));
        // root branch lives at id 1; the three leaves got ids 2, 3, 4
        assert_eq!(
            db.top.fin.vgen.canonical_state(),
            vec![VertexId(5)]
        );
        db.check().unwrap();
    }

    // Scenario: update an existing account.
    #[test]
    fn update_leaf_rewrites_only_its_path() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x00), raw(&[0xc0])).unwrap();
        db.merge(VertexId::ROOT, &path(0x11), raw(&[0xc0])).unwrap();
        db.merge(VertexId::ROOT, &path(0x22), raw(&[0xc0])).unwrap();
        let key_before = db.hashify().unwrap();
        let gen_before = db.top.fin.vgen.canonical_state();

        db.merge(VertexId::ROOT, &path(0x00), raw(&[0xc1])).unwrap();
        // only the leaf and its ancestors went dirty
        assert_eq!(db.top.fin.dirty.len(), 2);
        let key_after = db.hashify().unwrap();
        assert_ne!(key_before, key_after);
        assert_eq!(db.top.fin.vgen.canonical_state(), gen_before);
        assert_eq!(db.fetch(VertexId::ROOT, &path(0x00)).unwrap(), raw(&[0xc1]));
    }

    #[test]
    fn duplicate_insert_reports_cached() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x07), raw(&[0x01])).unwrap();
        assert_eq!(
            db.merge(VertexId::ROOT, &path(0x07), raw(&[0x01]))
                .unwrap_err()
                .kind,
            ErrorKind::LeafPathCachedAlready
        );
    }

    // Scenario: delete to empty.
    #[test]
    fn delete_all_restores_canonical_empty_state() {
        let mut db = TrieStore::new_mem();
        for byte in [0x00, 0x11, 0x22] {
            db.merge(VertexId::ROOT, &path(byte), raw(&[0xc0])).unwrap();
        }
        for byte in [0x00, 0x11, 0x22] {
            db.delete(VertexId::ROOT, &path(byte)).unwrap();
        }
        assert_eq!(db.top.fin.vgen.canonical_state(), vec![VertexId(1)]);
        assert_eq!(db.hashify().unwrap(), HashKey::Hash(*EMPTY_ROOT_HASH));
        assert_eq!(
            db.fetch(VertexId::ROOT, &path(0x00)).unwrap_err().kind,
            ErrorKind::FetchPathNotFound
        );
    }

    #[test]
    fn del_tree_removes_whole_subtrie() {
        let mut db = TrieStore::new_mem();
        for byte in [0x00, 0x11, 0x22] {
            db.merge(VertexId::ROOT, &path(byte), raw(&[byte])).unwrap();
        }
        db.del_tree(VertexId::ROOT).unwrap();
        assert_eq!(db.hashify().unwrap(), HashKey::Hash(*EMPTY_ROOT_HASH));
        assert_eq!(db.top.fin.vgen.canonical_state(), vec![VertexId(1)]);
        assert_eq!(
            db.del_tree(VertexId::ROOT).unwrap_err().kind,
            ErrorKind::DelRootMissing
        );
    }

    #[test]
    fn del_tree_respects_size_bound() {
        let backend = std::sync::Arc::new(MemBackend::new());
        let config = StoreConfig {
            del_tree_limit: 2,
            ..StoreConfig::default()
        };
        let mut db = TrieStore::open(backend, config).unwrap();
        for byte in [0x00, 0x11, 0x22] {
            db.merge(VertexId::ROOT, &path(byte), raw(&[byte])).unwrap();
        }
        // branch plus three leaves exceed the two-vertex bound
        assert_eq!(
            db.del_tree(VertexId::ROOT).unwrap_err().kind,
            ErrorKind::DelSubTreeTooBig
        );
    }

    #[test]
    fn delete_missing_path_fails() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x00), raw(&[0x01])).unwrap();
        assert_eq!(
            db.delete(VertexId::ROOT, &path(0x33)).unwrap_err().kind,
            ErrorKind::DelPathNotFound
        );
    }

    // Scenario: commit/rollback.
    #[test]
    fn nested_tx_commit_and_rollback() {
        let mut db = TrieStore::new_mem();
        let outer = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0xaa), raw(b"a")).unwrap();
        let inner = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0xbb), raw(b"b")).unwrap();

        db.rollback(&inner).unwrap();
        db.commit(&outer).unwrap();

        assert_eq!(db.fetch(VertexId::ROOT, &path(0xaa)).unwrap(), raw(b"a"));
        assert_eq!(
            db.fetch(VertexId::ROOT, &path(0xbb)).unwrap_err().kind,
            ErrorKind::FetchPathNotFound
        );
        assert!(db.tx_top().is_none());
        assert_eq!(db.top.tx_uid, 0);
    }

    #[test]
    fn commit_of_non_top_tx_fails() {
        let mut db = TrieStore::new_mem();
        let outer = db.tx_begin();
        let _inner = db.tx_begin();
        assert_eq!(
            db.commit(&outer).unwrap_err().kind,
            ErrorKind::TxNotTopTx
        );
        let stale = TrieTx { uid: 999, level: 1 };
        assert_eq!(db.commit(&stale).unwrap_err().kind, ErrorKind::TxStaleTx);
    }

    #[test]
    fn collapse_commits_or_discards_whole_stack() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x01), raw(b"base")).unwrap();
        let _t1 = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0x02), raw(b"x")).unwrap();
        let t2 = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0x03), raw(b"y")).unwrap();

        db.collapse(&t2, true).unwrap();
        assert!(db.tx_top().is_none());
        assert!(db.fetch(VertexId::ROOT, &path(0x03)).is_ok());

        let t3 = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0x04), raw(b"z")).unwrap();
        db.collapse(&t3, false).unwrap();
        assert!(db.tx_top().is_none());
        assert!(db.fetch(VertexId::ROOT, &path(0x04)).is_err());
        assert!(db.fetch(VertexId::ROOT, &path(0x01)).is_ok());
    }

    // Scenario: execute historical read.
    #[test]
    fn execute_restores_state_and_locks_directives() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x10), raw(b"s0")).unwrap();
        let base = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0x20), raw(b"s1")).unwrap();
        let s1_root = db.hashify().unwrap();

        let result = db.execute(&base, |db| {
            assert_eq!(db.fetch(VertexId::ROOT, &path(0x10)).unwrap(), raw(b"s0"));
            assert_eq!(
                db.persist().unwrap_err().kind,
                ErrorKind::TxExecDirectiveLocked
            );
            let synthetic = db.tx_top().ok_or(ErrorKind::TxStaleTx)?;
            assert_eq!(
                db.commit(&synthetic).unwrap_err().kind,
                ErrorKind::TxExecBaseTxLocked
            );
            assert_eq!(
                db.execute(&synthetic, |_| Ok(())).unwrap_err().kind,
                ErrorKind::TxExecNestingAttempt
            );
            Ok(())
        });
        result.unwrap();

        // state is exactly as before the call
        assert!(db.is_top(&base));
        assert_eq!(db.fetch(VertexId::ROOT, &path(0x20)).unwrap(), raw(b"s1"));
        assert_eq!(db.hashify().unwrap(), s1_root);
    }

    #[test]
    fn execute_on_historical_layer_sees_old_state() {
        let mut db = TrieStore::new_mem();
        let t1 = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0x0a), raw(b"a")).unwrap();
        let _t2 = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0x0b), raw(b"b")).unwrap();

        db.execute(&t1, |db| {
            assert_eq!(db.fetch(VertexId::ROOT, &path(0x0a)).unwrap(), raw(b"a"));
            assert_eq!(
                db.fetch(VertexId::ROOT, &path(0x0b)).unwrap_err().kind,
                ErrorKind::FetchPathNotFound
            );
            Ok(())
        })
        .unwrap();
        // the live top still has both
        assert!(db.fetch(VertexId::ROOT, &path(0x0b)).is_ok());
    }

    #[test]
    fn execute_restores_on_action_error() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x10), raw(b"s0")).unwrap();
        let base = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0x20), raw(b"s1")).unwrap();

        let result: Result<()> = db.execute(&base, |db| {
            db.merge(VertexId::ROOT, &path(0x30), raw(b"scratch"))?;
            Err(TrieError::new(VertexId::NONE, ErrorKind::BackendFailed))
        });
        assert_eq!(result.unwrap_err().kind, ErrorKind::BackendFailed);
        assert!(db.is_top(&base));
        assert!(db.fetch(VertexId::ROOT, &path(0x30)).is_err());
        assert!(db.fetch(VertexId::ROOT, &path(0x20)).is_ok());
    }

    #[test]
    fn persist_with_pending_tx_fails() {
        let mut db = TrieStore::new_mem();
        let _tx = db.tx_begin();
        db.merge(VertexId::ROOT, &path(0x01), raw(b"x")).unwrap();
        assert_eq!(db.persist().unwrap_err().kind, ErrorKind::TxPendingTx);
    }

    #[test]
    fn persist_roundtrips_through_backend() {
        let mut db = TrieStore::new_mem();
        for byte in [0x00, 0x11, 0x22] {
            db.merge(VertexId::ROOT, &path(byte), raw(&[byte, 0x01])).unwrap();
        }
        let root = db.hashify().unwrap();
        db.persist().unwrap();
        db.check_backend().unwrap();

        // the layer is clean now and everything reads from the backend
        assert!(db.top.delta.is_empty());
        assert_eq!(db.root_key(VertexId::ROOT).unwrap(), root);
        for byte in [0x00, 0x11, 0x22] {
            assert_eq!(
                db.fetch(VertexId::ROOT, &path(byte)).unwrap(),
                raw(&[byte, 0x01])
            );
        }
    }

    #[test]
    fn stow_keeps_changes_in_memory_until_persist() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x42), raw(b"v")).unwrap();
        let root = db.hashify().unwrap();
        db.stow().unwrap();

        assert!(db.top.delta.is_empty());
        assert_eq!(db.fetch(VertexId::ROOT, &path(0x42)).unwrap(), raw(b"v"));
        assert_eq!(db.root_key(VertexId::ROOT).unwrap(), root);
        // nothing reached the backend yet
        assert!(db.backend.get_vtx(VertexId::ROOT).unwrap().is_none());

        db.persist().unwrap();
        assert!(db.backend.get_vtx(VertexId::ROOT).unwrap().is_some());
        db.check_backend().unwrap();
    }

    // Scenario: journal replay.
    #[test]
    fn fork_replays_journalled_states() {
        let mut db = TrieStore::new_mem();
        let mut roots = vec![HashKey::Hash(*EMPTY_ROOT_HASH)];
        for byte in [0x01u8, 0x02, 0x03] {
            db.merge(VertexId::ROOT, &path(0x55), raw(&[byte])).unwrap();
            db.merge(VertexId::ROOT, &path(byte), raw(&[byte])).unwrap();
            db.persist().unwrap();
            roots.push(db.root_key(VertexId::ROOT).unwrap());
        }
        assert_eq!(db.journal_len().unwrap(), 3);

        // fork(0) is the present, fork(k) the state k persists ago
        for episode in 0..=3 {
            let fork = db.fork(episode).unwrap();
            assert_eq!(
                fork.root_key(VertexId::ROOT).unwrap(),
                roots[roots.len() - 1 - episode],
                "episode {episode}"
            );
        }
        let one_back = db.fork(1).unwrap();
        assert_eq!(
            one_back.fetch(VertexId::ROOT, &path(0x55)).unwrap(),
            raw(&[0x02])
        );
        assert!(one_back.fetch(VertexId::ROOT, &path(0x03)).is_err());

        assert_eq!(
            db.fork(4).unwrap_err().kind,
            ErrorKind::FilBackStepsExpected
        );
    }

    #[test]
    fn fork_top_shares_the_current_view() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x77), raw(b"x")).unwrap();
        db.hashify().unwrap();

        let sibling = db.fork_top().unwrap();
        assert_eq!(sibling.fetch(VertexId::ROOT, &path(0x77)).unwrap(), raw(b"x"));
        assert!(!sibling.is_centre().unwrap());
        // only the centre may persist
        let mut sibling = sibling;
        assert_eq!(
            sibling.persist().unwrap_err().kind,
            ErrorKind::FilBackendRoMode
        );
    }

    #[test]
    fn sibling_view_survives_centre_persist() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x01), raw(b"one")).unwrap();
        db.persist().unwrap();
        let before = db.root_key(VertexId::ROOT).unwrap();

        let sibling = db.fork_top().unwrap();
        db.merge(VertexId::ROOT, &path(0x02), raw(b"two")).unwrap();
        db.persist().unwrap();

        // the sibling still observes the pre-persist state
        assert_eq!(sibling.root_key(VertexId::ROOT).unwrap(), before);
        assert!(sibling.fetch(VertexId::ROOT, &path(0x02)).is_err());
        assert_eq!(
            sibling.fetch(VertexId::ROOT, &path(0x01)).unwrap(),
            raw(b"one")
        );
    }

    #[test]
    fn re_centre_transfers_write_permission() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x01), raw(b"x")).unwrap();
        db.persist().unwrap();

        let mut sibling = db.fork_top().unwrap();
        sibling.re_centre().unwrap();
        assert!(!db.is_centre().unwrap());
        sibling.merge(VertexId::ROOT, &path(0x02), raw(b"y")).unwrap();
        sibling.persist().unwrap();
        assert_eq!(db.persist().unwrap_err().kind, ErrorKind::FilBackendRoMode);
    }

    #[test]
    fn reopen_from_backend_restores_state() {
        let backend = std::sync::Arc::new(MemBackend::new());
        let mut db = TrieStore::open(backend.clone(), StoreConfig::default()).unwrap();
        for byte in [0x01, 0x02, 0x03] {
            db.merge(VertexId::ROOT, &path(byte), raw(&[byte])).unwrap();
            db.persist().unwrap();
        }
        let root = db.root_key(VertexId::ROOT).unwrap();
        let journal_len = db.journal_len().unwrap();
        drop(db);

        let db = TrieStore::open(backend, StoreConfig::default()).unwrap();
        assert_eq!(db.root_key(VertexId::ROOT).unwrap(), root);
        assert_eq!(db.journal_len().unwrap(), journal_len);
        assert_eq!(db.fetch(VertexId::ROOT, &path(0x02)).unwrap(), raw(&[0x02]));
        db.check_backend().unwrap();
    }

    #[test]
    fn storage_subtrie_feeds_account_root() {
        let mut db = TrieStore::new_mem();
        let storage_root = db.new_root();
        db.merge(storage_root, &path(0x01), Payload::Storage(vec![0x2a]))
            .unwrap();
        let account = AccountPayload {
            nonce: 1,
            balance: 7u64.into(),
            storage_root: Some(storage_root),
            code_hash: *EMPTY_ROOT_HASH,
        };
        db.merge(VertexId::ROOT, &path(0xee), Payload::Account(account.clone()))
            .unwrap();
        let root_with_storage = db.hashify().unwrap();

        // changing the storage slot must change the account trie root
        db.merge(storage_root, &path(0x01), Payload::Storage(vec![0x2b]))
            .unwrap();
        let root_after = db.hashify().unwrap();
        assert_ne!(root_with_storage, root_after);
        assert_eq!(
            db.fetch(VertexId::ROOT, &path(0xee)).unwrap(),
            Payload::Account(account)
        );
    }

    #[test]
    fn iterator_yields_paths_in_order() {
        let mut db = TrieStore::new_mem();
        for byte in [0x30, 0x10, 0x20] {
            db.merge(VertexId::ROOT, &path(byte), raw(&[byte])).unwrap();
        }
        let walked: Vec<_> = db.iter(VertexId::ROOT).collect();
        assert_eq!(walked.len(), 3);
        let paths: Vec<Nibbles> = walked.iter().map(|(path, _)| path.clone()).collect();
        assert_eq!(paths[0], Nibbles::from_bytes(&path(0x10)));
        assert_eq!(paths[1], Nibbles::from_bytes(&path(0x20)));
        assert_eq!(paths[2], Nibbles::from_bytes(&path(0x30)));
    }

    #[test]
    fn proof_import_builds_partial_trie() {
        use crate::vertex::keccak;

        // two long-valued leaves under the root branch, prefixes 0x1.. and
        // 0x2.., built as raw RLP proof nodes
        let value_a = vec![0x61; 40];
        let value_b = vec![0x62; 40];
        let pfx_a = Nibbles::from_bytes(&path(0x11)).offset(1);
        let pfx_b = Nibbles::from_bytes(&path(0x22)).offset(1);
        let leaf_a = hashify::leaf_rlp(&pfx_a.encode_compact(true), &value_a);
        let leaf_b = hashify::leaf_rlp(&pfx_b.encode_compact(true), &value_b);
        let mut children = [HashKey::Void; 16];
        children[1] = HashKey::from_rlp(&leaf_a);
        children[2] = HashKey::from_rlp(&leaf_b);
        let branch = hashify::branch_rlp(&children);
        let root_key = HashKey::from_rlp(&branch);
        assert_eq!(root_key, HashKey::Hash(keccak(&branch)));

        let mut db = TrieStore::new_mem();
        let imported = db
            .merge_proof(
                VertexId::ROOT,
                root_key,
                &[branch, leaf_a, leaf_b],
            )
            .unwrap();
        assert_eq!(imported, 3);

        assert_eq!(
            db.fetch(VertexId::ROOT, &path(0x11)).unwrap(),
            raw(&value_a)
        );
        assert_eq!(db.hashify().unwrap(), root_key);

        // imported vertices are locked against edits
        assert_eq!(
            db.merge(VertexId::ROOT, &path(0x11), raw(b"nope"))
                .unwrap_err()
                .kind,
            ErrorKind::MergeLeafProofModeLock
        );
        assert_eq!(
            db.delete(VertexId::ROOT, &path(0x11)).unwrap_err().kind,
            ErrorKind::DelLeafLocked
        );
        assert_eq!(
            db.merge(VertexId::ROOT, &path(0x33), raw(b"nope"))
                .unwrap_err()
                .kind,
            ErrorKind::MergeBranchLinkLockedKey
        );
    }

    #[test]
    fn backend_checker_flags_key_mismatch() {
        let mut db = TrieStore::new_mem();
        db.merge(VertexId::ROOT, &path(0x01), raw(b"x")).unwrap();
        db.persist().unwrap();
        db.check_backend().unwrap();

        use crate::vertex::keccak;
        let mut batch = db.backend.put_begin().unwrap();
        batch.put_key(&[(VertexId::ROOT, HashKey::Hash(keccak(b"garbage")))]);
        db.backend.put_end(batch).unwrap();
        assert_eq!(
            db.check_backend().unwrap_err().kind,
            ErrorKind::CheckBeKeyMismatch
        );
    }

    // Universal properties.
    proptest! {
        #[test]
        fn proptest_fetch_after_insert(data in btree_set(vec(any::<u8>(), 32), 1..40)) {
            let mut db = TrieStore::new_mem();
            for val in data.iter() {
                db.merge(VertexId::ROOT, val, raw(val)).unwrap();
            }
            for val in data.iter() {
                prop_assert_eq!(db.fetch(VertexId::ROOT, val).unwrap(), raw(val));
            }
            db.check().unwrap();
        }

        #[test]
        fn proptest_root_is_insertion_order_independent(
            data in btree_set(vec(any::<u8>(), 32), 1..30)
        ) {
            let mut forward = TrieStore::new_mem();
            for val in data.iter() {
                forward.merge(VertexId::ROOT, val, raw(val)).unwrap();
            }
            let mut backward = TrieStore::new_mem();
            for val in data.iter().rev() {
                backward.merge(VertexId::ROOT, val, raw(val)).unwrap();
            }
            prop_assert_eq!(forward.hashify().unwrap(), backward.hashify().unwrap());
        }

        #[test]
        fn proptest_delete_inverts_merge(data in btree_set(vec(any::<u8>(), 32), 1..30)) {
            let mut db = TrieStore::new_mem();
            for val in data.iter() {
                db.merge(VertexId::ROOT, val, raw(val)).unwrap();
            }
            // delete in reverse insertion order
            for val in data.iter().rev() {
                db.delete(VertexId::ROOT, val).unwrap();
            }
            prop_assert_eq!(db.hashify().unwrap(), HashKey::Hash(*EMPTY_ROOT_HASH));
            prop_assert_eq!(db.top.fin.vgen.canonical_state(), vec![VertexId(1)]);
        }

        #[test]
        fn proptest_persisted_root_matches_in_memory(
            data in btree_set(vec(any::<u8>(), 32), 1..20)
        ) {
            let mut db = TrieStore::new_mem();
            for val in data.iter() {
                db.merge(VertexId::ROOT, val, raw(val)).unwrap();
            }
            let before = db.hashify().unwrap();
            db.persist().unwrap();
            db.check_backend().unwrap();
            prop_assert_eq!(db.root_key(VertexId::ROOT).unwrap(), before);
        }
    }
}
