//! Nested transactions over the layer stack, and the restricted execute
//! mode for read-only re-entry onto historical layers.

use tracing::trace;

use crate::errors::{err, ErrorKind, Result};
use crate::layer::Layer;
use crate::store::TrieStore;
use crate::vid::VertexId;

/// Transaction uids at or above this value belong to execute mode; the
/// low range below it is issued by `tx_begin`.
pub(crate) const EXEC_TX_UID: u64 = 1 << 63;

/// Handle onto one open transaction. Carries the uid stamped into its layer
/// and the stack position the layer was saved at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieTx {
    pub(crate) uid: u64,
    pub(crate) level: usize,
}

impl TrieStore {
    /// Handle onto the innermost open transaction, if any. Inside execute
    /// mode this is the synthetic locked base transaction.
    pub fn tx_top(&self) -> Option<TrieTx> {
        (self.top.tx_uid != 0).then_some(TrieTx {
            uid: self.top.tx_uid,
            level: self.stack.len(),
        })
    }

    /// Whether `tx` is the innermost open transaction.
    pub fn is_top(&self, tx: &TrieTx) -> bool {
        tx.level == self.stack.len() && self.top.tx_uid == tx.uid
    }

    /// Whether `tx` still refers to a live layer, top or not.
    fn is_live(&self, tx: &TrieTx) -> bool {
        if tx.level == 0 {
            return false;
        }
        if tx.level == self.stack.len() {
            self.top.tx_uid == tx.uid
        } else {
            self.stack
                .get(tx.level)
                .is_some_and(|layer| layer.tx_uid == tx.uid)
        }
    }

    /// Opens a nested transaction: the current top layer is saved onto the
    /// stack and keeps accumulating under a fresh uid.
    pub fn tx_begin(&mut self) -> TrieTx {
        self.tx_uid_gen += 1;
        let uid = if self.top.tx_uid >= EXEC_TX_UID {
            // inside execute mode uids continue in the locked range
            self.tx_uid_gen.max(EXEC_TX_UID + 1)
        } else {
            self.tx_uid_gen
        };
        self.stack.push(self.top.clone());
        self.top.tx_uid = uid;
        trace!(uid, level = self.stack.len(), "tx: begin");
        TrieTx {
            uid,
            level: self.stack.len(),
        }
    }

    fn check_top(&self, tx: &TrieTx) -> Result<()> {
        if !self.is_live(tx) {
            return err(VertexId::NONE, ErrorKind::TxStaleTx);
        }
        if !self.is_top(tx) {
            return err(VertexId::NONE, ErrorKind::TxNotTopTx);
        }
        Ok(())
    }

    /// Commits the top transaction: its parent's saved layer is discarded,
    /// superseded by the current top.
    pub fn commit(&mut self, tx: &TrieTx) -> Result<()> {
        self.check_top(tx)?;
        if tx.uid >= EXEC_TX_UID {
            return err(VertexId::NONE, ErrorKind::TxExecBaseTxLocked);
        }
        let Some(parent) = self.stack.pop() else {
            return err(VertexId::NONE, ErrorKind::TxStackUnderflow);
        };
        self.top.tx_uid = parent.tx_uid;
        trace!(uid = tx.uid, "tx: commit");
        Ok(())
    }

    /// Rolls the top transaction back, restoring the saved parent layer.
    pub fn rollback(&mut self, tx: &TrieTx) -> Result<()> {
        self.check_top(tx)?;
        if tx.uid >= EXEC_TX_UID {
            return err(VertexId::NONE, ErrorKind::TxExecBaseTxLocked);
        }
        let Some(parent) = self.stack.pop() else {
            return err(VertexId::NONE, ErrorKind::TxStackUnderflow);
        };
        self.top = parent;
        trace!(uid = tx.uid, "tx: rollback");
        Ok(())
    }

    /// Commits or rolls back everything from the top transaction down to the
    /// base, leaving no transaction open.
    pub fn collapse(&mut self, tx: &TrieTx, commit: bool) -> Result<()> {
        self.check_top(tx)?;
        if tx.uid >= EXEC_TX_UID {
            return err(VertexId::NONE, ErrorKind::TxExecBaseTxLocked);
        }
        if self.stack.is_empty() {
            return err(VertexId::NONE, ErrorKind::TxStackUnderflow);
        }
        if commit {
            self.stack.clear();
            self.top.tx_uid = 0;
        } else {
            let base = self.stack.swap_remove(0);
            self.stack.clear();
            self.top = base;
        }
        trace!(uid = tx.uid, commit, "tx: collapse");
        Ok(())
    }

    /// Runs a read-only action against the layer of `tx`, historical or not,
    /// without disturbing the live stack.
    ///
    /// The action sees the store re-entered onto that layer, stamped into
    /// the execute uid range: committing or rolling back the synthetic base
    /// fails with `TxExecBaseTxLocked`, and `stow`/`persist` fail with
    /// `TxExecDirectiveLocked`. Whatever the action does or returns, the
    /// previous state is restored before this call comes back.
    pub fn execute<R>(
        &mut self,
        tx: &TrieTx,
        action: impl FnOnce(&mut TrieStore) -> Result<R>,
    ) -> Result<R> {
        if self.tx_uid_gen >= EXEC_TX_UID {
            return err(VertexId::NONE, ErrorKind::TxExecNestingAttempt);
        }
        if !self.is_live(tx) {
            return err(VertexId::NONE, ErrorKind::TxStaleTx);
        }

        let saved_top = self.top.clone();
        let saved_stack = std::mem::take(&mut self.stack);
        let saved_roots = self.roots.clone();
        let saved_proof_keys = self.proof_keys.clone();
        let saved_owners = self.storage_owner.clone();
        let saved_uid_gen = self.tx_uid_gen;

        // materialise the historical layer when `tx` is not the live top
        if tx.level < saved_stack.len() {
            self.top = saved_stack[tx.level].clone();
        }
        self.top.tx_uid = EXEC_TX_UID;
        self.tx_uid_gen = EXEC_TX_UID;
        self.stack = vec![Layer::default()];

        let result = action(self);

        self.top = saved_top;
        self.stack = saved_stack;
        self.roots = saved_roots;
        self.proof_keys = saved_proof_keys;
        self.storage_owner = saved_owners;
        self.tx_uid_gen = saved_uid_gen;
        trace!(uid = tx.uid, ok = result.is_ok(), "tx: execute finished");
        result
    }
}
