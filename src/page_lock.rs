use std::collections::HashSet;

use crate::heap_page::Permission;
use crate::transaction::TransactionId;

/// Per-page lock state: a set of shared holders, or a single exclusive
/// holder. Invariant: if `exclusive` is set, `shared` is empty.
#[derive(Debug, Default, Clone)]
pub struct PageLock {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl PageLock {
    pub fn new() -> Self {
        PageLock::default()
    }

    /// Attempts to grant `mode` to `tid`. Returns `true` if granted,
    /// `false` if the caller must wait. Never blocks.
    pub fn add_lock(&mut self, mode: Permission, tid: TransactionId) -> bool {
        match mode {
            Permission::ReadOnly => {
                if self.exclusive.is_none() || self.exclusive == Some(tid) {
                    self.shared.insert(tid);
                    true
                } else {
                    false
                }
            }
            Permission::ReadWrite => {
                if self.exclusive == Some(tid) {
                    return true;
                }
                if self.exclusive.is_none()
                    && (self.shared.is_empty() || (self.shared.len() == 1 && self.shared.contains(&tid)))
                {
                    self.exclusive = Some(tid);
                    self.shared.clear();
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn release_lock(&mut self, tid: TransactionId) {
        self.shared.remove(&tid);
        if self.exclusive == Some(tid) {
            self.exclusive = None;
        }
    }

    pub fn is_holding(&self, tid: TransactionId) -> bool {
        self.shared.contains(&tid) || self.exclusive == Some(tid)
    }

    /// The union of shared holders and the exclusive holder, used by the
    /// buffer pool to build wait-for edges.
    pub fn related_txs(&self) -> HashSet<TransactionId> {
        let mut txs = self.shared.clone();
        if let Some(tid) = self.exclusive {
            txs.insert(tid);
        }
        txs
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}
