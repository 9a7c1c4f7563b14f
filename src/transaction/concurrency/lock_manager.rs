use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use log::debug;
use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionState,
};

/// Why the lock manager aborted a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockSharedOnReadUncommitted,
    LockOnShrinking,
    UpgradeConflict,
    Deadlock,
}

/// Raised when a lock request violates the 2PL or isolation rules. The
/// transaction has already been marked aborted; the transaction manager is
/// expected to roll it back.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transaction {txn_id} aborted: {reason:?}")]
pub struct TransactionAbort {
    pub txn_id: TxnId,
    pub reason: AbortReason,
}

impl TransactionAbort {
    pub fn new(txn_id: TxnId, reason: AbortReason) -> Self {
        Self { txn_id, reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

impl LockRequest {
    fn new(txn_id: TxnId, mode: LockMode) -> Self {
        Self {
            txn_id,
            mode,
            granted: false,
        }
    }
}

/// Per-RID request queue. Requests are appended at arrival; a SHARED request
/// is grantable when no EXCLUSIVE request precedes it, an EXCLUSIVE request
/// when nothing precedes it. At most one upgrade may be pending.
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
    upgrading: Option<TxnId>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
            upgrading: None,
        }
    }
}

#[derive(Default)]
struct LockTable {
    queues: HashMap<Rid, LockRequestQueue>,
    /// Transactions currently holding or waiting for some lock
    txn_map: HashMap<TxnId, Arc<Transaction>>,
    /// Which queue each sleeping transaction is parked on, so wounding can
    /// wake it
    sleeping_on: HashMap<TxnId, Rid>,
}

/// Row-level lock manager: strict-enough two-phase locking with wound-wait
/// deadlock prevention. A single latch guards all queues; waiters sleep on
/// their queue's condition variable and always recheck state on wake.
pub struct LockManager {
    latch: Mutex<LockTable>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            latch: Mutex::new(LockTable::default()),
        }
    }

    /// Acquire a SHARED lock. `Ok(true)` on grant, `Ok(false)` if this
    /// transaction was wounded while waiting.
    pub fn lock_shared(
        &self,
        txn: &Arc<Transaction>,
        rid: Rid,
    ) -> Result<bool, TransactionAbort> {
        let mut table = self.latch.lock();

        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort::new(
                txn.id(),
                AbortReason::LockSharedOnReadUncommitted,
            ));
        }
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort::new(txn.id(), AbortReason::LockOnShrinking));
        }
        if Self::holds_request(&table, txn.id(), rid) {
            return Ok(true);
        }

        table.txn_map.insert(txn.id(), txn.clone());
        table
            .queues
            .entry(rid)
            .or_default()
            .requests
            .push_back(LockRequest::new(txn.id(), LockMode::Shared));

        if !self.wait_for_grant(&mut table, txn, rid, LockMode::Shared, false) {
            return Ok(false);
        }

        Self::mark_granted(&mut table, txn.id(), rid);
        txn.shared_lock_set().lock().insert(rid);
        Ok(true)
    }

    /// Acquire an EXCLUSIVE lock. Same return convention as `lock_shared`.
    pub fn lock_exclusive(
        &self,
        txn: &Arc<Transaction>,
        rid: Rid,
    ) -> Result<bool, TransactionAbort> {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort::new(txn.id(), AbortReason::LockOnShrinking));
        }
        if Self::holds_request(&table, txn.id(), rid) {
            return Ok(true);
        }

        table.txn_map.insert(txn.id(), txn.clone());
        table
            .queues
            .entry(rid)
            .or_default()
            .requests
            .push_back(LockRequest::new(txn.id(), LockMode::Exclusive));

        if !self.wait_for_grant(&mut table, txn, rid, LockMode::Exclusive, false) {
            return Ok(false);
        }

        Self::mark_granted(&mut table, txn.id(), rid);
        txn.exclusive_lock_set().lock().insert(rid);
        Ok(true)
    }

    /// Upgrade a held SHARED lock to EXCLUSIVE. Only one upgrade may wait
    /// per RID; a second upgrader aborts with `UpgradeConflict`.
    pub fn lock_upgrade(
        &self,
        txn: &Arc<Transaction>,
        rid: Rid,
    ) -> Result<bool, TransactionAbort> {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort::new(txn.id(), AbortReason::LockOnShrinking));
        }

        {
            let Some(queue) = table.queues.get_mut(&rid) else {
                return Ok(false);
            };
            if queue.upgrading.is_some() {
                txn.set_state(TransactionState::Aborted);
                return Err(TransactionAbort::new(txn.id(), AbortReason::UpgradeConflict));
            }

            let mut holds_shared = false;
            for request in &queue.requests {
                if request.txn_id == txn.id() {
                    if request.mode == LockMode::Exclusive {
                        return Ok(true);
                    }
                    holds_shared = true;
                    break;
                }
            }
            if !holds_shared {
                return Ok(false);
            }

            queue
                .requests
                .push_back(LockRequest::new(txn.id(), LockMode::Exclusive));
            queue.upgrading = Some(txn.id());
        }
        table.txn_map.insert(txn.id(), txn.clone());

        if !self.wait_for_grant(&mut table, txn, rid, LockMode::Exclusive, true) {
            return Ok(false);
        }

        if let Some(queue) = table.queues.get_mut(&rid) {
            // The shared request retires; the exclusive one becomes the lock
            if let Some(pos) = queue
                .requests
                .iter()
                .position(|r| r.txn_id == txn.id() && r.mode == LockMode::Shared)
            {
                queue.requests.remove(pos);
            }
            if let Some(request) = queue
                .requests
                .iter_mut()
                .find(|r| r.txn_id == txn.id() && r.mode == LockMode::Exclusive)
            {
                request.granted = true;
            }
            queue.upgrading = None;
        }

        txn.shared_lock_set().lock().remove(&rid);
        txn.exclusive_lock_set().lock().insert(rid);
        Ok(true)
    }

    /// Release this transaction's lock on a RID. Returns false if it holds
    /// no request there. Shrinks the 2PL state when releasing an EXCLUSIVE
    /// lock, or any lock under REPEATABLE_READ.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        let (mode, queue_empty) = {
            let Some(queue) = table.queues.get_mut(&rid) else {
                return false;
            };
            let Some(pos) = queue.requests.iter().position(|r| r.txn_id == txn.id()) else {
                return false;
            };
            let mode = queue.requests[pos].mode;
            queue.requests.remove(pos);
            if queue.requests.is_empty() {
                (mode, true)
            } else {
                queue.cv.notify_all();
                (mode, false)
            }
        };
        if queue_empty {
            table.queues.remove(&rid);
        }

        txn.shared_lock_set().lock().remove(&rid);
        txn.exclusive_lock_set().lock().remove(&rid);

        if (txn.isolation_level() == IsolationLevel::RepeatableRead
            || mode == LockMode::Exclusive)
            && txn.state() == TransactionState::Growing
        {
            txn.set_state(TransactionState::Shrinking);
        }

        // The registry entry stays as long as the transaction holds any lock
        // on any RID
        if !Self::holds_any_lock(txn) {
            table.txn_map.remove(&txn.id());
        }

        true
    }

    /// Release every lock the transaction holds; used by commit and rollback
    pub fn unlock_all(&self, txn: &Arc<Transaction>) {
        for rid in txn.held_rids() {
            self.unlock(txn, rid);
        }
    }

    /// Wait until no conflicting request precedes ours, wounding younger
    /// conflicting transactions on every pass. Returns false if this
    /// transaction was itself wounded while waiting.
    fn wait_for_grant(
        &self,
        table: &mut MutexGuard<'_, LockTable>,
        txn: &Arc<Transaction>,
        rid: Rid,
        mode: LockMode,
        upgrade: bool,
    ) -> bool {
        let cv = match table.queues.get(&rid) {
            Some(queue) => queue.cv.clone(),
            None => return false,
        };

        loop {
            if txn.state() == TransactionState::Aborted {
                Self::abandon_request(table, txn, rid, upgrade);
                return false;
            }

            let (blocked, to_wake) = Self::wound_and_check(table, rid, txn.id(), mode, upgrade);
            for wake_rid in to_wake {
                if let Some(queue) = table.queues.get(&wake_rid) {
                    queue.cv.notify_all();
                }
            }

            if !blocked {
                table.sleeping_on.remove(&txn.id());
                return true;
            }

            table.sleeping_on.insert(txn.id(), rid);
            cv.wait(table);
        }
    }

    /// One wound-wait pass over the requests ahead of ours: mark younger
    /// conflicting transactions aborted and collect the queues they sleep on.
    /// Returns whether any conflicting request (wounded or not) remains
    /// ahead; a wounded holder still blocks us until its request leaves the
    /// queue.
    fn wound_and_check(
        table: &LockTable,
        rid: Rid,
        txn_id: TxnId,
        mode: LockMode,
        upgrade: bool,
    ) -> (bool, Vec<Rid>) {
        let mut blocked = false;
        let mut to_wake = Vec::new();

        let Some(queue) = table.queues.get(&rid) else {
            return (false, to_wake);
        };

        for request in &queue.requests {
            if request.txn_id == txn_id {
                if upgrade && request.mode == LockMode::Shared {
                    // our retiring shared lock never blocks our upgrade
                    continue;
                }
                break;
            }

            let conflicts = match mode {
                LockMode::Shared => request.mode == LockMode::Exclusive,
                LockMode::Exclusive => true,
            };
            if !conflicts {
                continue;
            }

            if request.txn_id > txn_id {
                if let Some(victim) = table.txn_map.get(&request.txn_id) {
                    debug!("txn {} wounds younger txn {}", txn_id, request.txn_id);
                    victim.set_state(TransactionState::Aborted);
                }
                if let Some(&sleeping_rid) = table.sleeping_on.get(&request.txn_id) {
                    to_wake.push(sleeping_rid);
                }
            }
            blocked = true;
        }

        (blocked, to_wake)
    }

    /// Withdraw a wounded transaction's pending request and let the rest of
    /// the queue recheck
    fn abandon_request(table: &mut LockTable, txn: &Arc<Transaction>, rid: Rid, upgrade: bool) {
        let queue_empty = match table.queues.get_mut(&rid) {
            Some(queue) => {
                if upgrade {
                    queue.requests.retain(|r| {
                        !(r.txn_id == txn.id() && r.mode == LockMode::Exclusive && !r.granted)
                    });
                    queue.upgrading = None;
                } else {
                    queue.requests.retain(|r| r.txn_id != txn.id());
                }
                queue.cv.notify_all();
                queue.requests.is_empty()
            }
            None => false,
        };
        if queue_empty {
            table.queues.remove(&rid);
        }

        table.sleeping_on.remove(&txn.id());
        if !Self::holds_any_lock(txn) {
            table.txn_map.remove(&txn.id());
        }
    }

    fn mark_granted(table: &mut LockTable, txn_id: TxnId, rid: Rid) {
        if let Some(queue) = table.queues.get_mut(&rid) {
            if let Some(request) = queue.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                request.granted = true;
            }
        }
    }

    fn holds_request(table: &LockTable, txn_id: TxnId, rid: Rid) -> bool {
        table
            .queues
            .get(&rid)
            .map_or(false, |queue| queue.requests.iter().any(|r| r.txn_id == txn_id))
    }

    fn holds_any_lock(txn: &Arc<Transaction>) -> bool {
        !txn.shared_lock_set().lock().is_empty() || !txn.exclusive_lock_set().lock().is_empty()
    }
}
