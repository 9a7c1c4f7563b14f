use std::sync::Arc;
use std::thread;
use std::time::Duration;

use granitedb::common::types::Rid;
use granitedb::transaction::concurrency::{
    AbortReason, IsolationLevel, LockManager, TransactionManager, TransactionState,
};

mod common;
use common::{test_txn, test_txn_with_isolation};

#[test]
fn shared_locks_are_compatible() {
    let lock_manager = LockManager::new();
    let rid = Rid::new(1, 0);
    let t1 = test_txn(1);
    let t2 = test_txn(2);

    assert!(lock_manager.lock_shared(&t1, rid).unwrap());
    assert!(lock_manager.lock_shared(&t2, rid).unwrap());
    assert!(t1.is_shared_locked(rid));
    assert!(t2.is_shared_locked(rid));

    assert!(lock_manager.unlock(&t1, rid));
    assert!(lock_manager.unlock(&t2, rid));
}

/// LM1: re-requesting a held lock returns immediately.
#[test]
fn lock_requests_are_idempotent() {
    let lock_manager = LockManager::new();
    let rid = Rid::new(1, 0);
    let t1 = test_txn(1);

    assert!(lock_manager.lock_shared(&t1, rid).unwrap());
    assert!(lock_manager.lock_shared(&t1, rid).unwrap());

    let t2 = test_txn(2);
    let other = Rid::new(1, 1);
    assert!(lock_manager.lock_exclusive(&t2, other).unwrap());
    assert!(lock_manager.lock_exclusive(&t2, other).unwrap());
    // an exclusive holder re-requesting shared also short-circuits
    assert!(lock_manager.lock_shared(&t2, other).unwrap());
}

#[test]
fn shared_on_read_uncommitted_aborts() {
    let lock_manager = LockManager::new();
    let rid = Rid::new(1, 0);
    let txn = test_txn_with_isolation(1, IsolationLevel::ReadUncommitted);

    let err = lock_manager.lock_shared(&txn, rid).unwrap_err();
    assert_eq!(err.reason, AbortReason::LockSharedOnReadUncommitted);
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn exclusive_allowed_under_read_uncommitted() {
    let lock_manager = LockManager::new();
    let rid = Rid::new(1, 0);
    let txn = test_txn_with_isolation(1, IsolationLevel::ReadUncommitted);

    assert!(lock_manager.lock_exclusive(&txn, rid).unwrap());
    assert!(txn.is_exclusive_locked(rid));
}

/// Strict 2PL transitions: releasing an exclusive lock, or any lock under
/// REPEATABLE_READ, moves the transaction to SHRINKING, after which new
/// lock requests abort.
#[test]
fn unlock_shrinks_and_blocks_new_locks() {
    let lock_manager = LockManager::new();
    let rid = Rid::new(1, 0);

    // REPEATABLE_READ: releasing a shared lock shrinks
    let rr = test_txn_with_isolation(1, IsolationLevel::RepeatableRead);
    assert!(lock_manager.lock_shared(&rr, rid).unwrap());
    assert!(lock_manager.unlock(&rr, rid));
    assert_eq!(rr.state(), TransactionState::Shrinking);
    let err = lock_manager.lock_shared(&rr, rid).unwrap_err();
    assert_eq!(err.reason, AbortReason::LockOnShrinking);
    assert_eq!(rr.state(), TransactionState::Aborted);

    // READ_COMMITTED: releasing a shared lock does not shrink
    let rc = test_txn_with_isolation(2, IsolationLevel::ReadCommitted);
    assert!(lock_manager.lock_shared(&rc, rid).unwrap());
    assert!(lock_manager.unlock(&rc, rid));
    assert_eq!(rc.state(), TransactionState::Growing);
    assert!(lock_manager.lock_shared(&rc, rid).unwrap());
    assert!(lock_manager.unlock(&rc, rid));

    // ... but releasing an exclusive lock does
    assert!(lock_manager.lock_exclusive(&rc, rid).unwrap());
    assert!(lock_manager.unlock(&rc, rid));
    assert_eq!(rc.state(), TransactionState::Shrinking);
}

#[test]
fn unlock_without_request_fails() {
    let lock_manager = LockManager::new();
    let t1 = test_txn(1);
    assert!(!lock_manager.unlock(&t1, Rid::new(1, 0)));
}

/// An older transaction waits for an older holder; a younger waiter blocks
/// until the holder releases.
#[test]
fn younger_waits_for_older_holder() {
    let lock_manager = Arc::new(LockManager::new());
    let rid = Rid::new(1, 0);
    let t1 = test_txn(1);

    assert!(lock_manager.lock_exclusive(&t1, rid).unwrap());

    let waiter = {
        let lock_manager = lock_manager.clone();
        thread::spawn(move || {
            let t2 = test_txn(2);
            let granted = lock_manager.lock_shared(&t2, rid).unwrap();
            (granted, t2)
        })
    };

    // let the younger transaction park on the queue
    thread::sleep(Duration::from_millis(100));
    assert!(lock_manager.unlock(&t1, rid));

    let (granted, t2) = waiter.join().unwrap();
    assert!(granted);
    assert!(t2.is_shared_locked(rid));
}

/// Wound-wait: an old transaction kills younger waiters in its way, then
/// waits for the queue to clear.
#[test]
fn wound_wait_aborts_younger_waiter() {
    let lock_manager = Arc::new(LockManager::new());
    let rid = Rid::new(1, 0);

    let t10 = test_txn(10);
    assert!(lock_manager.lock_exclusive(&t10, rid).unwrap());

    // t20 is younger; it parks behind t10's exclusive lock
    let t20_handle = {
        let lock_manager = lock_manager.clone();
        thread::spawn(move || {
            let t20 = test_txn(20);
            let granted = lock_manager.lock_shared(&t20, rid).unwrap();
            (granted, t20)
        })
    };
    thread::sleep(Duration::from_millis(100));

    // t5 is the oldest: it wounds t20 and then waits for t10 to finish
    let t5_handle = {
        let lock_manager = lock_manager.clone();
        thread::spawn(move || {
            let t5 = test_txn(5);
            let granted = lock_manager.lock_exclusive(&t5, rid).unwrap();
            (granted, t5)
        })
    };
    thread::sleep(Duration::from_millis(100));

    // the wounded waiter comes back empty-handed
    let (t20_granted, t20) = t20_handle.join().unwrap();
    assert!(!t20_granted);
    assert_eq!(t20.state(), TransactionState::Aborted);
    assert!(!t20.is_shared_locked(rid));

    // the holder releases; the oldest transaction gets the lock
    assert!(lock_manager.unlock(&t10, rid));
    let (t5_granted, t5) = t5_handle.join().unwrap();
    assert!(t5_granted);
    assert!(t5.is_exclusive_locked(rid));
}

/// Scenario: upgrade while another upgrade is pending aborts immediately.
#[test]
fn concurrent_upgrade_conflicts() {
    let lock_manager = Arc::new(LockManager::new());
    let rid = Rid::new(1, 0);

    let t1 = test_txn(1);
    let t2 = test_txn(2);
    assert!(lock_manager.lock_shared(&t1, rid).unwrap());
    assert!(lock_manager.lock_shared(&t2, rid).unwrap());

    // t1's upgrade has to wait for t2's shared lock to go away
    let t1_handle = {
        let lock_manager = lock_manager.clone();
        let t1 = t1.clone();
        thread::spawn(move || lock_manager.lock_upgrade(&t1, rid).unwrap())
    };
    thread::sleep(Duration::from_millis(100));

    // a second pending upgrade is an immediate conflict
    let err = lock_manager.lock_upgrade(&t2, rid).unwrap_err();
    assert_eq!(err.reason, AbortReason::UpgradeConflict);

    // t2 backs off entirely; t1's upgrade completes
    assert!(lock_manager.unlock(&t2, rid));
    assert!(t1_handle.join().unwrap());
    assert!(t1.is_exclusive_locked(rid));
    assert!(!t1.is_shared_locked(rid));
}

#[test]
fn upgrade_requires_shared_lock() {
    let lock_manager = LockManager::new();
    let rid = Rid::new(1, 0);
    let t1 = test_txn(1);

    // no lock at all: nothing to upgrade
    assert!(!lock_manager.lock_upgrade(&t1, rid).unwrap());

    // already exclusive: upgrade is a no-op success
    assert!(lock_manager.lock_exclusive(&t1, rid).unwrap());
    assert!(lock_manager.lock_upgrade(&t1, rid).unwrap());
    assert!(t1.is_exclusive_locked(rid));
}

#[test]
fn single_holder_upgrade_is_immediate() {
    let lock_manager = LockManager::new();
    let rid = Rid::new(1, 0);
    let t1 = test_txn(1);

    assert!(lock_manager.lock_shared(&t1, rid).unwrap());
    assert!(lock_manager.lock_upgrade(&t1, rid).unwrap());
    assert!(t1.is_exclusive_locked(rid));
    assert!(!t1.is_shared_locked(rid));

    // the exclusive lock is real: release shrinks the transaction
    assert!(lock_manager.unlock(&t1, rid));
    assert_eq!(t1.state(), TransactionState::Shrinking);
}

/// Rollback through the transaction manager releases locks and wakes
/// blocked transactions.
#[test]
fn abort_releases_locks_and_wakes_waiters() {
    let lock_manager = Arc::new(LockManager::new());
    let manager = TransactionManager::new(lock_manager.clone());
    let rid = Rid::new(1, 0);

    let t1 = manager.begin(IsolationLevel::RepeatableRead);
    assert!(lock_manager.lock_exclusive(&t1, rid).unwrap());

    let waiter = {
        let lock_manager = lock_manager.clone();
        let t2 = manager.begin(IsolationLevel::RepeatableRead);
        thread::spawn(move || {
            let granted = lock_manager.lock_shared(&t2, rid).unwrap();
            (granted, t2)
        })
    };
    thread::sleep(Duration::from_millis(100));

    manager.abort(&t1).unwrap();

    let (granted, t2) = waiter.join().unwrap();
    assert!(granted);
    assert!(t2.is_shared_locked(rid));
}
