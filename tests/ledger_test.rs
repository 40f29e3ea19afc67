//! Engine-level tests: concurrency, atomicity, audit trail and recovery.

use bank_ledger::{
    Account, AccountStore, Amount, EventPolicy, InMemoryAccountStore, InMemoryEventSink,
    LedgerConfig, LedgerEngine, LedgerError, OwnershipPolicy, Participant, StorageError,
    TransactionLog,
};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

const M: &str = "mustafizur118@gmail.com";
const S: &str = "shakil@gmail.com";

fn dec(s: &str) -> Amount {
    Amount::from_str(s).unwrap()
}

fn seed(engine: &LedgerEngine, a: &str, b: &str) {
    engine
        .register_participant(Participant::new(M, "Mustafizur", "R"))
        .unwrap();
    engine
        .register_participant(Participant::new(S, "Shakil", "L"))
        .unwrap();
    engine.open_account("1", M, dec(a), M).unwrap();
    engine.open_account("2", S, dec(b), S).unwrap();
}

fn balance(engine: &LedgerEngine, id: &str) -> Amount {
    engine.get_account(id, M).unwrap().balance
}

/// Store wrapper that fails writes to one account while armed, and fails
/// every write once its write budget runs out.
struct FlakyStore {
    inner: InMemoryAccountStore,
    fail_put_for: String,
    armed: AtomicBool,
    put_budget: AtomicUsize,
}

impl FlakyStore {
    fn failing(id: &str) -> Self {
        FlakyStore {
            inner: InMemoryAccountStore::new(),
            fail_put_for: id.to_string(),
            armed: AtomicBool::new(false),
            put_budget: AtomicUsize::new(usize::MAX),
        }
    }
}

impl AccountStore for FlakyStore {
    fn get(&self, id: &str) -> Result<Account, StorageError> {
        self.inner.get(id)
    }

    fn put(&self, account: Account) -> Result<Account, StorageError> {
        if self.armed.load(Ordering::SeqCst) && account.id == self.fail_put_for {
            return Err(StorageError::Unavailable("disk full".to_string()));
        }
        let spent = self
            .put_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if spent.is_err() {
            return Err(StorageError::Unavailable("write budget exhausted".to_string()));
        }
        self.inner.put(account)
    }

    fn exists(&self, id: &str) -> bool {
        self.inner.exists(id)
    }

    fn insert(&self, account: Account) -> Result<Account, StorageError> {
        self.inner.insert(account)
    }

    fn remove(&self, id: &str) -> Result<Account, StorageError> {
        self.inner.remove(id)
    }

    fn list(&self) -> Result<Vec<Account>, StorageError> {
        self.inner.list()
    }

    fn get_participant(&self, id: &str) -> Result<Participant, StorageError> {
        self.inner.get_participant(id)
    }

    fn insert_participant(&self, participant: Participant) -> Result<(), StorageError> {
        self.inner.insert_participant(participant)
    }
}

// ==================== ATOMICITY ====================

#[test]
fn test_failed_credit_write_rolls_back_debit() {
    let store = Arc::new(FlakyStore::failing("2"));
    let engine = LedgerEngine::from_parts(
        store.clone(),
        Arc::new(OwnershipPolicy::default()),
        Arc::new(InMemoryEventSink::new()),
        LedgerConfig::default(),
    )
    .unwrap();
    seed(&engine, "10", "20");

    store.armed.store(true, Ordering::SeqCst);
    let err = engine.transfer("1", "2", dec("5"), M).unwrap_err();

    assert!(matches!(err, LedgerError::Storage(StorageError::Unavailable(_))));
    assert!(err.is_transient());
    assert_eq!(balance(&engine, "1"), dec("10"));
    assert_eq!(balance(&engine, "2"), dec("20"));
    assert!(engine.events().is_empty());

    // The ledger is still usable once storage recovers.
    store.armed.store(false, Ordering::SeqCst);
    engine.transfer("1", "2", dec("5"), M).unwrap();
    assert_eq!(balance(&engine, "1"), dec("5"));
    assert_eq!(balance(&engine, "2"), dec("25"));
}

#[test]
fn test_failed_rollback_is_reported_distinctly() {
    let store = Arc::new(FlakyStore::failing("2"));
    let engine = LedgerEngine::from_parts(
        store.clone(),
        Arc::new(OwnershipPolicy::default()),
        Arc::new(InMemoryEventSink::new()),
        LedgerConfig::default(),
    )
    .unwrap();
    seed(&engine, "10", "20");

    // Debit write succeeds, credit write fails, restoring the debit fails.
    store.armed.store(true, Ordering::SeqCst);
    store.put_budget.store(1, Ordering::SeqCst);
    let err = engine.transfer("1", "2", dec("5"), M).unwrap_err();

    match &err {
        LedgerError::RollbackFailed {
            account,
            write_error,
            rollback_error,
        } => {
            assert_eq!(account, "1");
            assert_eq!(write_error, &StorageError::Unavailable("disk full".to_string()));
            assert_eq!(
                rollback_error,
                &StorageError::Unavailable("write budget exhausted".to_string())
            );
        }
        other => panic!("Expected RollbackFailed, got {other:?}"),
    }
    assert!(!err.is_transient());
    assert_eq!(balance(&engine, "1"), dec("5"));
    assert_eq!(balance(&engine, "2"), dec("20"));
    assert!(engine.events().is_empty());
}

#[test]
fn test_failed_single_write_changes_nothing() {
    let store = Arc::new(FlakyStore::failing("1"));
    let engine = LedgerEngine::from_parts(
        store.clone(),
        Arc::new(OwnershipPolicy::default()),
        Arc::new(InMemoryEventSink::new()),
        LedgerConfig::default().with_event_policy(EventPolicy::AllBalanceChanges),
    )
    .unwrap();
    seed(&engine, "10", "20");

    store.armed.store(true, Ordering::SeqCst);
    assert!(engine.add_funds("1", dec("1"), M).is_err());
    assert!(engine.transfer("1", "2", dec("1"), M).is_err());

    assert_eq!(balance(&engine, "1"), dec("10"));
    assert_eq!(balance(&engine, "2"), dec("20"));
    assert!(engine.events().is_empty());
}

// ==================== CONCURRENCY ====================

#[test]
fn test_opposite_transfers_do_not_deadlock() {
    let engine = Arc::new(LedgerEngine::new());
    seed(&engine, "1000", "1000");

    let forward = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..200 {
                engine.transfer("1", "2", dec("1"), M).unwrap();
            }
        })
    };
    let backward = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..200 {
                engine.transfer("2", "1", dec("2"), S).unwrap();
            }
        })
    };

    forward.join().unwrap();
    backward.join().unwrap();

    assert_eq!(balance(&engine, "1"), dec("1200"));
    assert_eq!(balance(&engine, "2"), dec("800"));
    assert_eq!(engine.events().len(), 400);
}

#[test]
fn test_concurrent_withdrawals_never_overdraw() {
    let engine = Arc::new(LedgerEngine::new());
    seed(&engine, "50", "0");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..20)
                    .filter(|_| engine.withdraw("1", dec("1"), M).is_ok())
                    .count()
            })
        })
        .collect();

    let succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(succeeded, 50);
    assert_eq!(balance(&engine, "1"), Amount::ZERO);
}

#[test]
fn test_balances_are_conserved() {
    let engine = Arc::new(LedgerEngine::new());
    seed(&engine, "100", "100");

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut net_external: i64 = 0;
                for i in 0..50 {
                    let (owner, own, other) = if (worker + i) % 2 == 0 {
                        (M, "1", "2")
                    } else {
                        (S, "2", "1")
                    };
                    match i % 3 {
                        0 => {
                            engine.add_funds(own, dec("3"), owner).unwrap();
                            net_external += 3;
                        }
                        1 => {
                            if engine.withdraw(own, dec("2"), owner).is_ok() {
                                net_external -= 2;
                            }
                        }
                        _ => {
                            let _ = engine.transfer(own, other, dec("7"), owner);
                        }
                    }
                }
                net_external
            })
        })
        .collect();

    let net: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let total = balance(&engine, "1")
        .checked_add(balance(&engine, "2"))
        .unwrap();
    assert_eq!(total, Amount::from_units(200 + net));
    assert!(!balance(&engine, "1").is_negative());
    assert!(!balance(&engine, "2").is_negative());
}

// ==================== EVENTS ====================

#[test]
fn test_subscriber_receives_transfer_event() {
    let engine = LedgerEngine::new();
    seed(&engine, "10", "20");
    let rx = engine.subscribe();

    let receipt = engine.transfer("1", "2", dec("5"), M).unwrap();
    engine.add_funds("2", dec("15"), S).unwrap();

    let received: Vec<_> = rx.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event_id, receipt.event_ids[0]);
    assert_eq!(received[0].old_value.to_string(), "10.0000");
    assert_eq!(received[0].new_value.to_string(), "5.0000");
}

// ==================== AUDIT & RECOVERY ====================

#[test]
fn test_transaction_log_replay_rebuilds_balances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");

    {
        let engine = LedgerEngine::with_config(LedgerConfig::default().with_tx_log(&path)).unwrap();
        seed(&engine, "10", "20");
        engine.transfer("1", "2", dec("5"), M).unwrap();
        engine.withdraw("1", dec("100"), M).unwrap_err();
        engine.add_funds("2", dec("15"), S).unwrap();
        engine.add_funds("1", dec("1"), S).unwrap_err();
    }

    let entries = TransactionLog::read_all(&path).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(
        entries.iter().filter(|e| e.outcome.is_committed()).count(),
        2
    );

    let rebuilt = LedgerEngine::new();
    seed(&rebuilt, "10", "20");
    assert_eq!(rebuilt.replay(&entries).unwrap(), 2);

    assert_eq!(balance(&rebuilt, "1"), dec("5"));
    assert_eq!(balance(&rebuilt, "2"), dec("40"));
}

#[test]
fn test_log_order_matches_commit_order_under_contention() {
    for round in 0..5 {
        let dir = tempdir().unwrap();
        let path = dir.path().join(format!("ledger-{round}.jsonl"));

        let engine = Arc::new(
            LedgerEngine::with_config(LedgerConfig::default().with_tx_log(&path)).unwrap(),
        );
        seed(&engine, "0", "20");

        let depositor = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..200 {
                    engine.add_funds("1", dec("1"), M).unwrap();
                }
            })
        };
        let withdrawer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut succeeded = 0;
                while succeeded < 200 {
                    if engine.withdraw("1", dec("1"), M).is_ok() {
                        succeeded += 1;
                    }
                }
            })
        };

        depositor.join().unwrap();
        withdrawer.join().unwrap();
        assert_eq!(balance(&engine, "1"), Amount::ZERO);

        let entries = TransactionLog::read_all(&path).unwrap();
        let rebuilt = LedgerEngine::new();
        seed(&rebuilt, "0", "20");

        // A withdrawal logged ahead of the deposit it depended on would fail here.
        assert_eq!(rebuilt.replay(&entries).unwrap(), 400);
        assert_eq!(balance(&rebuilt, "1"), balance(&engine, "1"));
        assert_eq!(balance(&rebuilt, "2"), dec("20"));
    }
}

#[test]
fn test_replay_stops_on_failure() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");

    {
        let engine = LedgerEngine::with_config(LedgerConfig::default().with_tx_log(&path)).unwrap();
        seed(&engine, "10", "20");
        engine.withdraw("1", dec("10"), M).unwrap();
    }

    let entries = TransactionLog::read_all(&path).unwrap();
    let rebuilt = LedgerEngine::new();
    seed(&rebuilt, "5", "20");

    let err = rebuilt.replay(&entries).unwrap_err();
    assert!(err.is_insufficient_funds());
    assert_eq!(balance(&rebuilt, "1"), dec("5"));
}
