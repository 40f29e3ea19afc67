//! Keyed storage for accounts and participants.
//!
//! Writes are linearizable per key through optimistic compare-and-swap on
//! [`Account::version`]: a `put` only succeeds if the caller read the
//! version that is currently stored.

use crate::account::{Account, Participant};
use crate::error::StorageError;
use parking_lot::RwLock;
use std::collections::HashMap;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Durable keyed storage used by the ledger engine.
pub trait AccountStore: Send + Sync {
    fn get(&self, id: &str) -> StorageResult<Account>;

    /// Replaces an existing account.
    ///
    /// `account.version` must equal the stored version, otherwise the write
    /// fails with `VersionConflict`. Returns the stored record with its
    /// version advanced.
    fn put(&self, account: Account) -> StorageResult<Account>;

    fn exists(&self, id: &str) -> bool;

    /// Stores a new account. Fails with `AlreadyExists` if the id is taken.
    fn insert(&self, account: Account) -> StorageResult<Account>;

    fn remove(&self, id: &str) -> StorageResult<Account>;

    /// All accounts, sorted by id.
    fn list(&self) -> StorageResult<Vec<Account>>;

    fn get_participant(&self, id: &str) -> StorageResult<Participant>;

    fn insert_participant(&self, participant: Participant) -> StorageResult<()>;
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    participants: HashMap<String, Participant>,
}

/// Process-local store backed by hash maps.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    tables: RwLock<Tables>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get(&self, id: &str) -> StorageResult<Account> {
        self.tables
            .read()
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("account {}", id)))
    }

    fn put(&self, mut account: Account) -> StorageResult<Account> {
        let mut tables = self.tables.write();
        let stored = tables
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| StorageError::NotFound(format!("account {}", account.id)))?;

        if stored.version != account.version {
            return Err(StorageError::VersionConflict {
                id: account.id,
                expected: account.version,
                found: stored.version,
            });
        }

        account.version += 1;
        *stored = account.clone();
        Ok(account)
    }

    fn exists(&self, id: &str) -> bool {
        self.tables.read().accounts.contains_key(id)
    }

    fn insert(&self, mut account: Account) -> StorageResult<Account> {
        let mut tables = self.tables.write();
        if tables.accounts.contains_key(&account.id) {
            return Err(StorageError::AlreadyExists(format!("account {}", account.id)));
        }

        account.version = 1;
        tables.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    fn remove(&self, id: &str) -> StorageResult<Account> {
        self.tables
            .write()
            .accounts
            .remove(id)
            .ok_or_else(|| StorageError::NotFound(format!("account {}", id)))
    }

    fn list(&self) -> StorageResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.tables.read().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    fn get_participant(&self, id: &str) -> StorageResult<Participant> {
        self.tables
            .read()
            .participants
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("participant {}", id)))
    }

    fn insert_participant(&self, participant: Participant) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.participants.contains_key(&participant.id) {
            return Err(StorageError::AlreadyExists(format!(
                "participant {}",
                participant.id
            )));
        }
        tables
            .participants
            .insert(participant.id.clone(), participant);
        Ok(())
    }
}
