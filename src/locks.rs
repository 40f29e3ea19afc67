//! Per-account mutual exclusion.
//!
//! Multi-account operations take their locks in ascending id order, so two
//! transfers in opposite directions cannot deadlock.

use crate::error::{LedgerError, Result};
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Set of currently locked account ids.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every id in `ids`, waiting at most `timeout` in total.
    ///
    /// Duplicates are collapsed. On timeout, locks already taken are
    /// released before the error is returned.
    pub fn acquire(&self, ids: &[&str], timeout: Duration) -> Result<AccountLocks<'_>> {
        let mut ordered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        ordered.sort();
        ordered.dedup();

        let deadline = Instant::now() + timeout;
        let mut guard = AccountLocks {
            table: self,
            ids: Vec::with_capacity(ordered.len()),
        };

        for id in ordered {
            self.lock_one(&id, deadline)?;
            guard.ids.push(id);
        }

        Ok(guard)
    }

    fn lock_one(&self, id: &str, deadline: Instant) -> Result<()> {
        let mut held = self.held.lock();
        while held.contains(id) {
            if self.released.wait_until(&mut held, deadline).timed_out() && held.contains(id) {
                debug!("Lock wait on account {} timed out", id);
                return Err(LedgerError::Timeout {
                    account: id.to_string(),
                });
            }
        }
        held.insert(id.to_string());
        Ok(())
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.held.lock().contains(id)
    }
}

/// Releases its accounts when dropped.
#[derive(Debug)]
pub struct AccountLocks<'a> {
    table: &'a LockTable,
    ids: Vec<String>,
}

impl AccountLocks<'_> {
    /// Locked ids in acquisition order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl Drop for AccountLocks<'_> {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        let mut held = self.table.held.lock();
        for id in &self.ids {
            held.remove(id);
        }
        self.table.released.notify_all();
    }
}
