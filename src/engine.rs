//! Core ledger engine.
//!
//! Applies transfers, add-funds and withdrawals against the account store.
//! Every transaction runs as one atomic unit: lock the accounts, re-read
//! them from the store, authorize, validate, write, then emit events. A
//! rejected transaction leaves no visible change.

use crate::access::{AccessController, Action, OwnershipPolicy};
use crate::account::{ensure_positive, Account, Participant};
use crate::config::{EventPolicy, LedgerConfig};
use crate::decimal::Amount;
use crate::error::{LedgerError, Result};
use crate::events::{Event, EventSink, InMemoryEventSink};
use crate::locks::{AccountLocks, LockTable};
use crate::store::{AccountStore, InMemoryAccountStore};
use crate::transaction::{Receipt, SetupRecord, TransactionRecord, TransactionRequest, TxKind};
use crate::txlog::{LogEntry, Outcome, TransactionLog};
use csv::{ReaderBuilder, Trim};
use log::{debug, error, info, warn};
use std::io::{Read, Write};
use std::sync::{mpsc, Arc};

/// Counts from a batch run over a transactions CSV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub committed: usize,
    pub rejected: usize,
    /// Rows that could not be parsed into a request.
    pub skipped: usize,
}

/// The transactional account ledger.
///
/// Storage, access control and event delivery are injected so the engine
/// can be shared across threads (`Arc<LedgerEngine>`) and tested against
/// failing collaborators.
pub struct LedgerEngine {
    store: Arc<dyn AccountStore>,
    access: Arc<dyn AccessController>,
    events: Arc<dyn EventSink>,
    tx_log: Option<TransactionLog>,
    locks: LockTable,
    config: LedgerConfig,
}

impl LedgerEngine {
    /// Creates an engine with in-memory storage and the default policies.
    pub fn new() -> Self {
        let config = LedgerConfig::default();
        LedgerEngine {
            store: Arc::new(InMemoryAccountStore::new()),
            access: Arc::new(OwnershipPolicy::new(config.read_policy)),
            events: Arc::new(InMemoryEventSink::new()),
            tx_log: None,
            locks: LockTable::new(),
            config,
        }
    }

    /// Creates an in-memory engine, opening the transaction log if the
    /// configuration names one.
    pub fn with_config(config: LedgerConfig) -> Result<Self> {
        let access = Arc::new(OwnershipPolicy::new(config.read_policy));
        Self::from_parts(
            Arc::new(InMemoryAccountStore::new()),
            access,
            Arc::new(InMemoryEventSink::new()),
            config,
        )
    }

    /// Assembles an engine from explicit collaborators.
    pub fn from_parts(
        store: Arc<dyn AccountStore>,
        access: Arc<dyn AccessController>,
        events: Arc<dyn EventSink>,
        config: LedgerConfig,
    ) -> Result<Self> {
        let tx_log = match &config.tx_log_path {
            Some(path) => {
                info!("Appending transaction log to {}", path.display());
                Some(TransactionLog::open(path)?)
            }
            None => None,
        };

        Ok(LedgerEngine {
            store,
            access,
            events,
            tx_log,
            locks: LockTable::new(),
            config,
        })
    }

    // ---------------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------------

    /// Registers a participant. Fails with `AlreadyExists` for a known id.
    pub fn register_participant(&self, participant: Participant) -> Result<()> {
        debug!("Registering participant {}", participant.id);
        self.store.insert_participant(participant)?;
        Ok(())
    }

    /// Opens an account owned by `owner`.
    ///
    /// Only the owner may open an account in their name, and the owner must
    /// already be registered.
    pub fn open_account(
        &self,
        id: &str,
        owner: &str,
        initial_balance: Amount,
        caller: &str,
    ) -> Result<Account> {
        if initial_balance.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "initial balance must not be negative, got {}",
                initial_balance
            )));
        }

        let account = Account::new(id, owner, initial_balance);
        self.authorize(caller, &account, Action::Create)?;
        self.store.get_participant(owner)?;

        let _locks = self.locks.acquire(&[id], self.config.lock_timeout)?;
        let stored = self.store.insert(account)?;
        debug!(
            "Opened account {} for {} with balance {}",
            stored.id, stored.owner, stored.balance
        );
        Ok(stored)
    }

    /// Removes an account. Owner only.
    pub fn close_account(&self, id: &str, caller: &str) -> Result<Account> {
        let _locks = self.locks.acquire(&[id], self.config.lock_timeout)?;
        let account = self.store.get(id)?;
        self.authorize(caller, &account, Action::Delete)?;

        let removed = self.store.remove(id)?;
        debug!("Closed account {} (balance {})", removed.id, removed.balance);
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    /// Moves `amount` from one account to another on behalf of `caller`.
    pub fn transfer(&self, from: &str, to: &str, amount: Amount, caller: &str) -> Result<Receipt> {
        self.submit(
            &TransactionRequest::Transfer {
                from: from.to_string(),
                to: to.to_string(),
                amount,
            },
            caller,
        )
    }

    pub fn add_funds(&self, account: &str, amount: Amount, caller: &str) -> Result<Receipt> {
        self.submit(
            &TransactionRequest::AddFunds {
                account: account.to_string(),
                amount,
            },
            caller,
        )
    }

    pub fn withdraw(&self, account: &str, amount: Amount, caller: &str) -> Result<Receipt> {
        self.submit(
            &TransactionRequest::Withdrawal {
                account: account.to_string(),
                amount,
            },
            caller,
        )
    }

    /// Processes one request and records its outcome in the transaction log.
    ///
    /// The log entry is written before the account locks are released, so
    /// entries touching the same account appear in commit order.
    pub fn submit(&self, request: &TransactionRequest, caller: &str) -> Result<Receipt> {
        let result = match self.lock_accounts(request) {
            Ok(_locks) => {
                let result = self.apply_locked(request, caller);
                self.record(request, caller, &result);
                result
            }
            Err(e) => {
                let result = Err(e);
                self.record(request, caller, &result);
                result
            }
        };

        match &result {
            Ok(_) => debug!("{} by {} committed", request.kind(), caller),
            Err(e) => debug!("{} by {} rejected: {}", request.kind(), caller, e),
        }
        result
    }

    fn lock_accounts(&self, request: &TransactionRequest) -> Result<AccountLocks<'_>> {
        self.locks
            .acquire(&request.account_ids(), self.config.lock_timeout)
    }

    fn record(&self, request: &TransactionRequest, caller: &str, result: &Result<Receipt>) {
        let Some(log) = &self.tx_log else {
            return;
        };

        let outcome = match result {
            Ok(receipt) => Outcome::Committed {
                event_ids: receipt.event_ids.clone(),
            },
            Err(e) => Outcome::Rejected {
                error: e.to_string(),
            },
        };
        // The transaction has already been decided; a log failure must
        // not change what the caller is told about it.
        if let Err(e) = log.append(&LogEntry::new(caller, request, outcome)) {
            warn!("Failed to append to transaction log {}: {}", log.path().display(), e);
        }
    }

    /// Applies a request without logging it.
    fn apply(&self, request: &TransactionRequest, caller: &str) -> Result<Receipt> {
        let _locks = self.lock_accounts(request)?;
        self.apply_locked(request, caller)
    }

    /// Caller must hold the locks for every account in `request`.
    fn apply_locked(&self, request: &TransactionRequest, caller: &str) -> Result<Receipt> {
        match request {
            TransactionRequest::Transfer { from, to, amount } => {
                self.apply_transfer(from, to, *amount, caller)
            }
            TransactionRequest::AddFunds { account, amount } => {
                self.apply_add_funds(account, *amount, caller)
            }
            TransactionRequest::Withdrawal { account, amount } => {
                self.apply_withdrawal(account, *amount, caller)
            }
        }
    }

    fn apply_transfer(&self, from_id: &str, to_id: &str, amount: Amount, caller: &str) -> Result<Receipt> {
        ensure_positive(amount)?;

        let mut from = self.store.get(from_id)?;
        let mut to = self.store.get(to_id)?;
        self.authorize(caller, &from, Action::Write)?;

        let mut receipt = Receipt::default();
        let old_from = from.balance;

        if from_id == to_id {
            // Net zero, but the balance must still cover the amount.
            from.clone().debit(amount)?;
            self.emit(TxKind::Transfer, from_id, old_from, old_from, &mut receipt);
            return Ok(receipt);
        }

        let old_to = to.balance;
        from.debit(amount)?;
        to.credit(amount)?;
        let new_from = from.balance;
        let new_to = to.balance;

        let saved_from = self.store.put(from)?;
        if let Err(e) = self.store.put(to) {
            warn!(
                "Transfer {} -> {} failed writing credit side, restoring {}: {}",
                from_id, to_id, from_id, e
            );
            let mut restore = saved_from;
            restore.balance = old_from;
            if let Err(rollback) = self.store.put(restore) {
                error!(
                    "Rollback of account {} failed, balance may read {} instead of {}: {}",
                    from_id, new_from, old_from, rollback
                );
                return Err(LedgerError::RollbackFailed {
                    account: from_id.to_string(),
                    write_error: e,
                    rollback_error: rollback,
                });
            }
            return Err(e.into());
        }

        self.emit(TxKind::Transfer, from_id, old_from, new_from, &mut receipt);
        if self.config.event_policy == EventPolicy::AllBalanceChanges {
            self.emit(TxKind::Transfer, to_id, old_to, new_to, &mut receipt);
        }

        debug!(
            "Transferred {} from {} to {} ({} -> {})",
            amount, from_id, to_id, old_from, new_from
        );
        Ok(receipt)
    }

    fn apply_add_funds(&self, account_id: &str, amount: Amount, caller: &str) -> Result<Receipt> {
        ensure_positive(amount)?;

        let mut account = self.store.get(account_id)?;
        self.authorize(caller, &account, Action::Write)?;

        let old = account.balance;
        account.credit(amount)?;
        let saved = self.store.put(account)?;

        let mut receipt = Receipt::default();
        if self.config.event_policy == EventPolicy::AllBalanceChanges {
            self.emit(TxKind::AddFunds, account_id, old, saved.balance, &mut receipt);
        }

        debug!("Added {} to account {} ({} -> {})", amount, account_id, old, saved.balance);
        Ok(receipt)
    }

    fn apply_withdrawal(&self, account_id: &str, amount: Amount, caller: &str) -> Result<Receipt> {
        ensure_positive(amount)?;

        let mut account = self.store.get(account_id)?;
        self.authorize(caller, &account, Action::Write)?;

        let old = account.balance;
        account.debit(amount)?;
        let saved = self.store.put(account)?;

        let mut receipt = Receipt::default();
        if self.config.event_policy == EventPolicy::AllBalanceChanges {
            self.emit(TxKind::Withdrawal, account_id, old, saved.balance, &mut receipt);
        }

        debug!("Withdrew {} from account {} ({} -> {})", amount, account_id, old, saved.balance);
        Ok(receipt)
    }

    fn authorize(&self, caller: &str, account: &Account, action: Action) -> Result<()> {
        if self.access.authorize(caller, account, action) {
            Ok(())
        } else {
            debug!("Denied {} on account {} to {}", action, account.id, caller);
            Err(LedgerError::AccessDenied {
                caller: caller.to_string(),
                account: account.id.clone(),
                action,
            })
        }
    }

    fn emit(&self, kind: TxKind, account: &str, old: Amount, new: Amount, receipt: &mut Receipt) {
        let event = Event::value_changed(kind, account, old, new);
        receipt.event_ids.push(event.event_id.clone());
        self.events.emit(event);
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Reads one account, subject to the read policy.
    pub fn get_account(&self, id: &str, caller: &str) -> Result<Account> {
        let account = self.store.get(id)?;
        self.authorize(caller, &account, Action::Read)?;
        Ok(account)
    }

    /// Lists the accounts `caller` may read, sorted by id.
    pub fn list_accounts(&self, caller: &str) -> Result<Vec<Account>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|account| self.access.authorize(caller, account, Action::Read))
            .collect())
    }

    /// Events emitted this session, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events.snapshot()
    }

    /// Returns this session's events and starts a new session.
    pub fn drain_events(&self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        self.events.subscribe()
    }

    // ---------------------------------------------------------------------
    // Recovery and batch processing
    // ---------------------------------------------------------------------

    /// Re-applies the committed entries of a transaction log in order.
    ///
    /// Rejected entries are skipped. Replayed transactions are not written
    /// back to this engine's own log. Returns the number of entries applied.
    pub fn replay(&self, entries: &[LogEntry]) -> Result<usize> {
        let mut applied = 0;
        for entry in entries.iter().filter(|e| e.outcome.is_committed()) {
            self.apply(&entry.request, &entry.caller)?;
            applied += 1;
        }
        info!("Replayed {} committed transactions", applied);
        Ok(applied)
    }

    /// Loads participants and accounts from a setup CSV.
    ///
    /// Each row registers its owner (if not yet known) and opens the
    /// account in the owner's name. Invalid rows are logged and skipped.
    pub fn load_setup_csv<R: Read>(&self, reader: R) -> Result<usize> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut loaded = 0;
        for (row_idx, result) in csv_reader.deserialize::<SetupRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!("Setup row {}: CSV parse error: {}", row_num, e);
                    continue;
                }
            };

            if self.store.get_participant(&record.owner).is_err() {
                let participant =
                    Participant::new(&record.owner, &record.first_name, &record.last_name);
                if let Err(e) = self.register_participant(participant) {
                    warn!("Setup row {}: {}", row_num, e);
                    continue;
                }
            }

            match self.open_account(&record.account, &record.owner, record.balance, &record.owner) {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Setup row {}: {}", row_num, e),
            }
        }

        info!("Loaded {} accounts", loaded);
        Ok(loaded)
    }

    /// Streams transaction requests from a CSV reader through the engine.
    ///
    /// Malformed rows and rejected transactions are logged at warn level
    /// and skipped; only I/O-level failures abort the run. Pending events
    /// are drained after every row so a long batch does not accumulate
    /// them; subscribers still receive each one as it is emitted.
    pub fn process_csv<R: Read>(&self, reader: R) -> Result<BatchSummary> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut summary = BatchSummary::default();
        for (row_idx, result) in csv_reader.deserialize::<TransactionRecord>().enumerate() {
            let row_num = row_idx + 2;

            let parsed = match result {
                Ok(record) => record.parse(),
                Err(e) => {
                    warn!("Row {}: CSV parse error: {}", row_num, e);
                    summary.skipped += 1;
                    continue;
                }
            };

            let Some((request, caller)) = parsed else {
                warn!("Row {}: Failed to parse transaction record", row_num);
                summary.skipped += 1;
                continue;
            };

            match self.submit(&request, &caller) {
                Ok(_) => summary.committed += 1,
                Err(e) => {
                    warn!("Row {}: {}", row_num, e);
                    summary.rejected += 1;
                }
            }

            for event in self.events.drain() {
                debug!(
                    "Row {}: event {} {} on {} ({} -> {})",
                    row_num,
                    event.event_id,
                    event.kind,
                    event.subject_account,
                    event.old_value,
                    event.new_value
                );
            }
        }

        info!(
            "Processed transactions: {} committed, {} rejected, {} skipped",
            summary.committed, summary.rejected, summary.skipped
        );
        Ok(summary)
    }

    /// Writes every account as CSV, sorted by account id.
    ///
    /// This is an administrative dump and bypasses the read policy.
    pub fn write_output<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["account", "owner", "balance"])?;
        for account in self.store.list()? {
            csv_writer.write_record([
                account.id.as_str(),
                account.owner.as_str(),
                account.balance.to_string().as_str(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new()
    }
}
