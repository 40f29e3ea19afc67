//! # Bank Ledger
//!
//! A transactional account ledger: participants own accounts, and funds
//! move between them through transfers, add-funds and withdrawals.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: 4 decimal places via `rust_decimal`
//! - **Strict invariants**: no balance is ever observably negative
//! - **Atomic transactions**: lock, re-read, authorize, validate, write
//! - **Ownership access control**: only an account's owner can debit it
//! - **Audit trail**: balance-change events plus an optional JSON-lines log
//!
//! ## Example
//!
//! ```
//! use bank_ledger::{Amount, LedgerEngine, Participant};
//!
//! let engine = LedgerEngine::new();
//! engine.register_participant(Participant::new("m@example.com", "M", "R")).unwrap();
//! engine.register_participant(Participant::new("s@example.com", "S", "L")).unwrap();
//! engine.open_account("1", "m@example.com", Amount::from_units(10), "m@example.com").unwrap();
//! engine.open_account("2", "s@example.com", Amount::from_units(20), "s@example.com").unwrap();
//!
//! engine.transfer("1", "2", Amount::from_units(5), "m@example.com").unwrap();
//! assert_eq!(engine.get_account("2", "m@example.com").unwrap().balance, Amount::from_units(25));
//! ```

pub mod access;
pub mod account;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod events;
pub mod locks;
pub mod store;
pub mod transaction;
pub mod txlog;

pub use access::{AccessController, Action, OwnershipPolicy, ReadPolicy};
pub use account::{Account, Participant};
pub use config::{EventPolicy, LedgerConfig};
pub use decimal::Amount;
pub use engine::{BatchSummary, LedgerEngine};
pub use error::{LedgerError, Result, StorageError};
pub use events::{Event, EventSink, InMemoryEventSink};
pub use store::{AccountStore, InMemoryAccountStore};
pub use transaction::{Receipt, TransactionRequest, TxKind};
pub use txlog::{LogEntry, Outcome, TransactionLog};
