//! Error types for the ledger.

use crate::access::Action;
use crate::decimal::Amount;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failures reported by an [`AccountStore`](crate::store::AccountStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The record changed between read and write.
    #[error("version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: u64, found: u64 },

    /// The backing store could not complete the request. May be transient.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while processing ledger requests.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Business rule violation: the account cannot cover the amount
    #[error("Insufficient funds in account {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: String,
        requested: Amount,
        available: Amount,
    },

    /// The caller lacks authority over the account
    #[error("Participant {caller} does not have {action} access to account {account}")]
    AccessDenied {
        caller: String,
        account: String,
        action: Action,
    },

    /// Referenced account or participant is absent
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Underlying persistence failure; the whole transaction may be retried
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// A two-account write failed and undoing the first write failed too.
    /// The debited account may not reflect its pre-transaction balance.
    #[error("Rollback failed on account {account} after {write_error}: {rollback_error}; ledger state may be partial")]
    RollbackFailed {
        account: String,
        write_error: StorageError,
        rollback_error: StorageError,
    },

    /// Lock wait exceeded the configured timeout
    #[error("Timed out waiting for lock on account {account}")]
    Timeout { account: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing input file arguments. Usage: bank-ledger <setup.csv> <transactions.csv>")]
    MissingArgument,
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => LedgerError::NotFound(id),
            StorageError::AlreadyExists(id) => LedgerError::AlreadyExists(id),
            other => LedgerError::Storage(other),
        }
    }
}

impl LedgerError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, LedgerError::InsufficientFunds { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, LedgerError::AccessDenied { .. })
    }

    /// Whether resubmitting the same request unchanged might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Storage(_) | LedgerError::Timeout { .. })
    }
}
