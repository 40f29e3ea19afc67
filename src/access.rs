//! Ownership-based access control.
//!
//! Write-like actions (mutating, creating or deleting an account) are
//! reserved for the account's owner. Reads follow the configured
//! [`ReadPolicy`].

use crate::account::Account;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a caller wants to do with an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Write,
    Create,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Read => "READ",
            Action::Write => "WRITE",
            Action::Create => "CREATE",
            Action::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Who may read accounts they do not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPolicy {
    /// Every participant can read every account.
    #[default]
    All,
    /// Participants can only read their own accounts.
    OwnerOnly,
}

impl FromStr for ReadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ReadPolicy::All),
            "owner_only" | "owner-only" | "owner" => Ok(ReadPolicy::OwnerOnly),
            other => Err(format!("unknown read policy '{}'", other)),
        }
    }
}

/// Decides whether a caller may perform an action on an account.
///
/// Implementations must be pure policy checks: no I/O, no mutation.
pub trait AccessController: Send + Sync {
    fn authorize(&self, caller: &str, account: &Account, action: Action) -> bool;
}

/// The default policy: owners control their accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipPolicy {
    read: ReadPolicy,
}

impl OwnershipPolicy {
    pub fn new(read: ReadPolicy) -> Self {
        OwnershipPolicy { read }
    }
}

impl AccessController for OwnershipPolicy {
    fn authorize(&self, caller: &str, account: &Account, action: Action) -> bool {
        match action {
            Action::Read => match self.read {
                ReadPolicy::All => true,
                ReadPolicy::OwnerOnly => account.is_owned_by(caller),
            },
            Action::Write | Action::Create | Action::Delete => account.is_owned_by(caller),
        }
    }
}
