//! Account and participant records.
//!
//! Maintains the invariant: `balance >= 0` after every committed mutation.

use crate::decimal::Amount;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// An identity that owns accounts and submits transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique handle, e.g. an email address.
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Participant {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Participant {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// A balance-holding account.
///
/// # Invariants
///
/// - `balance` is never negative: [`Account::debit`] refuses to overdraw
/// - `owner` never changes after creation
/// - `version` is only advanced by the store on a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,

    /// Participant id of the owner.
    pub owner: String,

    pub balance: Amount,

    /// Optimistic concurrency token. Zero for records not yet stored.
    #[serde(default)]
    pub version: u64,
}

impl Account {
    /// Creates an unsaved account.
    pub fn new(id: impl Into<String>, owner: impl Into<String>, balance: Amount) -> Self {
        Account {
            id: id.into(),
            owner: owner.into(),
            balance,
            version: 0,
        }
    }

    pub fn is_owned_by(&self, participant: &str) -> bool {
        self.owner == participant
    }

    /// Adds funds to the balance.
    ///
    /// Fails with `InvalidAmount` if `amount` is not strictly positive or the
    /// balance would overflow.
    pub fn credit(&mut self, amount: Amount) -> Result<()> {
        ensure_positive(amount)?;
        self.balance = self.balance.checked_add(amount).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("crediting {} overflows account {}", amount, self.id))
        })?;
        Ok(())
    }

    /// Removes funds from the balance.
    ///
    /// Fails with `InsufficientFunds` if the balance does not cover `amount`;
    /// the balance is left untouched in that case.
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        ensure_positive(amount)?;
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: self.id.clone(),
                requested: amount,
                available: self.balance,
            })?;
        Ok(())
    }

    /// Verifies the invariant: `balance >= 0`.
    #[cfg(debug_assertions)]
    pub fn check_invariant(&self) -> bool {
        !self.balance.is_negative()
    }
}

/// Rejects zero and negative transaction amounts.
pub(crate) fn ensure_positive(amount: Amount) -> Result<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!(
            "amount must be strictly positive, got {}",
            amount
        )))
    }
}
