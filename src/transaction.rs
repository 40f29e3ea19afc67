//! Transaction requests, their CSV encoding, and setup records.

use crate::decimal::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of balance-changing transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Transfer,
    AddFunds,
    Withdrawal,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Transfer => "transfer",
            TxKind::AddFunds => "add_funds",
            TxKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transfer" | "account_transfer" => Ok(TxKind::Transfer),
            "add_funds" | "addfunds" | "deposit" => Ok(TxKind::AddFunds),
            "withdrawal" | "withdraw" => Ok(TxKind::Withdrawal),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// A request to mutate one or two accounts.
///
/// The submitting participant is passed alongside, not inside, the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum TransactionRequest {
    /// Move funds from one account to another.
    Transfer {
        from: String,
        to: String,
        amount: Amount,
    },

    /// Credit funds to an account.
    AddFunds { account: String, amount: Amount },

    /// Debit funds from an account if the balance covers it.
    Withdrawal { account: String, amount: Amount },
}

impl TransactionRequest {
    pub fn kind(&self) -> TxKind {
        match self {
            TransactionRequest::Transfer { .. } => TxKind::Transfer,
            TransactionRequest::AddFunds { .. } => TxKind::AddFunds,
            TransactionRequest::Withdrawal { .. } => TxKind::Withdrawal,
        }
    }

    /// Every account the request touches, debited side first.
    pub fn account_ids(&self) -> Vec<&str> {
        match self {
            TransactionRequest::Transfer { from, to, .. } => vec![from.as_str(), to.as_str()],
            TransactionRequest::AddFunds { account, .. }
            | TransactionRequest::Withdrawal { account, .. } => vec![account.as_str()],
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            TransactionRequest::Transfer { amount, .. }
            | TransactionRequest::AddFunds { amount, .. }
            | TransactionRequest::Withdrawal { amount, .. } => *amount,
        }
    }
}

/// Result of a committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Ids of the events emitted while committing, in emission order.
    pub event_ids: Vec<String>,
}

/// Raw transaction row as read from CSV.
///
/// Expected header: `type,caller,account,to,amount`. The `to` column is only
/// meaningful for transfers.
#[derive(Debug, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "type")]
    pub tx_type: String,

    /// Participant submitting the transaction
    pub caller: String,

    /// Debited account for transfers, target account otherwise
    pub account: String,

    pub to: Option<String>,

    pub amount: Option<String>,
}

impl TransactionRecord {
    /// Parses the raw CSV record into a typed request and its caller.
    ///
    /// Returns `None` if the record is invalid (unknown type, missing amount
    /// or counterparty, etc.). Amount sign is checked later by the engine.
    pub fn parse(&self) -> Option<(TransactionRequest, String)> {
        let kind = TxKind::from_str(&self.tx_type).ok()?;
        let amount = self.parse_amount()?;
        let account = non_empty(Some(&self.account))?;
        let caller = non_empty(Some(&self.caller))?;

        let request = match kind {
            TxKind::Transfer => TransactionRequest::Transfer {
                from: account,
                to: non_empty(self.to.as_ref())?,
                amount,
            },
            TxKind::AddFunds => TransactionRequest::AddFunds { account, amount },
            TxKind::Withdrawal => TransactionRequest::Withdrawal { account, amount },
        };

        Some((request, caller))
    }

    fn parse_amount(&self) -> Option<Amount> {
        let trimmed = self.amount.as_ref()?.trim();
        if trimmed.is_empty() {
            return None;
        }
        Amount::from_str(trimmed).ok()
    }
}

/// Setup row registering a participant (if new) and opening one account.
///
/// Expected header: `account,owner,first_name,last_name,balance`.
#[derive(Debug, Deserialize)]
pub struct SetupRecord {
    pub account: String,
    pub owner: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub balance: Amount,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
