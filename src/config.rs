//! Runtime configuration for the ledger engine.
//!
//! Values come from [`LedgerConfig::default`] and can be overridden from the
//! environment with [`LedgerConfig::from_env`]:
//!
//! - `LEDGER_LOCK_TIMEOUT_MS`: lock wait bound in milliseconds
//! - `LEDGER_EVENT_POLICY`: `debit_only` or `all`
//! - `LEDGER_READ_POLICY`: `all` or `owner_only`
//! - `LEDGER_TX_LOG`: path of the JSON-lines transaction log

use crate::access::ReadPolicy;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which committed transactions produce events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPolicy {
    /// One event per transfer, for the debited account. Add-funds and
    /// withdrawals emit nothing.
    #[default]
    DebitOnly,
    /// Every balance change on every account emits an event.
    AllBalanceChanges,
}

impl FromStr for EventPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debit_only" | "debit-only" | "debit" => Ok(EventPolicy::DebitOnly),
            "all" | "all_balance_changes" => Ok(EventPolicy::AllBalanceChanges),
            other => Err(format!("unknown event policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Maximum time a transaction waits for its account locks.
    pub lock_timeout: Duration,
    pub event_policy: EventPolicy,
    pub read_policy: ReadPolicy,
    /// Where to append the transaction log, if anywhere.
    pub tx_log_path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            lock_timeout: Duration::from_secs(5),
            event_policy: EventPolicy::default(),
            read_policy: ReadPolicy::default(),
            tx_log_path: None,
        }
    }
}

impl LedgerConfig {
    pub const LOCK_TIMEOUT_VAR: &'static str = "LEDGER_LOCK_TIMEOUT_MS";
    pub const EVENT_POLICY_VAR: &'static str = "LEDGER_EVENT_POLICY";
    pub const READ_POLICY_VAR: &'static str = "LEDGER_READ_POLICY";
    pub const TX_LOG_VAR: &'static str = "LEDGER_TX_LOG";

    /// Builds a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LedgerConfig::default();

        if let Some(raw) = lookup(Self::LOCK_TIMEOUT_VAR) {
            let millis = raw.trim().parse::<u64>().map_err(|e| {
                LedgerError::Config(format!("{}={}: {}", Self::LOCK_TIMEOUT_VAR, raw, e))
            })?;
            config.lock_timeout = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(Self::EVENT_POLICY_VAR) {
            config.event_policy = raw.parse().map_err(LedgerError::Config)?;
        }

        if let Some(raw) = lookup(Self::READ_POLICY_VAR) {
            config.read_policy = raw.parse().map_err(LedgerError::Config)?;
        }

        if let Some(raw) = lookup(Self::TX_LOG_VAR) {
            if !raw.trim().is_empty() {
                config.tx_log_path = Some(PathBuf::from(raw.trim()));
            }
        }

        Ok(config)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_event_policy(mut self, policy: EventPolicy) -> Self {
        self.event_policy = policy;
        self
    }

    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn with_tx_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.tx_log_path = Some(path.into());
        self
    }
}
