//! Bank Ledger CLI
//!
//! Loads participants and accounts from a setup CSV, applies a CSV of
//! transaction requests, and prints the final account states.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- setup.csv transactions.csv > accounts.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity
//! - `LEDGER_LOCK_TIMEOUT_MS`, `LEDGER_EVENT_POLICY`, `LEDGER_READ_POLICY`,
//!   `LEDGER_TX_LOG`: see [`bank_ledger::LedgerConfig`]

use bank_ledger::{LedgerConfig, LedgerEngine, LedgerError, Result};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        return Err(LedgerError::MissingArgument);
    }

    let setup = BufReader::new(File::open(&args[1])?);
    let transactions = BufReader::new(File::open(&args[2])?);

    let engine = LedgerEngine::with_config(LedgerConfig::from_env()?)?;
    engine.load_setup_csv(setup)?;
    engine.process_csv(transactions)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    engine.write_output(handle)?;

    Ok(())
}
