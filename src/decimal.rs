//! Fixed-point monetary amount with 4 decimal places precision.
//!
//! Uses `rust_decimal` internally with scale enforcement so that balances
//! never pick up floating-point drift.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A monetary amount that keeps exactly 4 decimal places.
///
/// Used both for account balances and for transaction amounts. Serializes
/// as a decimal string so values survive JSON and CSV without rounding.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use bank_ledger::Amount;
///
/// let amount = Amount::from_str("10.5").unwrap();
/// assert_eq!(amount.to_string(), "10.5000");
/// assert!(amount.is_positive());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    /// The number of decimal places to maintain.
    pub const SCALE: u32 = 4;

    pub const ZERO: Self = Amount(Decimal::ZERO);

    /// Creates an amount from a `Decimal`, normalizing to 4 decimal places.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value;
        normalized.rescale(Self::SCALE);
        Amount(normalized)
    }

    /// Creates an amount from whole units.
    pub fn from_units(units: i64) -> Self {
        Amount::new(Decimal::from(units))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` for amounts strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount::new)
    }

    /// Subtracts `rhs`, returning `None` on overflow or if the result
    /// would be negative.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        let result = self.0.checked_sub(rhs.0)?;
        if result < Decimal::ZERO {
            return None;
        }
        Some(Amount::new(result))
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())?;
        Ok(Amount::new(decimal))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}
