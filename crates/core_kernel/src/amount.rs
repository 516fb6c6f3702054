//! Fixed-point claim amounts
//!
//! Claim amounts are stored as `NUMERIC(10, 2)`. This module keeps that
//! precision in the type system: every `Amount` carries exactly two fraction
//! digits, rounded half away from zero on construction.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fraction digits carried by every amount
pub const AMOUNT_SCALE: u32 = 2;

/// Errors that can occur when building an amount
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    Invalid(String),

    #[error("Amount must be positive, got {0}")]
    NotPositive(Decimal),
}

/// A monetary claim amount with two fraction digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Creates an amount, rounding to two fraction digits
    pub fn new(value: Decimal) -> Self {
        let mut rounded = value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(AMOUNT_SCALE);
        Self(rounded)
    }

    /// Creates an amount that must be strictly positive
    pub fn positive(value: Decimal) -> Result<Self, AmountError> {
        let amount = Self::new(value);
        if amount.0 <= Decimal::ZERO {
            return Err(AmountError::NotPositive(amount.0));
        }
        Ok(amount)
    }

    /// Creates an amount from minor units (cents)
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, AMOUNT_SCALE))
    }

    /// Returns the decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self::new)
            .map_err(|e| AmountError::Invalid(e.to_string()))
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Decimal {
        amount.0
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer).map(Self::new)
    }
}
