//! Fixed-point money: integer minor units plus an ISO 4217 currency code.
//!
//! No floating point is used anywhere. Division truncates toward zero, which
//! is what the valuation ledger expects when it derives unit costs.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_object::ValueObject;

/// Currencies the engine accepts.
const RECOGNIZED_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "CNY", "INR", "MXN", "BRL", "SEK", "NOK",
    "DKK", "NZD", "SGD", "HKD", "KRW", "ZAR", "PLN",
];

/// Currencies without a minor unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &["JPY", "KRW"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("invalid currency code '{0}'")]
    InvalidCurrency(String),

    #[error("currency mismatch ({left} vs {right})")]
    CurrencyMismatch { left: Currency, right: Currency },

    #[error("money amount cannot be negative")]
    NegativeMoney,

    #[error("division by zero")]
    DivisionByZero,

    #[error("multiplier must not be negative")]
    InvalidMultiplier,

    #[error("arithmetic overflow")]
    Overflow,
}

/// Validated ISO 4217 currency code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");

    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let upper = code.trim().to_ascii_uppercase();
        if !RECOGNIZED_CURRENCIES.contains(&upper.as_str()) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        let bytes = upper.as_bytes();
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn code(&self) -> &str {
        // Only ASCII codes from RECOGNIZED_CURRENCIES are ever stored.
        core::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Number of minor-unit digits used when rendering amounts.
    pub fn minor_digits(&self) -> u32 {
        if ZERO_DECIMAL_CURRENCIES.contains(&self.code()) { 0 } else { 2 }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.code().to_string()
    }
}

impl ValueObject for Currency {}

/// Non-negative amount in the currency's smallest unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr")]
pub struct Money {
    amount_minor: i64,
    currency: Currency,
}

#[derive(Deserialize)]
struct MoneyRepr {
    amount_minor: i64,
    currency: Currency,
}

impl TryFrom<MoneyRepr> for Money {
    type Error = MoneyError;

    fn try_from(value: MoneyRepr) -> Result<Self, Self::Error> {
        Money::new(value.amount_minor, value.currency)
    }
}

impl Money {
    pub fn new(amount_minor: i64, currency: Currency) -> Result<Self, MoneyError> {
        if amount_minor < 0 {
            return Err(MoneyError::NegativeMoney);
        }
        Ok(Self { amount_minor, currency })
    }

    /// Parse the currency code and build the amount in one step.
    pub fn from_minor(amount_minor: i64, currency_code: &str) -> Result<Self, MoneyError> {
        Money::new(amount_minor, Currency::new(currency_code)?)
    }

    pub fn zero(currency: Currency) -> Self {
        Self { amount_minor: 0, currency }
    }

    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount_minor > 0
    }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    pub fn add(&self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        let amount_minor = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money { amount_minor, currency: self.currency })
    }

    pub fn subtract(&self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        if self.amount_minor < other.amount_minor {
            return Err(MoneyError::NegativeMoney);
        }
        Ok(Money {
            amount_minor: self.amount_minor - other.amount_minor,
            currency: self.currency,
        })
    }

    pub fn multiply(&self, quantity: i64) -> Result<Money, MoneyError> {
        if quantity < 0 {
            return Err(MoneyError::InvalidMultiplier);
        }
        let amount_minor = self
            .amount_minor
            .checked_mul(quantity)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money { amount_minor, currency: self.currency })
    }

    /// Truncating division, used to derive per-unit costs.
    pub fn divide(&self, divisor: i64) -> Result<Money, MoneyError> {
        if divisor == 0 {
            return Err(MoneyError::DivisionByZero);
        }
        if divisor < 0 {
            return Err(MoneyError::InvalidMultiplier);
        }
        Ok(Money {
            amount_minor: self.amount_minor / divisor,
            currency: self.currency,
        })
    }

    pub fn checked_cmp(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.same_currency(other)?;
        Ok(self.amount_minor.cmp(&other.amount_minor))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.currency.minor_digits() {
            0 => write!(f, "{} {}", self.amount_minor, self.currency),
            digits => {
                let scale = 10i64.pow(digits);
                write!(
                    f,
                    "{}.{:0width$} {}",
                    self.amount_minor / scale,
                    self.amount_minor % scale,
                    self.currency,
                    width = digits as usize
                )
            }
        }
    }
}

impl ValueObject for Money {}
