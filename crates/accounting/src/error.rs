use thiserror::Error;

use stockflow_core::{Currency, MoneyError};

/// Valuation ledger failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("unit cost must be greater than zero")]
    ZeroUnitCost,

    #[error("currency mismatch: ledger is {expected}, got {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("insufficient stock: requested {requested}, balance {balance}")]
    InsufficientStock { requested: i64, balance: i64 },

    #[error("no cost layers to value the movement")]
    NoCostLayers,

    #[error("insufficient cost layers: requested {requested}, layered {layered}")]
    InsufficientCostLayers { requested: i64, layered: i64 },

    #[error("invalid valuation method '{0}'")]
    InvalidValuationMethod(String),

    #[error("ledger not found")]
    NotFound,

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl LedgerError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidQuantity(_)
                | LedgerError::ZeroUnitCost
                | LedgerError::CurrencyMismatch { .. }
                | LedgerError::InvalidValuationMethod(_)
        )
    }
}
