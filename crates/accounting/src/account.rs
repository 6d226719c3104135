use serde::{Deserialize, Serialize};

use stockflow_core::Currency;

/// Accounts touched by inventory valuation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Inventory,
    Cogs,
    GoodsInTransit,
    Adjustments,
    Returns,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySide {
    Debit,
    Credit,
}

/// Running totals of one account.
///
/// Debits add, credits subtract, so contra sides run negative. Values are
/// signed minor units of the ledger currency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub quantity: i64,
    pub value_minor: i64,
    pub currency: Currency,
}

impl AccountBalance {
    pub fn zero(currency: Currency) -> Self {
        Self { quantity: 0, value_minor: 0, currency }
    }

    pub(crate) fn post(&mut self, side: EntrySide, quantity: i64, value_minor: i64) {
        match side {
            EntrySide::Debit => {
                self.quantity += quantity;
                self.value_minor += value_minor;
            }
            EntrySide::Credit => {
                self.quantity -= quantity;
                self.value_minor -= value_minor;
            }
        }
    }
}
