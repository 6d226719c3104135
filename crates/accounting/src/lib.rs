//! Inventory valuation: a double-entry cost ledger per SKU.
//!
//! Pure domain logic only: no IO, no persistence concerns. The ledger shadows
//! physical movements; it never decides whether a movement may happen.

pub mod account;
pub mod entry;
pub mod error;
pub mod layer;
pub mod ledger;
pub mod valuation;

pub use account::{AccountBalance, AccountType, EntrySide};
pub use entry::{LedgerEntry, LedgerEntryId, LedgerPosting, LedgerTransactionId, ReferenceType};
pub use error::LedgerError;
pub use layer::{CostLayer, CostLayerId};
pub use ledger::{InventoryLedger, InventoryLedgerId, InventoryValued};
pub use valuation::ValuationMethod;
