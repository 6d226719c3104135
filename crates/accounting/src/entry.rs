use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{Money, TenantId};
use stockflow_events::TenantScoped;
use stockflow_inventory::Sku;

use crate::account::{AccountType, EntrySide};

stockflow_core::uuid_id!(
    /// Shared by the debit and credit entries of one posting.
    LedgerTransactionId
);

stockflow_core::uuid_id!(LedgerEntryId);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Receipt,
    Order,
    Adjustment,
}

/// Immutable, append-only ledger line.
///
/// `running_balance` / `running_value` snapshot the ledger totals right after
/// the posting the entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub transaction_id: LedgerTransactionId,
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub account: AccountType,
    pub side: EntrySide,
    pub quantity: i64,
    pub unit_cost: Money,
    pub value: Money,
    pub running_balance: i64,
    pub running_value: Money,
    pub location_id: Option<String>,
    pub reference_id: String,
    pub reference_type: ReferenceType,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl TenantScoped for LedgerEntry {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// The debit/credit pair produced by one recording operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPosting {
    pub transaction_id: LedgerTransactionId,
    pub entries: Vec<LedgerEntry>,
}

impl LedgerPosting {
    pub fn debit(&self) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.side == EntrySide::Debit)
    }

    pub fn credit(&self) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.side == EntrySide::Credit)
    }

    pub fn value(&self) -> Option<Money> {
        self.debit().map(|e| e.value)
    }
}
