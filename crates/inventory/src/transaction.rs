//! Inventory transactions: the audit trail of counter-changing operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{Entity, TenantId};
use stockflow_events::TenantScoped;

use crate::scope::{Sku, StockScope};

stockflow_core::uuid_id!(
    /// Identifier of an inventory transaction.
    TransactionId
);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Receive,
    Pick,
    Adjust,
    Ship,
    ReturnToShelf,
    Shortage,
}

/// One movement. `quantity` is signed: negative when units leave the building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: TransactionId,
    pub kind: TransactionType,
    pub quantity: i64,
    pub location_id: String,
    pub reference_id: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl InventoryTransaction {
    pub(crate) fn new(
        kind: TransactionType,
        quantity: i64,
        location_id: &str,
        reference_id: &str,
        reason: Option<&str>,
        created_by: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            kind,
            quantity,
            location_id: location_id.to_string(),
            reference_id: reference_id.to_string(),
            reason: reason.map(str::to_string),
            created_at,
            created_by: created_by.to_string(),
        }
    }
}

/// Persisted, immutable copy of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub scope: StockScope,
    pub sku: Sku,
    pub transaction: InventoryTransaction,
    version: u64,
}

impl TransactionRecord {
    pub fn new(scope: StockScope, sku: Sku, transaction: InventoryTransaction) -> Self {
        Self { scope, sku, transaction, version: 0 }
    }
}

impl Entity for TransactionRecord {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.transaction.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl TenantScoped for TransactionRecord {
    fn tenant_id(&self) -> TenantId {
        self.scope.tenant_id
    }
}
