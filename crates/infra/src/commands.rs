//! Command surface of the inventory service.
//!
//! Commands carry the tenant, the business time (`occurred_at`) and the acting
//! user. Order, location and actor identifiers are plain strings owned by
//! other contexts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::TenantId;
use stockflow_inventory::{AllocationId, LocationAddress, ReservationId, Sku, StockScope, StorageStrategy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub scope: StockScope,
    pub sku: Sku,
    pub product_name: String,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub location_id: String,
    pub zone: String,
    pub address: Option<LocationAddress>,
    pub quantity: i64,
    pub reference_id: String,
    pub received_by: String,
    /// Cost per unit in minor units; only positive costs are valued.
    pub unit_cost_minor: Option<i64>,
    /// Defaults to the configured currency.
    pub currency: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub order_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub reserved_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLine {
    pub sku: Sku,
    pub quantity: i64,
    /// When absent, the first location with enough available stock is used.
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveBulk {
    pub tenant_id: TenantId,
    pub order_id: String,
    pub lines: Vec<BulkLine>,
    pub reserved_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickStock {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub order_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub picked_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReservation {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub order_id: String,
    pub released_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOrder {
    pub tenant_id: TenantId,
    pub order_id: String,
    pub released_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub location_id: String,
    pub new_quantity: i64,
    pub reason: String,
    pub adjusted_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReservation {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub reservation_id: ReservationId,
    pub staging_location_id: String,
    pub staged_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackAllocation {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub allocation_id: AllocationId,
    pub packed_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipAllocation {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub allocation_id: AllocationId,
    pub shipped_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnToShelf {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub allocation_id: AllocationId,
    pub returned_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordShortage {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub location_id: String,
    pub order_id: String,
    pub expected_quantity: i64,
    pub actual_quantity: i64,
    pub reason: String,
    pub reported_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireReservations {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStorageStrategy {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub strategy: StorageStrategy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPickFrequency {
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub picks_per_week: u32,
    pub occurred_at: DateTime<Utc>,
}
