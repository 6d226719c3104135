//! Facts emitted by the stock aggregate.
//!
//! The aggregate accumulates these in memory; the caller drains and dispatches
//! them after the aggregate has been persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_events::Event;

use crate::allocation::AllocationId;
use crate::reservation::ReservationId;
use crate::scope::Sku;
use crate::velocity::VelocityClass;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub sku: Sku,
    pub location_id: String,
    pub zone: String,
    pub quantity: i64,
    pub reference_id: String,
    pub received_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub sku: Sku,
    pub reservation_id: ReservationId,
    pub order_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Shared shape of released and expired reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationClosed {
    pub sku: Sku,
    pub reservation_id: ReservationId,
    pub order_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPicked {
    pub sku: Sku,
    pub reservation_id: ReservationId,
    pub order_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub reservation_fulfilled: bool,
    pub picked_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub sku: Sku,
    pub location_id: String,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub reason: String,
    pub adjusted_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockStaged {
    pub sku: Sku,
    pub allocation_id: AllocationId,
    pub reservation_id: ReservationId,
    pub order_id: String,
    pub quantity: i64,
    pub source_location_id: String,
    pub staging_location_id: String,
    pub staged_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPacked {
    pub sku: Sku,
    pub allocation_id: AllocationId,
    pub order_id: String,
    pub packed_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationShipped {
    pub sku: Sku,
    pub allocation_id: AllocationId,
    pub order_id: String,
    pub quantity: i64,
    pub source_location_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedToShelf {
    pub sku: Sku,
    pub allocation_id: AllocationId,
    pub order_id: String,
    pub quantity: i64,
    pub source_location_id: String,
    pub returned_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub sku: Sku,
    pub available_quantity: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityClassChanged {
    pub sku: Sku,
    pub old_class: VelocityClass,
    pub new_class: VelocityClass,
    pub pick_frequency: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    pub sku: Sku,
    pub location_id: String,
    pub order_id: String,
    pub expected_quantity: i64,
    pub actual_quantity: i64,
    pub shortage_quantity: i64,
    pub reason: String,
    pub reported_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancyType {
    Shortage,
    Overage,
}

impl core::fmt::Display for DiscrepancyType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DiscrepancyType::Shortage => f.write_str("shortage"),
            DiscrepancyType::Overage => f.write_str("overage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDiscrepancy {
    pub sku: Sku,
    pub location_id: String,
    pub system_quantity: i64,
    pub actual_quantity: i64,
    pub discrepancy_type: DiscrepancyType,
    pub source: String,
    pub reference_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StockFact {
    Received(StockReceived),
    Reserved(StockReserved),
    ReservationReleased(ReservationClosed),
    ReservationExpired(ReservationClosed),
    Picked(StockPicked),
    Adjusted(StockAdjusted),
    Staged(StockStaged),
    Packed(AllocationPacked),
    Shipped(AllocationShipped),
    ReturnedToShelf(ReturnedToShelf),
    LowStockAlert(LowStockAlert),
    VelocityClassChanged(VelocityClassChanged),
    StockShortage(StockShortage),
    InventoryDiscrepancy(InventoryDiscrepancy),
}

impl StockFact {
    pub fn sku(&self) -> &Sku {
        match self {
            StockFact::Received(e) => &e.sku,
            StockFact::Reserved(e) => &e.sku,
            StockFact::ReservationReleased(e) | StockFact::ReservationExpired(e) => &e.sku,
            StockFact::Picked(e) => &e.sku,
            StockFact::Adjusted(e) => &e.sku,
            StockFact::Staged(e) => &e.sku,
            StockFact::Packed(e) => &e.sku,
            StockFact::Shipped(e) => &e.sku,
            StockFact::ReturnedToShelf(e) => &e.sku,
            StockFact::LowStockAlert(e) => &e.sku,
            StockFact::VelocityClassChanged(e) => &e.sku,
            StockFact::StockShortage(e) => &e.sku,
            StockFact::InventoryDiscrepancy(e) => &e.sku,
        }
    }
}

impl Event for StockFact {
    fn event_type(&self) -> &'static str {
        match self {
            StockFact::Received(_) => "inventory.received",
            StockFact::Reserved(_) => "inventory.reserved",
            StockFact::ReservationReleased(_) => "inventory.reservation-released",
            StockFact::ReservationExpired(_) => "inventory.reservation-expired",
            StockFact::Picked(_) => "inventory.picked",
            StockFact::Adjusted(_) => "inventory.adjusted",
            StockFact::Staged(_) => "inventory.staged",
            StockFact::Packed(_) => "inventory.packed",
            StockFact::Shipped(_) => "inventory.shipped",
            StockFact::ReturnedToShelf(_) => "inventory.returned-to-shelf",
            StockFact::LowStockAlert(_) => "inventory.low-stock-alert",
            StockFact::VelocityClassChanged(_) => "inventory.velocity-class-changed",
            StockFact::StockShortage(_) => "inventory.stock-shortage",
            StockFact::InventoryDiscrepancy(_) => "inventory.discrepancy",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockFact::Received(e) => e.occurred_at,
            StockFact::Reserved(e) => e.occurred_at,
            StockFact::ReservationReleased(e) | StockFact::ReservationExpired(e) => e.occurred_at,
            StockFact::Picked(e) => e.occurred_at,
            StockFact::Adjusted(e) => e.occurred_at,
            StockFact::Staged(e) => e.occurred_at,
            StockFact::Packed(e) => e.occurred_at,
            StockFact::Shipped(e) => e.occurred_at,
            StockFact::ReturnedToShelf(e) => e.occurred_at,
            StockFact::LowStockAlert(e) => e.occurred_at,
            StockFact::VelocityClassChanged(e) => e.occurred_at,
            StockFact::StockShortage(e) => e.occurred_at,
            StockFact::InventoryDiscrepancy(e) => e.occurred_at,
        }
    }
}
