//! The per-SKU stock aggregate.
//!
//! `StockItem` owns the custody counters of one SKU across its locations plus
//! fast-read copies of the reservation and hard-allocation lifecycles. Every
//! operation validates completely before touching state, then mutates, then
//! recomputes the aggregate mirrors from the location records and re-evaluates
//! the low-stock latch. Facts accumulate in memory until drained by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, AggregateRoot, DomainError, DomainResult};

use crate::allocation::{AllocationId, AllocationStatus, HardAllocation};
use crate::error::StockError;
use crate::facts::{
    AllocationPacked, AllocationShipped, DiscrepancyType, InventoryDiscrepancy, LowStockAlert,
    ReservationClosed, ReturnedToShelf, StockAdjusted, StockFact, StockPicked, StockReceived,
    StockReserved, StockShortage, StockStaged, VelocityClassChanged,
};
use crate::location::StockLocation;
use crate::reservation::{default_expiry, Reservation, ReservationId, ReservationStatus};
use crate::scope::{LocationAddress, Sku, StockScope};
use crate::transaction::{InventoryTransaction, TransactionType};
use crate::velocity::{StorageStrategy, VelocityClass};

/// Recent transactions kept on the aggregate.
pub const MAX_RECENT_TRANSACTIONS: usize = 50;
/// Terminal reservations / allocations kept on the aggregate (each list).
pub const MAX_TERMINAL_HISTORY: usize = 50;

/// Stock item identifier (tenant-scoped through `StockScope`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    pub fn new() -> Self {
        Self(AggregateId::new())
    }
}

impl Default for StockItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Input of `receive_stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceipt {
    pub location_id: String,
    pub zone: String,
    pub address: Option<LocationAddress>,
    pub quantity: i64,
    pub reference_id: String,
    pub received_by: String,
}

/// Input of `record_shortage`: a picker found fewer units than expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortageReport {
    pub location_id: String,
    pub order_id: String,
    pub expected_quantity: i64,
    pub actual_quantity: i64,
    pub reason: String,
    pub reported_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOutcome {
    pub transaction: InventoryTransaction,
    pub reservation_id: ReservationId,
    /// Units still held by the reservation; 0 means fulfilled.
    pub remaining: i64,
}

/// A reservation shrunk by a shortage write-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationWriteOff {
    pub reservation_id: ReservationId,
    /// 0 means the reservation was cancelled.
    pub remaining: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortageOutcome {
    pub transaction: InventoryTransaction,
    pub written_off_reserved: i64,
    pub affected_reservations: Vec<ReservationWriteOff>,
}

/// Aggregate root: StockItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    id: StockItemId,
    scope: StockScope,
    sku: Sku,
    product_name: String,
    locations: Vec<StockLocation>,
    total_quantity: i64,
    reserved_quantity: i64,
    hard_allocated_quantity: i64,
    available_quantity: i64,
    reorder_point: i64,
    reorder_quantity: i64,
    reservations: Vec<Reservation>,
    allocations: Vec<HardAllocation>,
    recent_transactions: Vec<InventoryTransaction>,
    velocity_class: VelocityClass,
    pick_frequency: u32,
    storage_strategy: StorageStrategy,
    low_stock_alerted: bool,
    last_picked_at: Option<DateTime<Utc>>,
    last_stowed_at: Option<DateTime<Utc>>,
    last_cycle_count: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    #[serde(skip)]
    facts: Vec<StockFact>,
}

impl StockItem {
    pub fn create(
        scope: StockScope,
        sku: Sku,
        product_name: impl Into<String>,
        reorder_point: i64,
        reorder_quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, StockError> {
        validate_reorder_policy(reorder_point, reorder_quantity)?;
        let product_name = product_name.into();
        if product_name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty").into());
        }

        Ok(Self {
            id: StockItemId::new(),
            scope,
            sku,
            product_name,
            locations: Vec::new(),
            total_quantity: 0,
            reserved_quantity: 0,
            hard_allocated_quantity: 0,
            available_quantity: 0,
            reorder_point,
            reorder_quantity,
            reservations: Vec::new(),
            allocations: Vec::new(),
            recent_transactions: Vec::new(),
            velocity_class: VelocityClass::C,
            pick_frequency: 0,
            storage_strategy: StorageStrategy::Directed,
            low_stock_alerted: false,
            last_picked_at: None,
            last_stowed_at: None,
            last_cycle_count: None,
            created_at: now,
            updated_at: now,
            version: 0,
            facts: Vec::new(),
        })
    }

    pub fn id_typed(&self) -> StockItemId {
        self.id
    }

    pub fn scope(&self) -> &StockScope {
        &self.scope
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn locations(&self) -> &[StockLocation] {
        &self.locations
    }

    pub fn total_quantity(&self) -> i64 {
        self.total_quantity
    }

    pub fn reserved_quantity(&self) -> i64 {
        self.reserved_quantity
    }

    pub fn hard_allocated_quantity(&self) -> i64 {
        self.hard_allocated_quantity
    }

    pub fn available_quantity(&self) -> i64 {
        self.available_quantity
    }

    pub fn reorder_point(&self) -> i64 {
        self.reorder_point
    }

    pub fn reorder_quantity(&self) -> i64 {
        self.reorder_quantity
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn allocations(&self) -> &[HardAllocation] {
        &self.allocations
    }

    pub fn recent_transactions(&self) -> &[InventoryTransaction] {
        &self.recent_transactions
    }

    pub fn velocity_class(&self) -> VelocityClass {
        self.velocity_class
    }

    pub fn pick_frequency(&self) -> u32 {
        self.pick_frequency
    }

    pub fn storage_strategy(&self) -> StorageStrategy {
        self.storage_strategy
    }

    pub fn last_picked_at(&self) -> Option<DateTime<Utc>> {
        self.last_picked_at
    }

    pub fn last_stowed_at(&self) -> Option<DateTime<Utc>> {
        self.last_stowed_at
    }

    pub fn last_cycle_count(&self) -> Option<DateTime<Utc>> {
        self.last_cycle_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Called by repositories after a successful save.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    // ---- queries ----

    pub fn location(&self, location_id: &str) -> Option<&StockLocation> {
        self.locations.iter().find(|l| l.location_id() == location_id)
    }

    /// Locations with available stock, in the order they were first received.
    pub fn available_locations(&self) -> impl Iterator<Item = &StockLocation> {
        self.locations.iter().filter(|l| l.available() > 0)
    }

    pub fn has_zone(&self, zone: &str) -> bool {
        self.locations.iter().any(|l| l.zone() == zone)
    }

    pub fn active_reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_active())
    }

    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn allocation(&self, id: AllocationId) -> Option<&HardAllocation> {
        self.allocations.iter().find(|a| a.id == id)
    }

    /// Staged or packed allocations.
    pub fn active_allocations(&self) -> impl Iterator<Item = &HardAllocation> {
        self.allocations.iter().filter(|a| a.status.is_active())
    }

    pub fn is_low_stock(&self) -> bool {
        self.available_quantity <= self.reorder_point
    }

    /// Whether the order still holds stock here (active or staged reservation).
    pub fn has_order(&self, order_id: &str) -> bool {
        self.reservations.iter().any(|r| {
            r.order_id == order_id
                && matches!(r.status, ReservationStatus::Active | ReservationStatus::Staged)
        })
    }

    // ---- facts ----

    pub fn pending_facts(&self) -> &[StockFact] {
        &self.facts
    }

    pub fn drain_facts(&mut self) -> Vec<StockFact> {
        std::mem::take(&mut self.facts)
    }

    // ---- operations ----

    pub fn receive_stock(
        &mut self,
        receipt: StockReceipt,
        now: DateTime<Utc>,
    ) -> Result<InventoryTransaction, StockError> {
        if receipt.quantity <= 0 {
            return Err(StockError::InvalidQuantity(receipt.quantity));
        }
        // Item totals bound every location counter.
        if self.total_quantity.checked_add(receipt.quantity).is_none()
            || self.available_quantity.checked_add(receipt.quantity).is_none()
        {
            return Err(StockError::InvalidQuantity(receipt.quantity));
        }

        let idx = match self.location_index(&receipt.location_id) {
            Ok(idx) => idx,
            Err(_) => {
                self.locations
                    .push(StockLocation::new(receipt.location_id.clone(), receipt.zone.clone()));
                self.locations.len() - 1
            }
        };
        let location = &mut self.locations[idx];
        if let Some(address) = receipt.address
            && location.address().is_none()
        {
            location.set_address(address);
        }
        location.add_available(receipt.quantity)?;
        let zone = location.zone().to_string();

        self.record_stow(now);
        let tx = InventoryTransaction::new(
            TransactionType::Receive,
            receipt.quantity,
            &receipt.location_id,
            &receipt.reference_id,
            None,
            &receipt.received_by,
            now,
        );
        self.facts.push(StockFact::Received(StockReceived {
            sku: self.sku.clone(),
            location_id: receipt.location_id,
            zone,
            quantity: receipt.quantity,
            reference_id: receipt.reference_id,
            received_by: receipt.received_by,
            occurred_at: now,
        }));
        Ok(self.finish_with(tx, now))
    }

    /// Soft-reserve `quantity` units at one location for an order.
    ///
    /// No cross-location splitting happens here.
    pub fn reserve(
        &mut self,
        order_id: &str,
        location_id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<ReservationId, StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity(quantity));
        }
        let idx = self.location_index(location_id)?;
        let available = self.locations[idx].available();
        if available < quantity {
            return Err(StockError::InsufficientStock {
                location: location_id.to_string(),
                requested: quantity,
                available,
            });
        }

        self.locations[idx].reserve(quantity);
        let reservation = Reservation {
            id: ReservationId::new(),
            order_id: order_id.to_string(),
            location_id: location_id.to_string(),
            quantity,
            status: ReservationStatus::Active,
            created_at: now,
            expires_at: default_expiry(now),
        };
        let id = reservation.id;
        self.facts.push(StockFact::Reserved(StockReserved {
            sku: self.sku.clone(),
            reservation_id: id,
            order_id: reservation.order_id.clone(),
            location_id: reservation.location_id.clone(),
            quantity,
            expires_at: reservation.expires_at,
            occurred_at: now,
        }));
        self.reservations.push(reservation);
        self.finish(now);
        Ok(id)
    }

    pub fn pick(
        &mut self,
        order_id: &str,
        location_id: &str,
        quantity: i64,
        picked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<PickOutcome, StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity(quantity));
        }
        let r_idx = self
            .reservations
            .iter()
            .position(|r| r.is_active() && r.order_id == order_id && r.location_id == location_id)
            .ok_or(StockError::ReservationNotFound)?;
        let held = self.reservations[r_idx].quantity;
        if held < quantity {
            return Err(StockError::InsufficientStock {
                location: location_id.to_string(),
                requested: quantity,
                available: held,
            });
        }
        let l_idx = self.location_index(location_id)?;

        self.locations[l_idx].remove_reserved(quantity);
        let reservation = &mut self.reservations[r_idx];
        reservation.quantity -= quantity;
        let remaining = reservation.quantity;
        let fulfilled = remaining == 0;
        if fulfilled {
            reservation.status = ReservationStatus::Fulfilled;
        }
        let reservation_id = reservation.id;

        self.last_picked_at = Some(now);
        self.record_pick_frequency(now);

        let tx = InventoryTransaction::new(
            TransactionType::Pick,
            -quantity,
            location_id,
            order_id,
            None,
            picked_by,
            now,
        );
        self.facts.push(StockFact::Picked(StockPicked {
            sku: self.sku.clone(),
            reservation_id,
            order_id: order_id.to_string(),
            location_id: location_id.to_string(),
            quantity,
            reservation_fulfilled: fulfilled,
            picked_by: picked_by.to_string(),
            occurred_at: now,
        }));
        let transaction = self.finish_with(tx, now);
        Ok(PickOutcome { transaction, reservation_id, remaining })
    }

    /// Cancel the order's (first) active reservation.
    pub fn release_reservation(
        &mut self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReservationId, StockError> {
        let idx = self
            .reservations
            .iter()
            .position(|r| r.is_active() && r.order_id == order_id)
            .ok_or(StockError::ReservationNotFound)?;
        let id = self.reservations[idx].id;
        self.close_reservation(idx, ReservationStatus::Cancelled, now)?;
        self.finish(now);
        Ok(id)
    }

    pub fn release_reservation_by_id(
        &mut self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        let idx = self.reservation_index(id)?;
        let status = self.reservations[idx].status;
        if status != ReservationStatus::Active {
            return Err(StockError::InvalidReservationStatus(status));
        }
        self.close_reservation(idx, ReservationStatus::Cancelled, now)?;
        self.finish(now);
        Ok(())
    }

    /// Expire every active reservation past its deadline; returns their IDs.
    pub fn expire_reservations(&mut self, now: DateTime<Utc>) -> Vec<ReservationId> {
        let due: Vec<usize> = self
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_expired_at(now))
            .map(|(i, _)| i)
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for idx in due {
            // Locations are never removed, so this cannot fail for a live reservation.
            if self.close_reservation(idx, ReservationStatus::Expired, now).is_ok() {
                expired.push(self.reservations[idx].id);
            }
        }
        if !expired.is_empty() {
            self.finish(now);
        }
        expired
    }

    pub fn extend_reservation(
        &mut self,
        id: ReservationId,
        new_expiry: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        let idx = self.reservation_index(id)?;
        let reservation = &mut self.reservations[idx];
        if !reservation.is_active() {
            return Err(StockError::InvalidReservationStatus(reservation.status));
        }
        if new_expiry <= reservation.expires_at {
            return Err(StockError::InvalidExpiry);
        }
        reservation.expires_at = new_expiry;
        self.updated_at = now;
        Ok(())
    }

    /// Convert an active reservation into a hard allocation at a staging location.
    pub fn stage(
        &mut self,
        reservation_id: ReservationId,
        staging_location_id: &str,
        staged_by: &str,
        now: DateTime<Utc>,
    ) -> Result<AllocationId, StockError> {
        let r_idx = self.reservation_index(reservation_id)?;
        if self
            .allocations
            .iter()
            .any(|a| a.reservation_id == reservation_id && a.status != AllocationStatus::Returned)
        {
            return Err(StockError::AlreadyHardAllocated);
        }
        if !self.reservations[r_idx].is_active() {
            return Err(StockError::ReservationNotFound);
        }
        let source = self.reservations[r_idx].location_id.clone();
        let l_idx = self.location_index(&source)?;

        let reservation = &mut self.reservations[r_idx];
        reservation.status = ReservationStatus::Staged;
        let quantity = reservation.quantity;
        let order_id = reservation.order_id.clone();
        self.locations[l_idx].harden(quantity);

        let allocation = HardAllocation {
            id: AllocationId::new(),
            reservation_id,
            order_id: order_id.clone(),
            quantity,
            source_location_id: source.clone(),
            staging_location_id: staging_location_id.to_string(),
            status: AllocationStatus::Staged,
            staged_by: staged_by.to_string(),
            packed_by: None,
            created_at: now,
            packed_at: None,
            shipped_at: None,
            returned_at: None,
        };
        let id = allocation.id;
        self.allocations.push(allocation);
        self.facts.push(StockFact::Staged(StockStaged {
            sku: self.sku.clone(),
            allocation_id: id,
            reservation_id,
            order_id,
            quantity,
            source_location_id: source,
            staging_location_id: staging_location_id.to_string(),
            staged_by: staged_by.to_string(),
            occurred_at: now,
        }));
        self.finish(now);
        Ok(id)
    }

    /// Reverse a `stage` whose satellite writes failed.
    ///
    /// The allocation is removed outright and its reservation is active again.
    /// Any `Staged` fact still pending for it is dropped.
    pub fn undo_stage(&mut self, allocation_id: AllocationId, now: DateTime<Utc>) -> Result<(), StockError> {
        let a_idx = self.allocation_index(allocation_id)?;
        let allocation = &self.allocations[a_idx];
        if allocation.status != AllocationStatus::Staged {
            return Err(StockError::InvalidAllocationStatus {
                expected: AllocationStatus::Staged,
                found: allocation.status,
            });
        }
        let l_idx = self.location_index(&allocation.source_location_id)?;
        let r_idx = self.reservation_index(allocation.reservation_id)?;
        let quantity = allocation.quantity;

        self.locations[l_idx].soften(quantity);
        self.reservations[r_idx].status = ReservationStatus::Active;
        self.allocations.remove(a_idx);
        self.facts
            .retain(|f| !matches!(f, StockFact::Staged(s) if s.allocation_id == allocation_id));
        self.finish(now);
        Ok(())
    }

    pub fn pack(
        &mut self,
        allocation_id: AllocationId,
        packed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        let idx = self.allocation_index(allocation_id)?;
        let allocation = &mut self.allocations[idx];
        allocation.pack(packed_by, now)?;
        let order_id = allocation.order_id.clone();
        self.facts.push(StockFact::Packed(AllocationPacked {
            sku: self.sku.clone(),
            allocation_id,
            order_id,
            packed_by: packed_by.to_string(),
            occurred_at: now,
        }));
        self.finish(now);
        Ok(())
    }

    /// Ship a packed allocation; its units leave the building for good.
    pub fn ship(
        &mut self,
        allocation_id: AllocationId,
        shipped_by: &str,
        now: DateTime<Utc>,
    ) -> Result<InventoryTransaction, StockError> {
        let a_idx = self.allocation_index(allocation_id)?;
        let allocation = &self.allocations[a_idx];
        if allocation.status != AllocationStatus::Packed {
            return Err(StockError::InvalidAllocationStatus {
                expected: AllocationStatus::Packed,
                found: allocation.status,
            });
        }
        let l_idx = self.location_index(&allocation.source_location_id)?;
        let r_idx = self.reservation_index(allocation.reservation_id)?;

        let allocation = &mut self.allocations[a_idx];
        allocation.ship(now)?;
        let quantity = allocation.quantity;
        let order_id = allocation.order_id.clone();
        let source = allocation.source_location_id.clone();
        self.locations[l_idx].remove_hard_allocated(quantity);
        self.reservations[r_idx].status = ReservationStatus::Fulfilled;

        let tx = InventoryTransaction::new(
            TransactionType::Ship,
            -quantity,
            &source,
            &order_id,
            None,
            shipped_by,
            now,
        );
        self.facts.push(StockFact::Shipped(AllocationShipped {
            sku: self.sku.clone(),
            allocation_id,
            order_id,
            quantity,
            source_location_id: source,
            occurred_at: now,
        }));
        Ok(self.finish_with(tx, now))
    }

    /// Put staged or packed units back on the shelf; the reservation is cancelled.
    pub fn return_to_shelf(
        &mut self,
        allocation_id: AllocationId,
        returned_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<InventoryTransaction, StockError> {
        let a_idx = self.allocation_index(allocation_id)?;
        let allocation = &self.allocations[a_idx];
        allocation.check_returnable()?;
        let l_idx = self.location_index(&allocation.source_location_id)?;
        let r_idx = self.reservation_index(allocation.reservation_id)?;

        let allocation = &mut self.allocations[a_idx];
        allocation.status = AllocationStatus::Returned;
        allocation.returned_at = Some(now);
        let quantity = allocation.quantity;
        let order_id = allocation.order_id.clone();
        let source = allocation.source_location_id.clone();
        self.locations[l_idx].return_hard_allocated(quantity);
        self.reservations[r_idx].status = ReservationStatus::Cancelled;

        let tx = InventoryTransaction::new(
            TransactionType::ReturnToShelf,
            quantity,
            &source,
            &order_id,
            Some(reason),
            returned_by,
            now,
        );
        self.facts.push(StockFact::ReturnedToShelf(ReturnedToShelf {
            sku: self.sku.clone(),
            allocation_id,
            order_id,
            quantity,
            source_location_id: source,
            returned_by: returned_by.to_string(),
            reason: reason.to_string(),
            occurred_at: now,
        }));
        Ok(self.finish_with(tx, now))
    }

    /// Administrative correction (cycle count) of one location's quantity.
    ///
    /// Held units cannot be adjusted away. A zero delta only stamps the cycle
    /// count and returns `None`.
    pub fn adjust(
        &mut self,
        location_id: &str,
        new_quantity: i64,
        reason: &str,
        adjusted_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InventoryTransaction>, StockError> {
        if new_quantity < 0 {
            return Err(StockError::InvalidQuantity(new_quantity));
        }
        let idx = self.location_index(location_id)?;
        let location = &self.locations[idx];
        if new_quantity < location.held() {
            return Err(StockError::InsufficientStock {
                location: location_id.to_string(),
                requested: location.held(),
                available: new_quantity,
            });
        }
        let old_quantity = location.quantity();

        self.record_cycle_count(now);
        let delta = new_quantity - old_quantity;
        if delta == 0 {
            self.updated_at = now;
            return Ok(None);
        }

        self.locations[idx].set_quantity(new_quantity);
        let tx = InventoryTransaction::new(
            TransactionType::Adjust,
            delta,
            location_id,
            "",
            Some(reason),
            adjusted_by,
            now,
        );
        self.facts.push(StockFact::Adjusted(StockAdjusted {
            sku: self.sku.clone(),
            location_id: location_id.to_string(),
            old_quantity,
            new_quantity,
            reason: reason.to_string(),
            adjusted_by: adjusted_by.to_string(),
            occurred_at: now,
        }));
        Ok(Some(self.finish_with(tx, now)))
    }

    /// Write off units a picker could not find.
    ///
    /// Available stock goes first; any remainder comes out of soft
    /// reservations at the location, the reporting order's own first. The
    /// write-off is capped at what the location holds outside hard allocations.
    pub fn record_shortage(
        &mut self,
        report: ShortageReport,
        now: DateTime<Utc>,
    ) -> Result<ShortageOutcome, StockError> {
        if report.actual_quantity < 0 {
            return Err(StockError::InvalidQuantity(report.actual_quantity));
        }
        if report.actual_quantity >= report.expected_quantity {
            return Err(StockError::NoShortageToRecord);
        }
        let idx = self.location_index(&report.location_id)?;

        let shortfall = report.expected_quantity - report.actual_quantity;
        let before = self.locations[idx].quantity();
        let written_off_reserved = self.locations[idx].write_off(shortfall);
        let removed = before - self.locations[idx].quantity();
        let affected_reservations =
            self.shrink_reservations(&report.location_id, &report.order_id, written_off_reserved);

        let tx = InventoryTransaction::new(
            TransactionType::Shortage,
            -removed,
            &report.location_id,
            &report.order_id,
            Some(&report.reason),
            &report.reported_by,
            now,
        );
        self.facts.push(StockFact::StockShortage(StockShortage {
            sku: self.sku.clone(),
            location_id: report.location_id.clone(),
            order_id: report.order_id.clone(),
            expected_quantity: report.expected_quantity,
            actual_quantity: report.actual_quantity,
            shortage_quantity: shortfall,
            reason: report.reason,
            reported_by: report.reported_by,
            occurred_at: now,
        }));
        self.facts.push(StockFact::InventoryDiscrepancy(InventoryDiscrepancy {
            sku: self.sku.clone(),
            location_id: report.location_id,
            system_quantity: before,
            actual_quantity: report.actual_quantity,
            discrepancy_type: DiscrepancyType::Shortage,
            source: "picking".to_string(),
            reference_id: report.order_id,
            occurred_at: now,
        }));
        let transaction = self.finish_with(tx, now);
        Ok(ShortageOutcome { transaction, written_off_reserved, affected_reservations })
    }

    pub fn set_storage_strategy(&mut self, strategy: StorageStrategy, now: DateTime<Utc>) {
        self.storage_strategy = strategy;
        self.updated_at = now;
    }

    /// Count one pick toward the velocity class.
    pub fn record_pick_frequency(&mut self, now: DateTime<Utc>) {
        let next = self.pick_frequency.saturating_add(1);
        self.apply_pick_frequency(next, now);
    }

    /// Replace the pick counter (weekly roll-up).
    pub fn set_pick_frequency(&mut self, picks_per_week: u32, now: DateTime<Utc>) {
        self.apply_pick_frequency(picks_per_week, now);
    }

    pub fn record_stow(&mut self, now: DateTime<Utc>) {
        self.last_stowed_at = Some(now);
        self.updated_at = now;
    }

    pub fn record_cycle_count(&mut self, now: DateTime<Utc>) {
        self.last_cycle_count = Some(now);
        self.updated_at = now;
    }

    pub fn set_location_address(
        &mut self,
        location_id: &str,
        address: LocationAddress,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        let idx = self.location_index(location_id)?;
        self.locations[idx].set_address(address);
        self.updated_at = now;
        Ok(())
    }

    pub fn set_reorder_policy(
        &mut self,
        reorder_point: i64,
        reorder_quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        validate_reorder_policy(reorder_point, reorder_quantity)?;
        self.reorder_point = reorder_point;
        self.reorder_quantity = reorder_quantity;
        self.finish(now);
        Ok(())
    }

    /// Verify the custody invariant and the aggregate mirrors.
    pub fn check_invariants(&self) -> DomainResult<()> {
        for location in &self.locations {
            if !location.is_consistent() {
                return Err(DomainError::invariant(format!(
                    "location {} counters are inconsistent ({:?})",
                    location.location_id(),
                    location
                )));
            }
        }
        let sums = self.location_sums();
        let mirrors = (
            self.total_quantity,
            self.reserved_quantity,
            self.hard_allocated_quantity,
            self.available_quantity,
        );
        if sums != mirrors {
            return Err(DomainError::invariant(format!(
                "aggregate mirrors {mirrors:?} differ from location sums {sums:?}"
            )));
        }
        Ok(())
    }

    // ---- internals ----

    fn location_index(&self, location_id: &str) -> Result<usize, StockError> {
        self.locations
            .iter()
            .position(|l| l.location_id() == location_id)
            .ok_or_else(|| StockError::LocationNotFound(location_id.to_string()))
    }

    fn reservation_index(&self, id: ReservationId) -> Result<usize, StockError> {
        self.reservations
            .iter()
            .position(|r| r.id == id)
            .ok_or(StockError::ReservationNotFound)
    }

    fn allocation_index(&self, id: AllocationId) -> Result<usize, StockError> {
        self.allocations
            .iter()
            .position(|a| a.id == id)
            .ok_or(StockError::AllocationNotFound)
    }

    /// Return an active reservation's units to available and close it.
    fn close_reservation(
        &mut self,
        idx: usize,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        let l_idx = self.location_index(&self.reservations[idx].location_id)?;
        let reservation = &mut self.reservations[idx];
        self.locations[l_idx].release(reservation.quantity);
        reservation.status = status;

        let closed = ReservationClosed {
            sku: self.sku.clone(),
            reservation_id: reservation.id,
            order_id: reservation.order_id.clone(),
            location_id: reservation.location_id.clone(),
            quantity: reservation.quantity,
            occurred_at: now,
        };
        self.facts.push(match status {
            ReservationStatus::Expired => StockFact::ReservationExpired(closed),
            _ => StockFact::ReservationReleased(closed),
        });
        Ok(())
    }

    /// Take `amount` written-off units out of active reservations at a location.
    fn shrink_reservations(
        &mut self,
        location_id: &str,
        order_id: &str,
        mut amount: i64,
    ) -> Vec<ReservationWriteOff> {
        let mut affected = Vec::new();
        if amount == 0 {
            return affected;
        }

        let mut candidates: Vec<usize> = self
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_active() && r.location_id == location_id)
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by_key(|&i| self.reservations[i].order_id != order_id);

        for idx in candidates {
            if amount == 0 {
                break;
            }
            let reservation = &mut self.reservations[idx];
            let take = amount.min(reservation.quantity);
            reservation.quantity -= take;
            amount -= take;
            if reservation.quantity == 0 {
                reservation.status = ReservationStatus::Cancelled;
            }
            affected.push(ReservationWriteOff {
                reservation_id: reservation.id,
                remaining: reservation.quantity,
            });
        }
        affected
    }

    fn apply_pick_frequency(&mut self, picks_per_week: u32, now: DateTime<Utc>) {
        self.pick_frequency = picks_per_week;
        let new_class = VelocityClass::from_pick_frequency(picks_per_week);
        if new_class != self.velocity_class {
            self.facts.push(StockFact::VelocityClassChanged(VelocityClassChanged {
                sku: self.sku.clone(),
                old_class: self.velocity_class,
                new_class,
                pick_frequency: picks_per_week,
                occurred_at: now,
            }));
            self.velocity_class = new_class;
        }
        self.updated_at = now;
    }

    fn location_sums(&self) -> (i64, i64, i64, i64) {
        self.locations.iter().fold((0, 0, 0, 0), |acc, l| {
            (
                acc.0 + l.quantity(),
                acc.1 + l.reserved(),
                acc.2 + l.hard_allocated(),
                acc.3 + l.available(),
            )
        })
    }

    /// Common tail of every mutation.
    fn finish(&mut self, now: DateTime<Utc>) {
        let (total, reserved, hard_allocated, available) = self.location_sums();
        self.total_quantity = total;
        self.reserved_quantity = reserved;
        self.hard_allocated_quantity = hard_allocated;
        self.available_quantity = available;
        self.updated_at = now;

        if self.is_low_stock() {
            if !self.low_stock_alerted {
                self.low_stock_alerted = true;
                self.facts.push(StockFact::LowStockAlert(LowStockAlert {
                    sku: self.sku.clone(),
                    available_quantity: available,
                    reorder_point: self.reorder_point,
                    reorder_quantity: self.reorder_quantity,
                    occurred_at: now,
                }));
            }
        } else {
            self.low_stock_alerted = false;
        }

        compact_terminal(&mut self.reservations, |r| r.status.is_terminal());
        compact_terminal(&mut self.allocations, |a| !a.status.is_active());
    }

    fn finish_with(&mut self, tx: InventoryTransaction, now: DateTime<Utc>) -> InventoryTransaction {
        self.recent_transactions.push(tx.clone());
        let len = self.recent_transactions.len();
        if len > MAX_RECENT_TRANSACTIONS {
            self.recent_transactions.drain(..len - MAX_RECENT_TRANSACTIONS);
        }
        self.finish(now);
        tx
    }
}

impl AggregateRoot for StockItem {
    type Id = StockItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn validate_reorder_policy(reorder_point: i64, reorder_quantity: i64) -> Result<(), StockError> {
    if reorder_point < 0 {
        return Err(StockError::InvalidQuantity(reorder_point));
    }
    if reorder_quantity < 0 {
        return Err(StockError::InvalidQuantity(reorder_quantity));
    }
    Ok(())
}

/// Drop the oldest terminal entries beyond `MAX_TERMINAL_HISTORY`.
fn compact_terminal<T>(items: &mut Vec<T>, is_terminal: impl Fn(&T) -> bool) {
    let terminal = items.iter().filter(|i| is_terminal(i)).count();
    let mut excess = terminal.saturating_sub(MAX_TERMINAL_HISTORY);
    if excess == 0 {
        return;
    }
    items.retain(|i| {
        if excess > 0 && is_terminal(i) {
            excess -= 1;
            false
        } else {
            true
        }
    });
}
