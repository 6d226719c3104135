use serde::{Deserialize, Serialize};

use crate::error::StockError;
use crate::scope::LocationAddress;

/// Per-location custody counters for one SKU.
///
/// `quantity == available + reserved + hard_allocated` at all times; the
/// counters are only changed through the crate-private movement helpers below,
/// each of which moves units between two buckets (or in/out of the building).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLocation {
    location_id: String,
    zone: String,
    address: Option<LocationAddress>,
    quantity: i64,
    reserved: i64,
    hard_allocated: i64,
    available: i64,
}

impl StockLocation {
    pub(crate) fn new(location_id: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            zone: zone.into(),
            address: None,
            quantity: 0,
            reserved: 0,
            hard_allocated: 0,
            available: 0,
        }
    }

    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn address(&self) -> Option<&LocationAddress> {
        self.address.as_ref()
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn hard_allocated(&self) -> i64 {
        self.hard_allocated
    }

    pub fn available(&self) -> i64 {
        self.available
    }

    /// Units held for orders (soft or physical).
    pub fn held(&self) -> i64 {
        self.reserved + self.hard_allocated
    }

    pub fn is_consistent(&self) -> bool {
        self.quantity == self.available + self.reserved + self.hard_allocated
            && self.available >= 0
            && self.reserved >= 0
            && self.hard_allocated >= 0
    }

    pub(crate) fn set_address(&mut self, address: LocationAddress) {
        self.address = Some(address);
    }

    /// New units arrive as available. Fails without touching the counters
    /// if either would overflow.
    pub(crate) fn add_available(&mut self, qty: i64) -> Result<(), StockError> {
        let quantity = self.quantity.checked_add(qty).ok_or(StockError::InvalidQuantity(qty))?;
        let available = self.available.checked_add(qty).ok_or(StockError::InvalidQuantity(qty))?;
        self.quantity = quantity;
        self.available = available;
        Ok(())
    }

    pub(crate) fn reserve(&mut self, qty: i64) {
        self.available -= qty;
        self.reserved += qty;
    }

    pub(crate) fn release(&mut self, qty: i64) {
        self.reserved -= qty;
        self.available += qty;
    }

    /// Reserved units leave the building (picked).
    pub(crate) fn remove_reserved(&mut self, qty: i64) {
        self.reserved -= qty;
        self.quantity -= qty;
    }

    pub(crate) fn harden(&mut self, qty: i64) {
        self.reserved -= qty;
        self.hard_allocated += qty;
    }

    pub(crate) fn soften(&mut self, qty: i64) {
        self.hard_allocated -= qty;
        self.reserved += qty;
    }

    /// Staged units leave the building (shipped).
    pub(crate) fn remove_hard_allocated(&mut self, qty: i64) {
        self.hard_allocated -= qty;
        self.quantity -= qty;
    }

    pub(crate) fn return_hard_allocated(&mut self, qty: i64) {
        self.hard_allocated -= qty;
        self.available += qty;
    }

    /// Administrative correction; callers guarantee `new_quantity >= held()`.
    pub(crate) fn set_quantity(&mut self, new_quantity: i64) {
        self.quantity = new_quantity;
        self.available = new_quantity - self.held();
    }

    /// Remove units that turned out not to exist.
    ///
    /// Consumes available stock first; any remainder is taken out of soft
    /// reservations (over-reservation correction). Returns the reserved units
    /// that had to be written off.
    pub(crate) fn write_off(&mut self, qty: i64) -> i64 {
        let from_available = qty.min(self.available);
        let from_reserved = (qty - from_available).min(self.reserved);
        self.available -= from_available;
        self.reserved -= from_reserved;
        self.quantity -= from_available + from_reserved;
        from_reserved
    }
}
