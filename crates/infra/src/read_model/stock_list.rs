use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_core::TenantId;
use stockflow_events::{Event, EventEnvelope, Projection};
use stockflow_inventory::{
    DiscrepancyType, Sku, StockFact, StockItem, StockItemId, StockLocation, VelocityClass,
};

use crate::read_model::TenantStore;

/// Denormalized stock list row, one per `(tenant, sku)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockListView {
    pub tenant_id: TenantId,
    pub item_id: StockItemId,
    pub sku: Sku,
    pub product_name: String,
    pub total_quantity: i64,
    pub reserved_quantity: i64,
    pub hard_allocated_quantity: i64,
    pub available_quantity: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub is_low_stock: bool,
    pub is_out_of_stock: bool,
    pub location_count: usize,
    /// Location with the most available units; ties go to the first received.
    pub primary_location: Option<String>,
    pub available_locations: Vec<String>,
    pub locations: Vec<String>,
    pub zones: Vec<String>,
    pub active_reservations: usize,
    pub reserved_orders: Vec<String>,
    pub velocity_class: VelocityClass,
    pub last_received_at: Option<DateTime<Utc>>,
    pub last_picked_at: Option<DateTime<Utc>>,
    pub last_adjusted_at: Option<DateTime<Utc>>,
    pub last_shortage_at: Option<DateTime<Utc>>,
    pub last_discrepancy_at: Option<DateTime<Utc>>,
    pub last_discrepancy_type: Option<DiscrepancyType>,
    pub updated_at: DateTime<Utc>,
}

impl StockListView {
    /// Snapshot fields from the aggregate; activity stamps start empty.
    fn from_item(item: &StockItem) -> Self {
        let primary_location = item
            .locations()
            .iter()
            .filter(|l| l.available() > 0)
            .fold(None, |best: Option<&StockLocation>, l| match best {
                Some(b) if b.available() >= l.available() => Some(b),
                _ => Some(l),
            })
            .map(|l| l.location_id().to_string());

        let zones: BTreeSet<String> = item.locations().iter().map(|l| l.zone().to_string()).collect();
        let orders: BTreeSet<String> = item.active_reservations().map(|r| r.order_id.clone()).collect();

        Self {
            tenant_id: item.scope().tenant_id,
            item_id: item.id_typed(),
            sku: item.sku().clone(),
            product_name: item.product_name().to_string(),
            total_quantity: item.total_quantity(),
            reserved_quantity: item.reserved_quantity(),
            hard_allocated_quantity: item.hard_allocated_quantity(),
            available_quantity: item.available_quantity(),
            reorder_point: item.reorder_point(),
            reorder_quantity: item.reorder_quantity(),
            is_low_stock: item.is_low_stock(),
            is_out_of_stock: item.available_quantity() == 0,
            location_count: item.locations().len(),
            primary_location,
            available_locations: item.available_locations().map(|l| l.location_id().to_string()).collect(),
            locations: item.locations().iter().map(|l| l.location_id().to_string()).collect(),
            zones: zones.into_iter().collect(),
            active_reservations: item.active_reservations().count(),
            reserved_orders: orders.into_iter().collect(),
            velocity_class: item.velocity_class(),
            last_received_at: None,
            last_picked_at: item.last_picked_at(),
            last_adjusted_at: None,
            last_shortage_at: None,
            last_discrepancy_at: None,
            last_discrepancy_type: None,
            updated_at: item.updated_at(),
        }
    }

    fn keep_activity_of(mut self, previous: &StockListView) -> Self {
        self.last_received_at = self.last_received_at.or(previous.last_received_at);
        self.last_picked_at = self.last_picked_at.or(previous.last_picked_at);
        self.last_adjusted_at = previous.last_adjusted_at;
        self.last_shortage_at = previous.last_shortage_at;
        self.last_discrepancy_at = previous.last_discrepancy_at;
        self.last_discrepancy_type = previous.last_discrepancy_type;
        self
    }

    fn close_reservation(&mut self, order_id: &str) {
        self.active_reservations = self.active_reservations.saturating_sub(1);
        self.reserved_orders.retain(|o| o != order_id);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    item_id: StockItemId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("no stock list view for sku {0}")]
    MissingView(Sku),

    #[error("sequence numbers start at 1")]
    ZeroSequence,

    #[error("projection unavailable: {0}")]
    Unavailable(String),
}

/// Maintains `StockListView` rows.
///
/// `refresh` copies the aggregate snapshot and is authoritative for counters.
/// `apply_envelope` stamps activity times and keeps reservation fields moving
/// for consumers that only see facts. Replays at or below the per-item cursor
/// are ignored.
#[derive(Debug)]
pub struct StockProjector<S>
where
    S: TenantStore<Sku, StockListView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> StockProjector<S>
where
    S: TenantStore<Sku, StockListView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, sku: &Sku) -> Option<StockListView> {
        self.store.get(tenant_id, sku)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<StockListView> {
        self.store.list(tenant_id)
    }

    /// Upsert the full snapshot of `item`. Idempotent.
    pub fn refresh(&self, item: &StockItem) {
        let tenant_id = item.scope().tenant_id;
        let fresh = StockListView::from_item(item);
        let view = match self.store.get(tenant_id, item.sku()) {
            Some(previous) if previous.item_id == fresh.item_id => fresh.keep_activity_of(&previous),
            _ => fresh,
        };
        self.store.upsert(tenant_id, item.sku().clone(), view);
    }

    pub fn remove(&self, tenant_id: TenantId, sku: &Sku) {
        self.store.remove(tenant_id, sku);
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<StockFact>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let seq = envelope.sequence_number();
        if seq == 0 {
            return Err(ProjectionError::ZeroSequence);
        }

        let fact = envelope.payload();
        let mut view = self
            .store
            .get(tenant_id, fact.sku())
            .ok_or_else(|| ProjectionError::MissingView(fact.sku().clone()))?;

        if view.tenant_id != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "view tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if view.item_id.0 != envelope.aggregate_id() {
            return Err(ProjectionError::TenantIsolation(
                "view item_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let key = CursorKey { tenant_id, item_id: view.item_id };
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| ProjectionError::Unavailable("cursor lock poisoned".to_string()))?;
        if seq <= cursors.get(&key).copied().unwrap_or(0) {
            return Ok(());
        }

        let at = fact.occurred_at();
        match fact {
            StockFact::Received(_) => view.last_received_at = Some(at),
            StockFact::Reserved(e) => {
                view.active_reservations += 1;
                if let Err(pos) = view.reserved_orders.binary_search(&e.order_id) {
                    view.reserved_orders.insert(pos, e.order_id.clone());
                }
            }
            StockFact::ReservationReleased(e) | StockFact::ReservationExpired(e) => {
                view.close_reservation(&e.order_id)
            }
            StockFact::Staged(e) => view.close_reservation(&e.order_id),
            StockFact::Picked(e) => {
                view.last_picked_at = Some(at);
                if e.reservation_fulfilled {
                    view.close_reservation(&e.order_id);
                }
            }
            StockFact::Adjusted(_) => view.last_adjusted_at = Some(at),
            StockFact::StockShortage(_) => view.last_shortage_at = Some(at),
            StockFact::InventoryDiscrepancy(e) => {
                view.last_discrepancy_at = Some(at);
                view.last_discrepancy_type = Some(e.discrepancy_type);
            }
            StockFact::VelocityClassChanged(e) => view.velocity_class = e.new_class,
            StockFact::Packed(_)
            | StockFact::Shipped(_)
            | StockFact::ReturnedToShelf(_)
            | StockFact::LowStockAlert(_) => {}
        }
        if at > view.updated_at {
            view.updated_at = at;
        }

        self.store.upsert(tenant_id, fact.sku().clone(), view);
        cursors.insert(key, seq);
        Ok(())
    }

    /// Drop every view and cursor of the tenant, then re-project `items`.
    pub fn rebuild<'a>(&self, tenant_id: TenantId, items: impl IntoIterator<Item = &'a StockItem>) {
        self.store.clear_tenant(tenant_id);
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
        for item in items {
            if item.scope().tenant_id == tenant_id {
                self.refresh(item);
            }
        }
    }
}

impl<S> Projection for StockProjector<S>
where
    S: TenantStore<Sku, StockListView>,
{
    type Ev = StockFact;
    type Error = ProjectionError;

    fn apply(&self, envelope: &EventEnvelope<StockFact>) -> Result<(), ProjectionError> {
        self.apply_envelope(envelope)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use stockflow_inventory::{StockReceipt, StockScope};

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    type Store = Arc<InMemoryTenantStore<Sku, StockListView>>;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 0, 0).unwrap()
    }

    fn receipt(location: &str, zone: &str, quantity: i64) -> StockReceipt {
        StockReceipt {
            location_id: location.to_string(),
            zone: zone.to_string(),
            address: None,
            quantity,
            reference_id: "PO-7".to_string(),
            received_by: "receiver".to_string(),
        }
    }

    fn item(tenant_id: TenantId) -> StockItem {
        StockItem::create(
            StockScope::new(tenant_id, "FAC-1", "WH-1"),
            Sku::new("SKU-LIST").unwrap(),
            "Listed widget",
            10,
            40,
            t0(),
        )
        .unwrap()
    }

    fn envelopes(item: &mut StockItem, first_seq: u64) -> Vec<EventEnvelope<StockFact>> {
        item.drain_facts()
            .into_iter()
            .enumerate()
            .map(|(i, fact)| {
                EventEnvelope::wrap(
                    item.scope().tenant_id,
                    item.id_typed().0,
                    "inventory.stock_item",
                    first_seq + i as u64,
                    fact,
                )
            })
            .collect()
    }

    #[test]
    fn refresh_projects_the_snapshot() {
        let projector = StockProjector::new(Store::default());
        let tenant = TenantId::new();
        let mut stock = item(tenant);
        stock.receive_stock(receipt("B-02", "B", 5), t0()).unwrap();
        stock.receive_stock(receipt("A-01", "A", 30), t0()).unwrap();
        stock.receive_stock(receipt("C-03", "A", 30), t0()).unwrap();
        stock.reserve("ORD-2", "A-01", 4, t0()).unwrap();
        stock.reserve("ORD-1", "C-03", 4, t0()).unwrap();

        projector.refresh(&stock);
        let view = projector.get(tenant, stock.sku()).unwrap();

        assert_eq!(view.total_quantity, 65);
        assert_eq!(view.available_quantity, 57);
        assert_eq!(view.location_count, 3);
        // A-01 and C-03 both hold 26 available; the first received wins.
        assert_eq!(view.primary_location.as_deref(), Some("A-01"));
        assert_eq!(view.zones, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(view.reserved_orders, vec!["ORD-1".to_string(), "ORD-2".to_string()]);
        assert_eq!(view.active_reservations, 2);
        assert!(!view.is_low_stock);
        assert!(!view.is_out_of_stock);

        projector.refresh(&stock);
        assert_eq!(projector.get(tenant, stock.sku()).unwrap(), view);
    }

    #[test]
    fn envelopes_stamp_activity_and_replays_are_ignored() {
        let projector = StockProjector::new(Store::default());
        let tenant = TenantId::new();
        let mut stock = item(tenant);
        projector.refresh(&stock);

        let later = t0() + Duration::hours(2);
        stock.receive_stock(receipt("A-01", "A", 30), later).unwrap();
        stock.reserve("ORD-1", "A-01", 5, later).unwrap();
        let envs = envelopes(&mut stock, 1);
        for env in &envs {
            projector.apply_envelope(env).unwrap();
        }
        let view = projector.get(tenant, stock.sku()).unwrap();
        assert_eq!(view.last_received_at, Some(later));
        assert_eq!(view.active_reservations, 1);
        assert_eq!(view.reserved_orders, vec!["ORD-1".to_string()]);

        for env in &envs {
            projector.apply_envelope(env).unwrap();
        }
        assert_eq!(projector.get(tenant, stock.sku()).unwrap(), view);

        // Snapshot refresh keeps the stamps.
        projector.refresh(&stock);
        assert_eq!(projector.get(tenant, stock.sku()).unwrap().last_received_at, Some(later));
    }

    #[test]
    fn envelope_for_another_item_is_rejected() {
        let projector = StockProjector::new(Store::default());
        let tenant = TenantId::new();
        let stock = item(tenant);
        projector.refresh(&stock);

        let mut impostor = item(tenant);
        impostor.receive_stock(receipt("A-01", "A", 1), t0()).unwrap();
        let envs = envelopes(&mut impostor, 1);

        let err = projector.apply_envelope(&envs[0]).unwrap_err();
        assert!(matches!(err, ProjectionError::TenantIsolation(_)));
    }

    #[test]
    fn envelope_without_view_is_reported() {
        let projector = StockProjector::new(Store::default());
        let mut stock = item(TenantId::new());
        stock.receive_stock(receipt("A-01", "A", 1), t0()).unwrap();
        let envs = envelopes(&mut stock, 1);

        assert_eq!(
            projector.apply_envelope(&envs[0]),
            Err(ProjectionError::MissingView(stock.sku().clone()))
        );
    }

    #[test]
    fn poisoned_cursor_lock_reports_unavailable() {
        let projector = StockProjector::new(Store::default());
        let mut stock = item(TenantId::new());
        projector.refresh(&stock);
        stock.receive_stock(receipt("A-01", "A", 1), t0()).unwrap();
        let envs = envelopes(&mut stock, 1);

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = projector.cursors.write().unwrap();
            panic!("writer died holding the cursor lock");
        }));

        assert_eq!(
            projector.apply_envelope(&envs[0]),
            Err(ProjectionError::Unavailable("cursor lock poisoned".to_string()))
        );
    }

    #[test]
    fn rebuild_replaces_only_the_given_tenant() {
        let projector = StockProjector::new(Store::default());
        let (a, b) = (TenantId::new(), TenantId::new());
        let mut stock_a = item(a);
        let stock_b = item(b);
        projector.refresh(&stock_a);
        projector.refresh(&stock_b);

        stock_a.receive_stock(receipt("A-01", "A", 12), t0()).unwrap();
        projector.rebuild(a, [&stock_a, &stock_b]);

        assert_eq!(projector.get(a, stock_a.sku()).unwrap().total_quantity, 12);
        assert_eq!(projector.list(a).len(), 1);
        assert_eq!(projector.list(b).len(), 1);
    }
}
