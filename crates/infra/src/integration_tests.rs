//! End-to-end tests: command → coordinator → stores → projector / publisher / ledger.
//!
//! Verifies:
//! - The warehouse flow from receipt to shipment keeps counters, records and
//!   views consistent
//! - Failed writes are compensated, and a failed compensation is surfaced
//! - Tenant isolation is preserved
//! - The valuation ledger shadows physical movements

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use stockflow_accounting::{AccountType, ValuationMethod};
    use stockflow_core::{AggregateRoot, Currency, Money, TenantId};
    use stockflow_events::{EventEnvelope, InMemoryPublisher};
    use stockflow_inventory::{
        AllocationRecord, AllocationStatus, ReservationRecord, ReservationStatus, Sku, StockFact,
        StockItem, StockScope,
    };

    use crate::commands::{
        AdjustStock, CreateItem, ExpireReservations, PackAllocation, PickStock, RecordShortage,
        ReceiveStock, ReleaseReservation, ReserveStock, ReturnToShelf, ShipAllocation,
        StageReservation,
    };
    use crate::config::EngineConfig;
    use crate::fact::EngineFact;
    use crate::read_model::InMemoryTenantStore;
    use crate::repository::faulty::FaultyStore;
    use crate::repository::{
        InMemoryLedgerEntryRepository, InMemoryLedgerRepository, InMemoryRecordStore,
        InMemoryStockRepository, RecordRepository, Repositories, ReservationRepository,
        StockRepository,
    };
    use crate::service::{ErrorKind, InventoryService, ServiceError};

    type Publisher = InMemoryPublisher<EventEnvelope<EngineFact>>;

    const LOC: &str = "LOC-1";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, 0).unwrap()
    }

    struct Harness {
        tenant: TenantId,
        sku: Sku,
        service: InventoryService<Publisher>,
        publisher: Arc<Publisher>,
        stock: Arc<FaultyStore<InMemoryStockRepository>>,
        reservations: Arc<FaultyStore<InMemoryRecordStore<ReservationRecord>>>,
        allocations: Arc<FaultyStore<InMemoryRecordStore<AllocationRecord>>>,
    }

    impl Harness {
        fn new(reorder_point: i64) -> Self {
            Self::with_config(reorder_point, EngineConfig::default())
        }

        fn with_config(reorder_point: i64, config: EngineConfig) -> Self {
            let stock = Arc::new(FaultyStore::new(InMemoryStockRepository::new()));
            let reservations = Arc::new(FaultyStore::new(InMemoryRecordStore::new()));
            let allocations = Arc::new(FaultyStore::new(InMemoryRecordStore::new()));
            let repos = Repositories {
                stock: stock.clone(),
                reservations: reservations.clone(),
                allocations: allocations.clone(),
                transactions: Arc::new(InMemoryRecordStore::new()),
            };
            let publisher = Arc::new(Publisher::new());
            let service = InventoryService::new(repos, Arc::new(InMemoryTenantStore::new()), publisher.clone(), config)
                .with_ledger(
                    Arc::new(InMemoryLedgerRepository::new()),
                    Arc::new(InMemoryLedgerEntryRepository::new()),
                );

            let tenant = TenantId::new();
            let sku = Sku::new("SKU-1").unwrap();
            service
                .create_item(CreateItem {
                    scope: StockScope::new(tenant, "FAC-1", "WH-1"),
                    sku: sku.clone(),
                    product_name: "Widget".into(),
                    reorder_point,
                    reorder_quantity: 50,
                    occurred_at: t0(),
                })
                .unwrap();

            Self { tenant, sku, service, publisher, stock, reservations, allocations }
        }

        fn item(&self) -> StockItem {
            self.stock.find_by_sku(self.tenant, &self.sku).unwrap().unwrap()
        }

        fn receive(&self, quantity: i64, unit_cost_minor: Option<i64>) {
            self.service
                .receive(ReceiveStock {
                    tenant_id: self.tenant,
                    sku: self.sku.clone(),
                    location_id: LOC.into(),
                    zone: "A".into(),
                    address: None,
                    quantity,
                    reference_id: "PO-1".into(),
                    received_by: "receiver".into(),
                    unit_cost_minor,
                    currency: None,
                    occurred_at: t0(),
                })
                .unwrap();
        }

        fn reserve_cmd(&self, order: &str, quantity: i64) -> ReserveStock {
            ReserveStock {
                tenant_id: self.tenant,
                sku: self.sku.clone(),
                order_id: order.into(),
                location_id: LOC.into(),
                quantity,
                reserved_by: "clerk".into(),
                occurred_at: t0() + Duration::minutes(1),
            }
        }

        fn reserve(&self, order: &str, quantity: i64) -> ReservationRecord {
            self.service.reserve(self.reserve_cmd(order, quantity)).unwrap()
        }

        fn stage(&self, reservation: &ReservationRecord) -> AllocationRecord {
            self.service
                .stage(StageReservation {
                    tenant_id: self.tenant,
                    sku: self.sku.clone(),
                    reservation_id: reservation.id,
                    staging_location_id: "STAGE-1".into(),
                    staged_by: "picker".into(),
                    occurred_at: t0() + Duration::minutes(10),
                })
                .unwrap()
        }

        fn pack(&self, allocation: &AllocationRecord) -> Result<AllocationRecord, ServiceError> {
            self.service.pack(PackAllocation {
                tenant_id: self.tenant,
                sku: self.sku.clone(),
                allocation_id: allocation.id,
                packed_by: "packer".into(),
                occurred_at: t0() + Duration::minutes(20),
            })
        }

        fn ship(&self, allocation: &AllocationRecord) -> Result<(), ServiceError> {
            self.service
                .ship(ShipAllocation {
                    tenant_id: self.tenant,
                    sku: self.sku.clone(),
                    allocation_id: allocation.id,
                    shipped_by: "dock".into(),
                    occurred_at: t0() + Duration::minutes(30),
                })
                .map(|_| ())
        }

        fn published_stock_facts(&self) -> Vec<StockFact> {
            self.publisher
                .published()
                .into_iter()
                .filter_map(|e| e.payload().as_stock().cloned())
                .collect()
        }
    }

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::USD).unwrap()
    }

    #[test]
    fn receipt_to_shipment_flow() {
        let h = Harness::new(5);

        // 1. receive
        h.receive(100, None);
        let item = h.item();
        assert_eq!(item.total_quantity(), 100);
        assert_eq!(item.available_quantity(), 100);

        // 2. reserve
        let reservation = h.reserve("ORD-1", 30);
        let item = h.item();
        assert_eq!(item.available_quantity(), 70);
        assert_eq!(item.reserved_quantity(), 30);
        assert_eq!(item.active_reservations().count(), 1);

        // 3. stage
        let allocation = h.stage(&reservation);
        let item = h.item();
        assert_eq!(item.reserved_quantity(), 0);
        assert_eq!(item.hard_allocated_quantity(), 30);
        assert_eq!(item.active_allocations().count(), 1);
        assert_eq!(allocation.status, AllocationStatus::Staged);

        // 4. pack, ship
        h.pack(&allocation).unwrap();
        h.ship(&allocation).unwrap();
        let item = h.item();
        assert_eq!(item.total_quantity(), 70);
        assert_eq!(item.hard_allocated_quantity(), 0);
        assert_eq!(item.available_quantity(), 70);
        assert!(item.check_invariants().is_ok());
        let record = h.reservations.find_by_id(h.tenant, &reservation.id).unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Fulfilled);
        let record = h.allocations.find_by_id(h.tenant, &allocation.id).unwrap().unwrap();
        assert_eq!(record.status, AllocationStatus::Shipped);

        let view = h.service.queries().summary(h.tenant, &h.sku).unwrap();
        assert_eq!(view.total_quantity, 70);
        assert_eq!(view.hard_allocated_quantity, 0);
        assert_eq!(view.active_reservations, 0);
        assert!(view.reserved_orders.is_empty());

        let types: Vec<String> = h.publisher.published().iter().map(|e| e.event_type().to_string()).collect();
        assert_eq!(
            types,
            vec![
                "inventory.received",
                "inventory.reserved",
                "inventory.staged",
                "inventory.packed",
                "inventory.shipped",
            ]
        );
    }

    #[test]
    fn shortage_writes_off_stock_and_reports_a_discrepancy() {
        let h = Harness::new(5);
        h.receive(70, None);

        // 5. receive 10 more, then count 4 where 10 were expected
        h.receive(10, None);
        let before = h.item().total_quantity();
        let outcome = h
            .service
            .record_shortage(RecordShortage {
                tenant_id: h.tenant,
                sku: h.sku.clone(),
                location_id: LOC.into(),
                order_id: "ORD-2".into(),
                expected_quantity: 10,
                actual_quantity: 4,
                reason: "miscount".into(),
                reported_by: "auditor".into(),
                occurred_at: t0() + Duration::hours(1),
            })
            .unwrap();

        assert_eq!(outcome.transaction.quantity, -6);
        assert_eq!(h.item().total_quantity(), before - 6);
        let facts = h.published_stock_facts();
        assert!(facts.iter().any(|f| matches!(f, StockFact::StockShortage(_))));
        assert!(facts.iter().any(|f| matches!(f, StockFact::InventoryDiscrepancy(_))));
        let view = h.service.queries().summary(h.tenant, &h.sku).unwrap();
        assert_eq!(view.last_shortage_at, Some(t0() + Duration::hours(1)));
        assert!(view.last_discrepancy_type.is_some());

        let err = h
            .service
            .record_shortage(RecordShortage {
                tenant_id: h.tenant,
                sku: h.sku.clone(),
                location_id: LOC.into(),
                order_id: "ORD-2".into(),
                expected_quantity: 4,
                actual_quantity: 4,
                reason: "recount".into(),
                reported_by: "auditor".into(),
                occurred_at: t0() + Duration::hours(2),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn low_stock_alert_fires_once_at_the_crossing() {
        let h = Harness::new(5);
        h.receive(70, None);
        let alerts = |h: &Harness| {
            h.published_stock_facts()
                .iter()
                .filter(|f| matches!(f, StockFact::LowStockAlert(_)))
                .count()
        };
        assert_eq!(alerts(&h), 0);

        h.reserve("ORD-1", 66);
        assert_eq!(h.item().available_quantity(), 4);
        assert_eq!(alerts(&h), 1);

        h.reserve("ORD-2", 1);
        assert_eq!(alerts(&h), 1);
        let view = h.service.queries().summary(h.tenant, &h.sku).unwrap();
        assert!(view.is_low_stock);
        assert!(!view.is_out_of_stock);
    }

    #[test]
    fn release_and_return_restore_counters() {
        let h = Harness::new(0);
        h.receive(50, None);

        h.reserve("ORD-1", 20);
        h.service
            .release_reservation(ReleaseReservation {
                tenant_id: h.tenant,
                sku: h.sku.clone(),
                order_id: "ORD-1".into(),
                released_by: "clerk".into(),
                reason: "customer cancelled".into(),
                occurred_at: t0() + Duration::minutes(2),
            })
            .unwrap();
        let item = h.item();
        assert_eq!((item.available_quantity(), item.reserved_quantity()), (50, 0));

        let reservation = h.reserve("ORD-2", 20);
        let allocation = h.stage(&reservation);
        h.service
            .return_to_shelf(ReturnToShelf {
                tenant_id: h.tenant,
                sku: h.sku.clone(),
                allocation_id: allocation.id,
                returned_by: "picker".into(),
                reason: "damaged tote".into(),
                occurred_at: t0() + Duration::minutes(15),
            })
            .unwrap();
        let item = h.item();
        assert_eq!((item.available_quantity(), item.hard_allocated_quantity()), (50, 0));
        let record = h.reservations.find_by_id(h.tenant, &reservation.id).unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Cancelled);
        let record = h.allocations.find_by_id(h.tenant, &allocation.id).unwrap().unwrap();
        assert_eq!(record.status, AllocationStatus::Returned);

        // The allocation is done: shipping it now is a status conflict.
        let err = h.ship(&allocation).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn out_of_order_lifecycle_steps_are_refused() {
        let h = Harness::new(0);
        h.receive(10, None);
        let reservation = h.reserve("ORD-1", 5);
        let allocation = h.stage(&reservation);

        let err = h.ship(&allocation).unwrap_err();
        assert!(matches!(err, ServiceError::Stock(_)));
        assert_eq!(h.item().hard_allocated_quantity(), 5);

        h.pack(&allocation).unwrap();
        assert_eq!(h.pack(&allocation).unwrap_err().kind(), ErrorKind::Conflict);
    }

    #[test]
    fn reserve_boundaries_leave_state_untouched() {
        let h = Harness::new(0);
        h.receive(10, None);

        let err = h.service.reserve(h.reserve_cmd("ORD-1", 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = h.service.reserve(h.reserve_cmd("ORD-1", 11)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let item = h.item();
        assert_eq!(item.available_quantity(), 10);
        assert_eq!(item.version(), 2);
        assert!(h.reservations.find_by_order(h.tenant, "ORD-1").unwrap().is_empty());
    }

    #[test]
    fn failed_reservation_record_is_compensated() {
        let h = Harness::new(0);
        h.receive(10, None);
        let published = h.publisher.published().len();

        h.reservations.fail_saves(0, 1);
        let err = h.service.reserve(h.reserve_cmd("ORD-1", 4)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(!matches!(err, ServiceError::Inconsistent { .. }));
        let item = h.item();
        assert_eq!(item.available_quantity(), 10);
        assert_eq!(item.reserved_quantity(), 0);
        assert_eq!(h.publisher.published().len(), published);
        let view = h.service.queries().summary(h.tenant, &h.sku).unwrap();
        assert_eq!(view.reserved_quantity, 0);

        // The store recovers; the same reservation now goes through.
        h.reserve("ORD-1", 4);
        assert_eq!(h.item().reserved_quantity(), 4);
    }

    #[test]
    fn failed_compensation_surfaces_as_inconsistent() {
        let h = Harness::new(0);
        h.receive(10, None);

        h.reservations.fail_saves(0, 1);
        h.stock.fail_saves(1, 1);
        let err = h.service.reserve(h.reserve_cmd("ORD-1", 4)).unwrap_err();

        assert!(matches!(err, ServiceError::Inconsistent { .. }));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        // The hold was persisted and could not be undone.
        assert_eq!(h.item().reserved_quantity(), 4);
    }

    #[test]
    fn expired_reservations_release_stock_and_records() {
        let h = Harness::new(0);
        h.receive(10, None);
        let reservation = h.reserve("ORD-1", 4);

        let expired = h
            .service
            .expire_reservations(ExpireReservations {
                tenant_id: h.tenant,
                sku: h.sku.clone(),
                occurred_at: reservation.expires_at + Duration::seconds(1),
            })
            .unwrap();

        assert_eq!(expired, vec![reservation.id]);
        assert_eq!(h.item().available_quantity(), 10);
        let record = h.reservations.find_by_id(h.tenant, &reservation.id).unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Expired);
        let view = h.service.queries().summary(h.tenant, &h.sku).unwrap();
        assert_eq!(view.active_reservations, 0);
    }

    #[test]
    fn tenants_do_not_see_each_other() {
        let h = Harness::new(0);
        h.receive(10, None);
        let other = TenantId::new();

        let mut cmd = h.reserve_cmd("ORD-1", 1);
        cmd.tenant_id = other;
        let err = h.service.reserve(cmd).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(h.service.queries().summary(other, &h.sku).is_none());
        assert_eq!(h.service.queries().count_by_status(other).total, 0);
        assert!(h.publisher.published().iter().all(|e| e.tenant_id() == h.tenant));
    }

    #[test]
    fn subscribers_see_facts_after_commit() {
        let h = Harness::new(0);
        let subscription = h.publisher.subscribe();

        h.receive(12, None);

        let received = subscription.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].tenant_id(), h.tenant);
        assert_eq!(received[0].aggregate_id(), h.item().id_typed().0);
        assert!(matches!(received[0].payload(), EngineFact::Stock(StockFact::Received(_))));
    }

    #[test]
    fn ledger_values_movements_fifo() {
        let h = Harness::new(0);
        h.receive(10, Some(250));
        h.receive(10, Some(300));
        h.reserve("ORD-1", 15);

        h.service
            .pick(PickStock {
                tenant_id: h.tenant,
                sku: h.sku.clone(),
                order_id: "ORD-1".into(),
                location_id: LOC.into(),
                quantity: 15,
                picked_by: "picker".into(),
                occurred_at: t0() + Duration::minutes(5),
            })
            .unwrap();

        let ledger = h.service.ledger().unwrap();
        let books = ledger.ledger(h.tenant, &h.sku).unwrap().unwrap();
        assert_eq!(books.method(), ValuationMethod::Fifo);
        assert_eq!(books.current_balance(), 5);
        assert_eq!(books.current_value(), usd(5 * 300));
        assert_eq!(books.account(AccountType::Cogs).quantity, 15);
        assert_eq!(books.current_balance(), h.item().total_quantity());

        let entries = ledger.entries(h.tenant, &h.sku).unwrap();
        assert_eq!(entries.len(), 6);
        let cogs = entries.iter().find(|e| e.account == AccountType::Cogs).unwrap();
        assert_eq!(cogs.value, usd(10 * 250 + 5 * 300));
        assert_eq!(ledger.transaction_entries(h.tenant, cogs.transaction_id).unwrap().len(), 2);

        let valuations = h
            .publisher
            .published()
            .iter()
            .filter(|e| matches!(e.payload(), EngineFact::Valuation(_)))
            .count();
        assert_eq!(valuations, 3);
    }

    #[test]
    fn ledger_follows_shipments_and_adjustments() {
        let h = Harness::new(0);
        h.receive(20, Some(100));
        let reservation = h.reserve("ORD-1", 5);
        let allocation = h.stage(&reservation);
        h.pack(&allocation).unwrap();
        h.ship(&allocation).unwrap();

        h.service
            .adjust(AdjustStock {
                tenant_id: h.tenant,
                sku: h.sku.clone(),
                location_id: LOC.into(),
                new_quantity: 12,
                reason: "cycle count".into(),
                adjusted_by: "lead".into(),
                occurred_at: t0() + Duration::hours(1),
            })
            .unwrap();

        let books = h.service.ledger().unwrap().ledger(h.tenant, &h.sku).unwrap().unwrap();
        assert_eq!(h.item().total_quantity(), 12);
        assert_eq!(books.current_balance(), 12);
        assert_eq!(books.current_value(), usd(1_200));
        assert_eq!(books.account(AccountType::Cogs).quantity, 5);
        assert_eq!(books.account(AccountType::Adjustments).quantity, 3);
    }

    #[test]
    fn unvalued_items_skip_the_ledger() {
        let h = Harness::new(0);
        h.receive(10, None);
        h.service
            .adjust(AdjustStock {
                tenant_id: h.tenant,
                sku: h.sku.clone(),
                location_id: LOC.into(),
                new_quantity: 8,
                reason: "damage".into(),
                adjusted_by: "lead".into(),
                occurred_at: t0(),
            })
            .unwrap();

        assert_eq!(h.item().total_quantity(), 8);
        assert!(h.service.ledger().unwrap().ledger(h.tenant, &h.sku).unwrap().is_none());
    }

    #[test]
    fn disabled_ledger_is_not_attached() {
        let config = EngineConfig { ledger_enabled: false, ..EngineConfig::default() };
        let h = Harness::with_config(0, config);
        h.receive(10, Some(100));
        assert!(h.service.ledger().is_none());
        assert_eq!(h.item().total_quantity(), 10);
    }

    #[test]
    fn rebuilt_views_match_the_stores() {
        let h = Harness::new(0);
        h.receive(10, None);
        h.reserve("ORD-1", 3);
        h.service.projector().remove(h.tenant, &h.sku);
        assert!(h.service.queries().summary(h.tenant, &h.sku).is_none());

        assert_eq!(h.service.rebuild_views(h.tenant).unwrap(), 1);

        let view = h.service.queries().summary(h.tenant, &h.sku).unwrap();
        assert_eq!(view.available_quantity, 7);
        assert_eq!(view.active_reservations, 1);
    }
}
