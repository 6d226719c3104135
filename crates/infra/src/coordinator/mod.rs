//! Multi-record writes for one logical stock operation.
//!
//! The stock aggregate is always written first; satellite records follow.
//! There is no transaction spanning the writes, so every operation is an
//! ordered list of [`Step`]s and a failure part-way runs the compensations of
//! the steps already applied. Audit records (transactions) and follow-up
//! record updates on pick, adjust and shortage are best-effort: a failure is
//! logged and the operation still succeeds. Records left behind by a failed
//! compensation or a crash between writes are repaired by
//! [`Coordinator::reconcile`].

mod compensator;

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use stockflow_core::{AggregateRoot, Entity, ExpectedVersion, TenantId};
use stockflow_events::TenantScoped;
use stockflow_inventory::{
    AllocationRecord, InventoryTransaction, PickOutcome, ReservationId, ReservationRecord,
    ShortageOutcome, ShortageReport, Sku, StockError, StockItem, StockReceipt, TransactionRecord,
};

use crate::commands::{
    AdjustStock, ExpireReservations, PackAllocation, PickStock, RecordShortage, ReceiveStock,
    ReleaseReservation, ReserveStock, ReturnToShelf, ShipAllocation, StageReservation,
};
use crate::repository::{RecordRepository, Repositories, RepositoryError};

pub use compensator::{Compensator, Step};

pub const SAVE_STOCK: &str = "save stock item";
pub const SAVE_RESERVATION: &str = "save reservation record";
pub const SAVE_ALLOCATION: &str = "save allocation record";

/// Failure of a single forward or compensating write.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Rejected by the aggregate or a record before anything was written.
    #[error(transparent)]
    Stock(#[from] StockError),

    /// A read failed before anything was written.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("stock item {0} not found")]
    ItemNotFound(Sku),

    /// A write failed; earlier writes were compensated.
    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        source: StepError,
    },

    /// A write failed and undoing an earlier write failed too.
    #[error("{step} failed ({source}) and compensating {compensation_step} failed: {compensation}")]
    Inconsistent {
        step: &'static str,
        source: StepError,
        compensation_step: &'static str,
        compensation: StepError,
    },
}

impl CoordinatorError {
    /// Lost an optimistic-concurrency race on the aggregate; nothing was kept.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Step {
                step: SAVE_STOCK,
                source: StepError::Repository(RepositoryError::Concurrency(_)),
            }
        )
    }
}

/// Aggregate after a committed operation, with its pending facts, plus the
/// operation's result.
#[derive(Debug)]
pub struct Committed<T> {
    pub item: StockItem,
    pub result: T,
}

pub struct Coordinator {
    repos: Repositories,
}

impl Coordinator {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn load(&self, tenant_id: TenantId, sku: &Sku) -> Result<StockItem, CoordinatorError> {
        self.repos
            .stock
            .find_by_sku(tenant_id, sku)?
            .ok_or_else(|| CoordinatorError::ItemNotFound(sku.clone()))
    }

    /// Persist a new aggregate.
    pub fn create(&self, item: StockItem) -> Result<StockItem, CoordinatorError> {
        let item = RefCell::new(item);
        Compensator::new()
            .step(Step::new(SAVE_STOCK, || self.save_item(&item)))
            .run()?;
        Ok(item.into_inner())
    }

    /// Load, mutate and save the aggregate alone.
    pub fn update<T>(
        &self,
        tenant_id: TenantId,
        sku: &Sku,
        mutate: impl FnOnce(&mut StockItem) -> Result<T, StockError>,
    ) -> Result<Committed<T>, CoordinatorError> {
        let mut item = self.load(tenant_id, sku)?;
        let result = mutate(&mut item)?;
        let item = self.commit_item(item)?;
        Ok(Committed { item, result })
    }

    pub fn receive(&self, cmd: &ReceiveStock) -> Result<Committed<InventoryTransaction>, CoordinatorError> {
        let Committed { item, result: tx } = self.update(cmd.tenant_id, &cmd.sku, |item| {
            item.receive_stock(
                StockReceipt {
                    location_id: cmd.location_id.clone(),
                    zone: cmd.zone.clone(),
                    address: cmd.address.clone(),
                    quantity: cmd.quantity,
                    reference_id: cmd.reference_id.clone(),
                    received_by: cmd.received_by.clone(),
                },
                cmd.occurred_at,
            )
        })?;
        self.record_transaction(&item, &tx);
        Ok(Committed { item, result: tx })
    }

    pub fn reserve(&self, cmd: &ReserveStock) -> Result<Committed<ReservationRecord>, CoordinatorError> {
        let now = cmd.occurred_at;
        let mut item = self.load(cmd.tenant_id, &cmd.sku)?;
        let id = item.reserve(&cmd.order_id, &cmd.location_id, cmd.quantity, now)?;
        let embedded = item.reservation(id).ok_or(StockError::ReservationNotFound)?;
        let record = RefCell::new(ReservationRecord::from_embedded(
            item.scope().clone(),
            item.sku().clone(),
            embedded,
            cmd.reserved_by.clone(),
        ));

        let item = RefCell::new(item);
        Compensator::new()
            .step(Step::new(SAVE_STOCK, || self.save_item(&item)).compensate_with(|| {
                item.borrow_mut().release_reservation_by_id(id, now)?;
                self.save_item(&item)
            }))
            .step(Step::new(SAVE_RESERVATION, || save_record(&*self.repos.reservations, &record)))
            .run()?;

        Ok(Committed { item: item.into_inner(), result: record.into_inner() })
    }

    pub fn pick(&self, cmd: &PickStock) -> Result<Committed<PickOutcome>, CoordinatorError> {
        let now = cmd.occurred_at;
        let committed = self.update(cmd.tenant_id, &cmd.sku, |item| {
            item.pick(&cmd.order_id, &cmd.location_id, cmd.quantity, &cmd.picked_by, now)
        })?;

        self.record_transaction(&committed.item, &committed.result.transaction);
        let remaining = committed.result.remaining;
        self.touch_reservation(cmd.tenant_id, committed.result.reservation_id, |record| {
            record.record_pick(remaining, now)
        });
        Ok(committed)
    }

    pub fn cancel_reservation(&self, cmd: &ReleaseReservation) -> Result<Committed<ReservationId>, CoordinatorError> {
        let now = cmd.occurred_at;
        let mut item = self.load(cmd.tenant_id, &cmd.sku)?;
        let before = item.clone();
        let id = item.release_reservation(&cmd.order_id, now)?;
        let record = self.reservation_record(cmd.tenant_id, id)?;
        record.borrow_mut().cancel(cmd.released_by.clone(), cmd.reason.clone(), now)?;

        let item = RefCell::new(item);
        Compensator::new()
            .step(
                Step::new(SAVE_STOCK, || self.save_item(&item))
                    .compensate_with(|| self.restore_item(&item, &before)),
            )
            .step(Step::new(SAVE_RESERVATION, || save_record(&*self.repos.reservations, &record)))
            .run()?;

        Ok(Committed { item: item.into_inner(), result: id })
    }

    pub fn expire_reservations(&self, cmd: &ExpireReservations) -> Result<Committed<Vec<ReservationId>>, CoordinatorError> {
        let now = cmd.occurred_at;
        let mut item = self.load(cmd.tenant_id, &cmd.sku)?;
        let expired = item.expire_reservations(now);
        if expired.is_empty() {
            return Ok(Committed { item, result: expired });
        }

        let item = self.commit_item(item)?;
        for id in &expired {
            self.touch_reservation(cmd.tenant_id, *id, |record| record.mark_expired(now));
        }
        Ok(Committed { item, result: expired })
    }

    pub fn stage(&self, cmd: &StageReservation) -> Result<Committed<AllocationRecord>, CoordinatorError> {
        let now = cmd.occurred_at;
        let mut item = self.load(cmd.tenant_id, &cmd.sku)?;
        let reservation = self.reservation_record(cmd.tenant_id, cmd.reservation_id)?;

        let allocation_id = item.stage(cmd.reservation_id, &cmd.staging_location_id, &cmd.staged_by, now)?;
        reservation.borrow_mut().mark_staged(cmd.staged_by.clone(), now)?;
        let embedded = item.allocation(allocation_id).ok_or(StockError::AllocationNotFound)?;
        let allocation = RefCell::new(AllocationRecord::from_embedded(
            item.scope().clone(),
            item.sku().clone(),
            embedded,
        ));

        let item = RefCell::new(item);
        Compensator::new()
            .step(Step::new(SAVE_STOCK, || self.save_item(&item)).compensate_with(|| {
                item.borrow_mut().undo_stage(allocation_id, now)?;
                self.save_item(&item)
            }))
            .step(
                Step::new(SAVE_RESERVATION, || save_record(&*self.repos.reservations, &reservation))
                    .compensate_with(|| {
                        reservation.borrow_mut().revert_staged(now)?;
                        save_record(&*self.repos.reservations, &reservation)
                    }),
            )
            .step(Step::new(SAVE_ALLOCATION, || save_record(&*self.repos.allocations, &allocation)))
            .run()?;

        Ok(Committed { item: item.into_inner(), result: allocation.into_inner() })
    }

    pub fn pack(&self, cmd: &PackAllocation) -> Result<Committed<AllocationRecord>, CoordinatorError> {
        let now = cmd.occurred_at;
        let mut item = self.load(cmd.tenant_id, &cmd.sku)?;
        let before = item.clone();
        let allocation = self.allocation_record(cmd.tenant_id, cmd.allocation_id)?;

        item.pack(cmd.allocation_id, &cmd.packed_by, now)?;
        allocation.borrow_mut().mark_packed(cmd.packed_by.clone(), now)?;

        let item = RefCell::new(item);
        Compensator::new()
            .step(
                Step::new(SAVE_STOCK, || self.save_item(&item))
                    .compensate_with(|| self.restore_item(&item, &before)),
            )
            .step(Step::new(SAVE_ALLOCATION, || save_record(&*self.repos.allocations, &allocation)))
            .run()?;

        Ok(Committed { item: item.into_inner(), result: allocation.into_inner() })
    }

    pub fn ship(&self, cmd: &ShipAllocation) -> Result<Committed<InventoryTransaction>, CoordinatorError> {
        let now = cmd.occurred_at;
        let mut item = self.load(cmd.tenant_id, &cmd.sku)?;
        let before = item.clone();
        let allocation = self.allocation_record(cmd.tenant_id, cmd.allocation_id)?;
        let allocation_before = allocation.borrow().clone();
        let reservation = self.reservation_record(cmd.tenant_id, allocation.borrow().reservation_id)?;

        let tx = item.ship(cmd.allocation_id, &cmd.shipped_by, now)?;
        allocation.borrow_mut().mark_shipped(cmd.shipped_by.clone(), now)?;
        reservation.borrow_mut().mark_fulfilled(now)?;

        let item = RefCell::new(item);
        Compensator::new()
            .step(
                Step::new(SAVE_STOCK, || self.save_item(&item))
                    .compensate_with(|| self.restore_item(&item, &before)),
            )
            .step(
                Step::new(SAVE_ALLOCATION, || save_record(&*self.repos.allocations, &allocation))
                    .compensate_with(|| restore_record(&*self.repos.allocations, &allocation, &allocation_before)),
            )
            .step(Step::new(SAVE_RESERVATION, || save_record(&*self.repos.reservations, &reservation)))
            .run()?;

        let item = item.into_inner();
        self.record_transaction(&item, &tx);
        Ok(Committed { item, result: tx })
    }

    pub fn return_to_shelf(&self, cmd: &ReturnToShelf) -> Result<Committed<InventoryTransaction>, CoordinatorError> {
        let now = cmd.occurred_at;
        let mut item = self.load(cmd.tenant_id, &cmd.sku)?;
        let before = item.clone();
        let allocation = self.allocation_record(cmd.tenant_id, cmd.allocation_id)?;
        let allocation_before = allocation.borrow().clone();
        let reservation = self.reservation_record(cmd.tenant_id, allocation.borrow().reservation_id)?;

        let tx = item.return_to_shelf(cmd.allocation_id, &cmd.returned_by, &cmd.reason, now)?;
        allocation
            .borrow_mut()
            .return_to_shelf(cmd.returned_by.clone(), cmd.reason.clone(), now)?;
        reservation.borrow_mut().cancel(cmd.returned_by.clone(), cmd.reason.clone(), now)?;

        let item = RefCell::new(item);
        Compensator::new()
            .step(
                Step::new(SAVE_STOCK, || self.save_item(&item))
                    .compensate_with(|| self.restore_item(&item, &before)),
            )
            .step(
                Step::new(SAVE_ALLOCATION, || save_record(&*self.repos.allocations, &allocation))
                    .compensate_with(|| restore_record(&*self.repos.allocations, &allocation, &allocation_before)),
            )
            .step(Step::new(SAVE_RESERVATION, || save_record(&*self.repos.reservations, &reservation)))
            .run()?;

        let item = item.into_inner();
        self.record_transaction(&item, &tx);
        Ok(Committed { item, result: tx })
    }

    pub fn adjust(&self, cmd: &AdjustStock) -> Result<Committed<Option<InventoryTransaction>>, CoordinatorError> {
        let committed = self.update(cmd.tenant_id, &cmd.sku, |item| {
            item.adjust(&cmd.location_id, cmd.new_quantity, &cmd.reason, &cmd.adjusted_by, cmd.occurred_at)
        })?;
        if let Some(tx) = &committed.result {
            self.record_transaction(&committed.item, tx);
        }
        Ok(committed)
    }

    pub fn record_shortage(&self, cmd: &RecordShortage) -> Result<Committed<ShortageOutcome>, CoordinatorError> {
        let now = cmd.occurred_at;
        let committed = self.update(cmd.tenant_id, &cmd.sku, |item| {
            item.record_shortage(
                ShortageReport {
                    location_id: cmd.location_id.clone(),
                    order_id: cmd.order_id.clone(),
                    expected_quantity: cmd.expected_quantity,
                    actual_quantity: cmd.actual_quantity,
                    reason: cmd.reason.clone(),
                    reported_by: cmd.reported_by.clone(),
                },
                now,
            )
        })?;

        self.record_transaction(&committed.item, &committed.result.transaction);
        for write_off in &committed.result.affected_reservations {
            self.touch_reservation(cmd.tenant_id, write_off.reservation_id, |record| {
                record.apply_write_off(write_off.remaining, now)
            });
        }
        Ok(committed)
    }

    /// Align satellite records with the aggregate's embedded copies.
    ///
    /// Repairs what a failed write without compensation left behind. Only
    /// lifecycle fields are copied; records the aggregate no longer holds
    /// (compacted history) are left alone. Returns the number of records
    /// rewritten.
    pub fn reconcile(&self, tenant_id: TenantId, sku: &Sku, now: DateTime<Utc>) -> Result<usize, CoordinatorError> {
        let item = self.load(tenant_id, sku)?;
        let mut repaired = 0;

        for embedded in item.reservations() {
            let Some(mut record) = self.repos.reservations.find_by_id(tenant_id, &embedded.id)? else {
                continue;
            };
            if record.status == embedded.status && record.quantity == embedded.quantity {
                continue;
            }
            record.status = embedded.status;
            record.quantity = embedded.quantity;
            record.expires_at = embedded.expires_at;
            record.updated_at = now;
            self.repos
                .reservations
                .save(&record, ExpectedVersion::from_loaded(record.version()))?;
            repaired += 1;
        }

        for embedded in item.allocations() {
            let Some(mut record) = self.repos.allocations.find_by_id(tenant_id, &embedded.id)? else {
                continue;
            };
            if record.status == embedded.status {
                continue;
            }
            record.status = embedded.status;
            record.packed_by = embedded.packed_by.clone();
            record.packed_at = embedded.packed_at;
            record.shipped_at = embedded.shipped_at;
            record.returned_at = embedded.returned_at;
            record.updated_at = now;
            self.repos
                .allocations
                .save(&record, ExpectedVersion::from_loaded(record.version()))?;
            repaired += 1;
        }

        if repaired > 0 {
            warn!(sku = %sku, repaired, "satellite records reconciled");
        }
        Ok(repaired)
    }

    fn commit_item(&self, item: StockItem) -> Result<StockItem, CoordinatorError> {
        let item = RefCell::new(item);
        Compensator::new()
            .step(Step::new(SAVE_STOCK, || self.save_item(&item)))
            .run()?;
        Ok(item.into_inner())
    }

    fn save_item(&self, item: &RefCell<StockItem>) -> Result<(), StepError> {
        let expected = ExpectedVersion::from_loaded(item.borrow().version());
        let version = self.repos.stock.save(&item.borrow(), expected)?;
        item.borrow_mut().set_version(version);
        Ok(())
    }

    /// Compensation: put the aggregate back as it was loaded and save it
    /// over the forward write.
    fn restore_item(&self, item: &RefCell<StockItem>, before: &StockItem) -> Result<(), StepError> {
        let mut restored = before.clone();
        restored.set_version(item.borrow().version());
        *item.borrow_mut() = restored;
        self.save_item(item)
    }

    fn reservation_record(
        &self,
        tenant_id: TenantId,
        id: ReservationId,
    ) -> Result<RefCell<ReservationRecord>, CoordinatorError> {
        let record = self
            .repos
            .reservations
            .find_by_id(tenant_id, &id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(RefCell::new(record))
    }

    fn allocation_record(
        &self,
        tenant_id: TenantId,
        id: stockflow_inventory::AllocationId,
    ) -> Result<RefCell<AllocationRecord>, CoordinatorError> {
        let record = self
            .repos
            .allocations
            .find_by_id(tenant_id, &id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(RefCell::new(record))
    }

    /// Best-effort audit copy of a transaction.
    fn record_transaction(&self, item: &StockItem, tx: &InventoryTransaction) {
        let record = TransactionRecord::new(item.scope().clone(), item.sku().clone(), tx.clone());
        if let Err(e) = self.repos.transactions.save(&record, ExpectedVersion::NoRecord) {
            warn!(sku = %item.sku(), transaction_id = %tx.id, error = %e, "transaction record not saved");
        }
    }

    /// Best-effort follow-up on a reservation record.
    fn touch_reservation(
        &self,
        tenant_id: TenantId,
        id: ReservationId,
        change: impl FnOnce(&mut ReservationRecord) -> Result<(), StockError>,
    ) {
        let outcome = self
            .reservation_record(tenant_id, id)
            .and_then(|record| {
                change(&mut record.borrow_mut())?;
                save_record(&*self.repos.reservations, &record).map_err(|e| CoordinatorError::Step {
                    step: SAVE_RESERVATION,
                    source: e,
                })
            });
        if let Err(e) = outcome {
            warn!(reservation_id = %id, error = %e, "reservation record not updated; left for reconciliation");
        }
    }
}

fn save_record<R>(store: &dyn RecordRepository<R>, record: &RefCell<R>) -> Result<(), StepError>
where
    R: Entity + TenantScoped,
{
    let expected = ExpectedVersion::from_loaded(record.borrow().version());
    let version = store.save(&record.borrow(), expected)?;
    record.borrow_mut().set_version(version);
    Ok(())
}

/// Compensation: save the record's loaded state over the forward write.
fn restore_record<R>(store: &dyn RecordRepository<R>, record: &RefCell<R>, before: &R) -> Result<(), StepError>
where
    R: Entity + TenantScoped + Clone,
{
    let mut restored = before.clone();
    restored.set_version(record.borrow().version());
    *record.borrow_mut() = restored;
    save_record(store, record)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use stockflow_inventory::{AllocationId, AllocationStatus, ReservationStatus, StockScope};

    use super::*;
    use crate::repository::faulty::FaultyStore;
    use crate::repository::{
        AllocationRepository, InMemoryRecordStore, InMemoryStockRepository, StockRepository,
        TransactionRepository,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 9, 0, 0).unwrap()
    }

    struct Fixture {
        tenant: TenantId,
        sku: Sku,
        stock: Arc<FaultyStore<InMemoryStockRepository>>,
        reservations: Arc<FaultyStore<InMemoryRecordStore<ReservationRecord>>>,
        allocations: Arc<FaultyStore<InMemoryRecordStore<AllocationRecord>>>,
        coordinator: Coordinator,
    }

    fn fixture(on_hand: i64) -> Fixture {
        let stock = Arc::new(FaultyStore::new(InMemoryStockRepository::new()));
        let reservations = Arc::new(FaultyStore::new(InMemoryRecordStore::new()));
        let allocations = Arc::new(FaultyStore::new(InMemoryRecordStore::new()));
        let repos = Repositories {
            stock: stock.clone(),
            reservations: reservations.clone(),
            allocations: allocations.clone(),
            transactions: Arc::new(InMemoryRecordStore::new()),
        };
        let tenant = TenantId::new();
        let sku = Sku::new("SKU-COORD").unwrap();
        let coordinator = Coordinator::new(repos);
        let item = StockItem::create(StockScope::new(tenant, "FAC-1", "WH-1"), sku.clone(), "Coordinated", 2, 10, t0())
            .unwrap();
        coordinator.create(item).unwrap();
        if on_hand > 0 {
            coordinator
                .receive(&ReceiveStock {
                    tenant_id: tenant,
                    sku: sku.clone(),
                    location_id: "A-01".into(),
                    zone: "A".into(),
                    address: None,
                    quantity: on_hand,
                    reference_id: "PO-1".into(),
                    received_by: "receiver".into(),
                    unit_cost_minor: None,
                    currency: None,
                    occurred_at: t0(),
                })
                .unwrap();
        }
        Fixture { tenant, sku, stock, reservations, allocations, coordinator }
    }

    fn reserve_cmd(f: &Fixture, order: &str, quantity: i64) -> ReserveStock {
        ReserveStock {
            tenant_id: f.tenant,
            sku: f.sku.clone(),
            order_id: order.into(),
            location_id: "A-01".into(),
            quantity,
            reserved_by: "clerk".into(),
            occurred_at: t0(),
        }
    }

    fn stage_cmd(f: &Fixture, reservation_id: ReservationId) -> StageReservation {
        StageReservation {
            tenant_id: f.tenant,
            sku: f.sku.clone(),
            reservation_id,
            staging_location_id: "STAGE-1".into(),
            staged_by: "picker".into(),
            occurred_at: t0() + Duration::minutes(5),
        }
    }

    fn pack_cmd(f: &Fixture, allocation_id: AllocationId) -> PackAllocation {
        PackAllocation {
            tenant_id: f.tenant,
            sku: f.sku.clone(),
            allocation_id,
            packed_by: "packer".into(),
            occurred_at: t0() + Duration::minutes(10),
        }
    }

    fn ship_cmd(f: &Fixture, allocation_id: AllocationId) -> ShipAllocation {
        ShipAllocation {
            tenant_id: f.tenant,
            sku: f.sku.clone(),
            allocation_id,
            shipped_by: "dock".into(),
            occurred_at: t0() + Duration::minutes(20),
        }
    }

    fn release_cmd(f: &Fixture, order: &str) -> ReleaseReservation {
        ReleaseReservation {
            tenant_id: f.tenant,
            sku: f.sku.clone(),
            order_id: order.into(),
            released_by: "clerk".into(),
            reason: "customer cancelled".into(),
            occurred_at: t0(),
        }
    }

    /// Reserve and stage 10 units for ORD-1.
    fn staged(f: &Fixture) -> (ReservationRecord, AllocationRecord) {
        let reserved = f.coordinator.reserve(&reserve_cmd(f, "ORD-1", 10)).unwrap().result;
        let allocation = f.coordinator.stage(&stage_cmd(f, reserved.id)).unwrap().result;
        (reserved, allocation)
    }

    fn stored(f: &Fixture) -> StockItem {
        f.stock.find_by_sku(f.tenant, &f.sku).unwrap().unwrap()
    }

    #[test]
    fn reserve_writes_aggregate_then_record() {
        let f = fixture(50);
        let committed = f.coordinator.reserve(&reserve_cmd(&f, "ORD-1", 10)).unwrap();

        assert_eq!(committed.result.status, ReservationStatus::Active);
        assert_eq!(committed.result.version(), 1);
        assert_eq!(stored(&f).reserved_quantity(), 10);
        assert_eq!(committed.item.version(), stored(&f).version());
        assert!(f.reservations.find_by_id(f.tenant, &committed.result.id).unwrap().is_some());
    }

    #[test]
    fn failed_reservation_record_releases_the_hold() {
        let f = fixture(50);
        f.reservations.fail_saves(0, 1);

        let err = f.coordinator.reserve(&reserve_cmd(&f, "ORD-1", 10)).unwrap_err();

        assert!(matches!(err, CoordinatorError::Step { step: SAVE_RESERVATION, .. }));
        let item = stored(&f);
        assert_eq!(item.reserved_quantity(), 0);
        assert_eq!(item.available_quantity(), 50);
        assert!(item.check_invariants().is_ok());
    }

    #[test]
    fn failed_compensation_is_reported_as_inconsistent() {
        let f = fixture(50);
        f.reservations.fail_saves(0, 1);
        // The reserve save passes, the compensating re-save fails.
        f.stock.fail_saves(1, 1);

        let err = f.coordinator.reserve(&reserve_cmd(&f, "ORD-1", 10)).unwrap_err();

        match err {
            CoordinatorError::Inconsistent { step, compensation_step, source, .. } => {
                assert_eq!(step, SAVE_RESERVATION);
                assert_eq!(compensation_step, SAVE_STOCK);
                assert!(matches!(source, StepError::Repository(RepositoryError::Unavailable(_))));
            }
            other => panic!("expected inconsistency, got {other:?}"),
        }
        assert_eq!(stored(&f).reserved_quantity(), 10);
    }

    #[test]
    fn failed_allocation_record_unwinds_stage() {
        let f = fixture(50);
        let reserved = f.coordinator.reserve(&reserve_cmd(&f, "ORD-1", 10)).unwrap().result;
        f.allocations.fail_saves(0, 1);

        let err = f.coordinator.stage(&stage_cmd(&f, reserved.id)).unwrap_err();

        assert!(matches!(err, CoordinatorError::Step { step: SAVE_ALLOCATION, .. }));
        let item = stored(&f);
        assert_eq!(item.hard_allocated_quantity(), 0);
        assert_eq!(item.reserved_quantity(), 10);
        assert_eq!(item.reservation(reserved.id).unwrap().status, ReservationStatus::Active);
        let record = f.reservations.find_by_id(f.tenant, &reserved.id).unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Active);
        assert!(f.allocations.find_by_order(f.tenant, "ORD-1").unwrap().is_empty());

        // The unwound reservation can be staged again.
        f.coordinator.stage(&stage_cmd(&f, reserved.id)).unwrap();
        assert_eq!(stored(&f).hard_allocated_quantity(), 10);
    }

    #[test]
    fn stale_aggregate_save_is_retryable() {
        let f = fixture(50);
        let mut stale = stored(&f);
        f.coordinator.reserve(&reserve_cmd(&f, "ORD-1", 5)).unwrap();

        stale.reserve("ORD-2", "A-01", 5, t0()).unwrap();
        let err = f.coordinator.commit_item(stale).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn ship_path_updates_every_record() {
        let f = fixture(50);
        let reserved = f.coordinator.reserve(&reserve_cmd(&f, "ORD-1", 10)).unwrap().result;
        let allocation = f.coordinator.stage(&stage_cmd(&f, reserved.id)).unwrap().result;
        f.coordinator
            .pack(&PackAllocation {
                tenant_id: f.tenant,
                sku: f.sku.clone(),
                allocation_id: allocation.id,
                packed_by: "packer".into(),
                occurred_at: t0() + Duration::minutes(10),
            })
            .unwrap();
        let shipped = f
            .coordinator
            .ship(&ShipAllocation {
                tenant_id: f.tenant,
                sku: f.sku.clone(),
                allocation_id: allocation.id,
                shipped_by: "dock".into(),
                occurred_at: t0() + Duration::minutes(20),
            })
            .unwrap();

        assert_eq!(shipped.result.quantity, -10);
        assert_eq!(stored(&f).total_quantity(), 40);
        let allocation = f.allocations.find_by_id(f.tenant, &allocation.id).unwrap().unwrap();
        assert_eq!(allocation.status, AllocationStatus::Shipped);
        assert_eq!(allocation.shipped_by.as_deref(), Some("dock"));
        let reservation = f.reservations.find_by_id(f.tenant, &reserved.id).unwrap().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Fulfilled);
        // receive + ship
        let txs = f.coordinator.repositories().transactions.find_by_sku(f.tenant, &f.sku).unwrap();
        assert_eq!(txs.len(), 2);
    }

    #[test]
    fn failed_allocation_record_unwinds_pack() {
        let f = fixture(50);
        let (_, allocation) = staged(&f);
        f.allocations.fail_saves(0, 1);

        let err = f.coordinator.pack(&pack_cmd(&f, allocation.id)).unwrap_err();

        assert!(matches!(err, CoordinatorError::Step { step: SAVE_ALLOCATION, .. }));
        let item = stored(&f);
        assert_eq!(item.allocation(allocation.id).unwrap().status, AllocationStatus::Staged);
        let record = f.allocations.find_by_id(f.tenant, &allocation.id).unwrap().unwrap();
        assert_eq!(record.status, AllocationStatus::Staged);

        f.coordinator.pack(&pack_cmd(&f, allocation.id)).unwrap();
        f.coordinator.ship(&ship_cmd(&f, allocation.id)).unwrap();
        assert_eq!(stored(&f).total_quantity(), 40);
    }

    #[test]
    fn failed_allocation_record_unwinds_ship() {
        let f = fixture(50);
        let (reserved, allocation) = staged(&f);
        f.coordinator.pack(&pack_cmd(&f, allocation.id)).unwrap();
        f.allocations.fail_saves(0, 1);

        let err = f.coordinator.ship(&ship_cmd(&f, allocation.id)).unwrap_err();

        assert!(matches!(err, CoordinatorError::Step { step: SAVE_ALLOCATION, .. }));
        let item = stored(&f);
        assert_eq!(item.total_quantity(), 50);
        assert_eq!(item.hard_allocated_quantity(), 10);
        assert_eq!(item.allocation(allocation.id).unwrap().status, AllocationStatus::Packed);
        assert!(item.check_invariants().is_ok());
        let record = f.reservations.find_by_id(f.tenant, &reserved.id).unwrap().unwrap();
        assert_ne!(record.status, ReservationStatus::Fulfilled);

        f.coordinator.ship(&ship_cmd(&f, allocation.id)).unwrap();
        assert_eq!(stored(&f).total_quantity(), 40);
    }

    #[test]
    fn failed_reservation_record_unwinds_ship() {
        let f = fixture(50);
        let (_, allocation) = staged(&f);
        f.coordinator.pack(&pack_cmd(&f, allocation.id)).unwrap();
        f.reservations.fail_saves(0, 1);

        let err = f.coordinator.ship(&ship_cmd(&f, allocation.id)).unwrap_err();

        assert!(matches!(err, CoordinatorError::Step { step: SAVE_RESERVATION, .. }));
        assert_eq!(stored(&f).total_quantity(), 50);
        let record = f.allocations.find_by_id(f.tenant, &allocation.id).unwrap().unwrap();
        assert_eq!(record.status, AllocationStatus::Packed);
        assert!(record.shipped_by.is_none());
        // receive only
        let txs = f.coordinator.repositories().transactions.find_by_sku(f.tenant, &f.sku).unwrap();
        assert_eq!(txs.len(), 1);

        f.coordinator.ship(&ship_cmd(&f, allocation.id)).unwrap();
        let record = f.allocations.find_by_id(f.tenant, &allocation.id).unwrap().unwrap();
        assert_eq!(record.status, AllocationStatus::Shipped);
    }

    #[test]
    fn failed_reservation_record_unwinds_return() {
        let f = fixture(50);
        let (reserved, allocation) = staged(&f);
        f.reservations.fail_saves(0, 1);
        let cmd = ReturnToShelf {
            tenant_id: f.tenant,
            sku: f.sku.clone(),
            allocation_id: allocation.id,
            returned_by: "picker".into(),
            reason: "wrong bin".into(),
            occurred_at: t0() + Duration::minutes(15),
        };

        let err = f.coordinator.return_to_shelf(&cmd).unwrap_err();

        assert!(matches!(err, CoordinatorError::Step { step: SAVE_RESERVATION, .. }));
        let item = stored(&f);
        assert_eq!(item.hard_allocated_quantity(), 10);
        assert_eq!(item.allocation(allocation.id).unwrap().status, AllocationStatus::Staged);
        let record = f.allocations.find_by_id(f.tenant, &allocation.id).unwrap().unwrap();
        assert_eq!(record.status, AllocationStatus::Staged);

        f.coordinator.return_to_shelf(&cmd).unwrap();
        let item = stored(&f);
        assert_eq!(item.hard_allocated_quantity(), 0);
        assert_eq!(item.available_quantity(), 50);
        let record = f.reservations.find_by_id(f.tenant, &reserved.id).unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Cancelled);
    }

    #[test]
    fn failed_reservation_record_unwinds_cancel() {
        let f = fixture(50);
        let reserved = f.coordinator.reserve(&reserve_cmd(&f, "ORD-1", 10)).unwrap().result;
        f.reservations.fail_saves(0, 1);

        let err = f.coordinator.cancel_reservation(&release_cmd(&f, "ORD-1")).unwrap_err();

        assert!(matches!(err, CoordinatorError::Step { step: SAVE_RESERVATION, .. }));
        let item = stored(&f);
        assert_eq!(item.reserved_quantity(), 10);
        assert_eq!(item.reservation(reserved.id).unwrap().status, ReservationStatus::Active);
        assert_eq!(f.coordinator.reconcile(f.tenant, &f.sku, t0()).unwrap(), 0);

        f.coordinator.cancel_reservation(&release_cmd(&f, "ORD-1")).unwrap();
        assert_eq!(stored(&f).reserved_quantity(), 0);
        let record = f.reservations.find_by_id(f.tenant, &reserved.id).unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Cancelled);
    }

    #[test]
    fn reconcile_repairs_a_stale_reservation_record() {
        let f = fixture(50);
        let reserved = f.coordinator.reserve(&reserve_cmd(&f, "ORD-1", 10)).unwrap().result;
        f.reservations.fail_saves(0, 1);
        // The release save passes, restoring the hold fails.
        f.stock.fail_saves(1, 1);

        let err = f.coordinator.cancel_reservation(&release_cmd(&f, "ORD-1")).unwrap_err();
        assert!(matches!(err, CoordinatorError::Inconsistent { step: SAVE_RESERVATION, .. }));
        assert_eq!(stored(&f).reserved_quantity(), 0);
        let before = f.reservations.find_by_id(f.tenant, &reserved.id).unwrap().unwrap();
        assert_eq!(before.status, ReservationStatus::Active);

        assert_eq!(f.coordinator.reconcile(f.tenant, &f.sku, t0()).unwrap(), 1);
        let after = f.reservations.find_by_id(f.tenant, &reserved.id).unwrap().unwrap();
        assert_eq!(after.status, ReservationStatus::Cancelled);
        assert_eq!(f.coordinator.reconcile(f.tenant, &f.sku, t0()).unwrap(), 0);
    }

    #[test]
    fn unknown_sku_is_not_found() {
        let f = fixture(0);
        let mut cmd = reserve_cmd(&f, "ORD-1", 1);
        cmd.sku = Sku::new("SKU-NOPE").unwrap();
        assert!(matches!(f.coordinator.reserve(&cmd), Err(CoordinatorError::ItemNotFound(_))));
    }
}
