//! Application service: the command surface of the engine.
//!
//! Each command runs through the coordinator, then the aggregate's facts are
//! wrapped in envelopes and handed to the projector and the publisher. The
//! projector, the publisher and the valuation ledger are side channels: their
//! failures are logged and never fail a committed stock mutation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use stockflow_core::{DomainError, Money, MoneyError, TenantId};
use stockflow_events::{EventEnvelope, EventPublisher};
use stockflow_inventory::{
    AllocationRecord, InventoryTransaction, PickOutcome, ReservationId, ReservationRecord,
    ShortageOutcome, Sku, StockError, StockItem, VelocityClass,
};

use crate::commands::{
    AdjustStock, CreateItem, ExpireReservations, PackAllocation, PickStock, RecordShortage,
    ReceiveStock, ReleaseOrder, ReleaseReservation, ReserveBulk, ReserveStock, ReturnToShelf,
    SetPickFrequency, SetStorageStrategy, ShipAllocation, StageReservation,
};
use crate::config::EngineConfig;
use crate::coordinator::{Committed, Coordinator, CoordinatorError, StepError};
use crate::fact::{EngineFact, Sequences};
use crate::ledger_service::{LedgerService, ValuationError};
use crate::query::StockQueryService;
use crate::read_model::{StockListView, StockProjector, TenantStore};
use crate::repository::{LedgerEntryRepository, LedgerRepository, Repositories, RepositoryError};

pub const STOCK_AGGREGATE_TYPE: &str = "StockItem";

pub type ViewStore = Arc<dyn TenantStore<Sku, StockListView>>;

/// How a caller should treat a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; never retried.
    Validation,
    /// A business rule refused the operation.
    Conflict,
    NotFound,
    /// Storage or transport trouble.
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("stock item {0} not found")]
    ItemNotFound(Sku),

    /// A bulk reservation stopped part-way; `reserved` stay held until the
    /// caller releases them.
    #[error("bulk reservation failed at {failed_sku} after reserving {} item(s): {source}", .reserved.len())]
    BulkPartialFailure {
        failed_sku: Sku,
        reserved: Vec<Sku>,
        source: Box<ServiceError>,
    },

    /// A write failed and so did undoing an earlier one; needs reconciliation.
    #[error("{step} failed ({source}) and compensating {compensation_step} failed: {compensation}")]
    Inconsistent {
        step: &'static str,
        source: StepError,
        compensation_step: &'static str,
        compensation: StepError,
    },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Stock(e) if e.is_validation() => ErrorKind::Validation,
            ServiceError::Stock(_) => ErrorKind::Conflict,
            ServiceError::Repository(e) => match e {
                RepositoryError::NotFound => ErrorKind::NotFound,
                RepositoryError::Concurrency(_)
                | RepositoryError::Duplicate(_)
                | RepositoryError::Conflict(_) => ErrorKind::Conflict,
                RepositoryError::Unavailable(_) => ErrorKind::Infrastructure,
            },
            ServiceError::Domain(e) if e.is_validation() => ErrorKind::Validation,
            ServiceError::Domain(DomainError::NotFound) => ErrorKind::NotFound,
            ServiceError::Domain(_) => ErrorKind::Conflict,
            ServiceError::Money(_) | ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::ItemNotFound(_) => ErrorKind::NotFound,
            ServiceError::BulkPartialFailure { source, .. } => source.kind(),
            ServiceError::Inconsistent { .. } => ErrorKind::Infrastructure,
        }
    }
}

impl From<StepError> for ServiceError {
    fn from(e: StepError) -> Self {
        match e {
            StepError::Stock(e) => ServiceError::Stock(e),
            StepError::Repository(e) => ServiceError::Repository(e),
        }
    }
}

impl From<CoordinatorError> for ServiceError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::Stock(e) => ServiceError::Stock(e),
            CoordinatorError::Repository(e) => ServiceError::Repository(e),
            CoordinatorError::ItemNotFound(sku) => ServiceError::ItemNotFound(sku),
            CoordinatorError::Step { step, source } => {
                warn!(step, error = %source, "write failed; earlier writes compensated");
                source.into()
            }
            CoordinatorError::Inconsistent { step, source, compensation_step, compensation } => {
                ServiceError::Inconsistent { step, source, compensation_step, compensation }
            }
        }
    }
}

pub struct InventoryService<P>
where
    P: EventPublisher<EventEnvelope<EngineFact>>,
{
    coordinator: Coordinator,
    views: ViewStore,
    projector: StockProjector<ViewStore>,
    publisher: Arc<P>,
    ledger: Option<LedgerService<Arc<P>>>,
    config: EngineConfig,
    sequences: Sequences,
}

impl<P> InventoryService<P>
where
    P: EventPublisher<EventEnvelope<EngineFact>>,
{
    pub fn new(repos: Repositories, views: ViewStore, publisher: Arc<P>, config: EngineConfig) -> Self {
        Self {
            coordinator: Coordinator::new(repos),
            projector: StockProjector::new(views.clone()),
            views,
            publisher,
            ledger: None,
            config,
            sequences: Sequences::default(),
        }
    }

    /// Attach the valuation ledger. Ignored when the config disables it.
    pub fn with_ledger(mut self, ledgers: Arc<dyn LedgerRepository>, entries: Arc<dyn LedgerEntryRepository>) -> Self {
        if self.config.ledger_enabled {
            self.ledger = Some(LedgerService::new(
                ledgers,
                entries,
                self.publisher.clone(),
                self.config.default_valuation_method,
            ));
        }
        self
    }

    pub fn repositories(&self) -> &Repositories {
        self.coordinator.repositories()
    }

    pub fn projector(&self) -> &StockProjector<ViewStore> {
        &self.projector
    }

    pub fn ledger(&self) -> Option<&LedgerService<Arc<P>>> {
        self.ledger.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queries(&self) -> StockQueryService<ViewStore> {
        StockQueryService::new(self.views.clone(), &self.config)
    }

    pub fn create_item(&self, cmd: CreateItem) -> Result<StockItem, ServiceError> {
        let item = StockItem::create(
            cmd.scope,
            cmd.sku,
            cmd.product_name,
            cmd.reorder_point,
            cmd.reorder_quantity,
            cmd.occurred_at,
        )?;
        let mut item = self.coordinator.create(item)?;
        self.dispatch(&mut item);
        info!(sku = %item.sku(), "stock item created");
        Ok(item)
    }

    pub fn receive(&self, cmd: ReceiveStock) -> Result<InventoryTransaction, ServiceError> {
        let unit_cost = self.unit_cost(&cmd)?;
        let Committed { mut item, result: tx } = self.with_retry(|| self.coordinator.receive(&cmd))?;
        self.dispatch(&mut item);
        info!(sku = %cmd.sku, location = %cmd.location_id, quantity = cmd.quantity, "stock received");

        if let (Some(ledger), Some(unit_cost)) = (&self.ledger, unit_cost) {
            let posting = ledger.record_receipt(
                item.scope(),
                &cmd.sku,
                cmd.quantity,
                unit_cost,
                &cmd.location_id,
                &cmd.reference_id,
                &cmd.received_by,
                cmd.occurred_at,
            );
            log_valuation(&cmd.sku, "receipt", posting.map(|p| p.transaction_id));
        }
        Ok(tx)
    }

    pub fn reserve(&self, cmd: ReserveStock) -> Result<ReservationRecord, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.reserve(&cmd))?;
        self.dispatch(&mut item);
        info!(
            sku = %cmd.sku,
            order_id = %cmd.order_id,
            location = %cmd.location_id,
            quantity = cmd.quantity,
            "stock reserved"
        );
        Ok(result)
    }

    /// Reserve several SKUs for one order, checking every line before
    /// committing any.
    pub fn reserve_bulk(&self, cmd: ReserveBulk) -> Result<Vec<ReservationRecord>, ServiceError> {
        if cmd.lines.is_empty() {
            return Err(ServiceError::Validation("bulk reservation has no lines".to_string()));
        }

        let mut items: HashMap<Sku, StockItem> = HashMap::new();
        let mut demand: HashMap<(Sku, String), i64> = HashMap::new();
        let mut plan = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if line.quantity <= 0 {
                return Err(StockError::InvalidQuantity(line.quantity).into());
            }
            if !items.contains_key(&line.sku) {
                let item = self.coordinator.load(cmd.tenant_id, &line.sku)?;
                items.insert(line.sku.clone(), item);
            }
            let Some(item) = items.get(&line.sku) else {
                return Err(ServiceError::ItemNotFound(line.sku.clone()));
            };

            let location_id = match &line.location_id {
                Some(id) => id.clone(),
                None => item
                    .available_locations()
                    .find(|l| {
                        let held = demand.get(&(line.sku.clone(), l.location_id().to_string())).copied().unwrap_or(0);
                        l.available() - held >= line.quantity
                    })
                    .map(|l| l.location_id().to_string())
                    .ok_or_else(|| StockError::InsufficientStock {
                        location: "any".to_string(),
                        requested: line.quantity,
                        available: item.available_quantity(),
                    })?,
            };
            let location = item
                .location(&location_id)
                .ok_or_else(|| StockError::LocationNotFound(location_id.clone()))?;
            let wanted = demand.entry((line.sku.clone(), location_id.clone())).or_insert(0);
            *wanted += line.quantity;
            if *wanted > location.available() {
                return Err(StockError::InsufficientStock {
                    location: location_id,
                    requested: *wanted,
                    available: location.available(),
                }
                .into());
            }

            plan.push(ReserveStock {
                tenant_id: cmd.tenant_id,
                sku: line.sku.clone(),
                order_id: cmd.order_id.clone(),
                location_id,
                quantity: line.quantity,
                reserved_by: cmd.reserved_by.clone(),
                occurred_at: cmd.occurred_at,
            });
        }

        let mut reserved = Vec::with_capacity(plan.len());
        for step in plan {
            let sku = step.sku.clone();
            match self.reserve(step) {
                Ok(record) => reserved.push(record),
                Err(source) => {
                    warn!(order_id = %cmd.order_id, sku = %sku, error = %source, "bulk reservation stopped");
                    return Err(ServiceError::BulkPartialFailure {
                        failed_sku: sku,
                        reserved: reserved.into_iter().map(|r: ReservationRecord| r.sku).collect(),
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(reserved)
    }

    pub fn pick(&self, cmd: PickStock) -> Result<PickOutcome, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.pick(&cmd))?;
        self.dispatch(&mut item);
        info!(
            sku = %cmd.sku,
            order_id = %cmd.order_id,
            location = %cmd.location_id,
            quantity = cmd.quantity,
            "stock picked"
        );

        if let Some(ledger) = &self.ledger {
            let posting = ledger.record_pick(
                cmd.tenant_id,
                &cmd.sku,
                cmd.quantity,
                &cmd.location_id,
                &cmd.order_id,
                &cmd.picked_by,
                cmd.occurred_at,
            );
            log_valuation(&cmd.sku, "pick", posting.map(|p| p.transaction_id));
        }
        Ok(result)
    }

    pub fn release_reservation(&self, cmd: ReleaseReservation) -> Result<ReservationId, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.cancel_reservation(&cmd))?;
        self.dispatch(&mut item);
        info!(sku = %cmd.sku, order_id = %cmd.order_id, reason = %cmd.reason, "reservation released");
        Ok(result)
    }

    /// Release every active reservation of an order. Per-item failures are
    /// logged and skipped; returns how many reservations were released.
    pub fn release_by_order(&self, cmd: ReleaseOrder) -> Result<usize, ServiceError> {
        let items = self.repositories().stock.find_by_order(cmd.tenant_id, &cmd.order_id)?;
        let mut released = 0;
        for item in items {
            let held = item
                .active_reservations()
                .filter(|r| r.order_id == cmd.order_id)
                .count();
            for _ in 0..held {
                let release = ReleaseReservation {
                    tenant_id: cmd.tenant_id,
                    sku: item.sku().clone(),
                    order_id: cmd.order_id.clone(),
                    released_by: cmd.released_by.clone(),
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                };
                match self.release_reservation(release) {
                    Ok(_) => released += 1,
                    Err(e) => {
                        warn!(sku = %item.sku(), order_id = %cmd.order_id, error = %e, "release skipped");
                        break;
                    }
                }
            }
        }
        info!(order_id = %cmd.order_id, released, "order reservations released");
        Ok(released)
    }

    pub fn adjust(&self, cmd: AdjustStock) -> Result<Option<InventoryTransaction>, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.adjust(&cmd))?;
        self.dispatch(&mut item);
        info!(
            sku = %cmd.sku,
            location = %cmd.location_id,
            quantity = cmd.new_quantity,
            reason = %cmd.reason,
            "stock adjusted"
        );

        if let (Some(ledger), Some(tx)) = (&self.ledger, &result) {
            let posting = ledger.record_adjustment(
                cmd.tenant_id,
                &cmd.sku,
                tx.quantity,
                &cmd.reason,
                &cmd.location_id,
                &tx.id.to_string(),
                &cmd.adjusted_by,
                cmd.occurred_at,
            );
            log_valuation(&cmd.sku, "adjustment", posting.map(|p| p.transaction_id));
        }
        Ok(result)
    }

    pub fn stage(&self, cmd: StageReservation) -> Result<AllocationRecord, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.stage(&cmd))?;
        self.dispatch(&mut item);
        info!(
            sku = %cmd.sku,
            order_id = %result.order_id,
            location = %cmd.staging_location_id,
            quantity = result.quantity,
            "reservation staged"
        );
        Ok(result)
    }

    pub fn pack(&self, cmd: PackAllocation) -> Result<AllocationRecord, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.pack(&cmd))?;
        self.dispatch(&mut item);
        info!(sku = %cmd.sku, order_id = %result.order_id, quantity = result.quantity, "allocation packed");
        Ok(result)
    }

    pub fn ship(&self, cmd: ShipAllocation) -> Result<InventoryTransaction, ServiceError> {
        let Committed { mut item, result: tx } = self.with_retry(|| self.coordinator.ship(&cmd))?;
        self.dispatch(&mut item);
        info!(
            sku = %cmd.sku,
            order_id = %tx.reference_id,
            location = %tx.location_id,
            quantity = -tx.quantity,
            "allocation shipped"
        );

        if let Some(ledger) = &self.ledger {
            let posting = ledger.record_pick(
                cmd.tenant_id,
                &cmd.sku,
                -tx.quantity,
                &tx.location_id,
                &tx.reference_id,
                &cmd.shipped_by,
                cmd.occurred_at,
            );
            log_valuation(&cmd.sku, "shipment", posting.map(|p| p.transaction_id));
        }
        Ok(tx)
    }

    pub fn return_to_shelf(&self, cmd: ReturnToShelf) -> Result<InventoryTransaction, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.return_to_shelf(&cmd))?;
        self.dispatch(&mut item);
        info!(
            sku = %cmd.sku,
            order_id = %result.reference_id,
            location = %result.location_id,
            quantity = result.quantity,
            reason = %cmd.reason,
            "allocation returned to shelf"
        );
        Ok(result)
    }

    pub fn record_shortage(&self, cmd: RecordShortage) -> Result<ShortageOutcome, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.record_shortage(&cmd))?;
        self.dispatch(&mut item);
        warn!(
            sku = %cmd.sku,
            order_id = %cmd.order_id,
            location = %cmd.location_id,
            quantity = -result.transaction.quantity,
            reason = %cmd.reason,
            "stock shortage recorded"
        );

        if let Some(ledger) = &self.ledger {
            let posting = ledger.record_adjustment(
                cmd.tenant_id,
                &cmd.sku,
                result.transaction.quantity,
                &cmd.reason,
                &cmd.location_id,
                &cmd.order_id,
                &cmd.reported_by,
                cmd.occurred_at,
            );
            log_valuation(&cmd.sku, "shortage", posting.map(|p| p.transaction_id));
        }
        Ok(result)
    }

    pub fn expire_reservations(&self, cmd: ExpireReservations) -> Result<Vec<ReservationId>, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| self.coordinator.expire_reservations(&cmd))?;
        if !result.is_empty() {
            self.dispatch(&mut item);
            info!(sku = %cmd.sku, expired = result.len(), "reservations expired");
        }
        Ok(result)
    }

    pub fn set_storage_strategy(&self, cmd: SetStorageStrategy) -> Result<(), ServiceError> {
        let Committed { mut item, .. } = self.with_retry(|| {
            self.coordinator.update(cmd.tenant_id, &cmd.sku, |item| {
                item.set_storage_strategy(cmd.strategy, cmd.occurred_at);
                Ok(())
            })
        })?;
        self.dispatch(&mut item);
        info!(sku = %cmd.sku, strategy = ?cmd.strategy, "storage strategy set");
        Ok(())
    }

    pub fn set_pick_frequency(&self, cmd: SetPickFrequency) -> Result<VelocityClass, ServiceError> {
        let Committed { mut item, result } = self.with_retry(|| {
            self.coordinator.update(cmd.tenant_id, &cmd.sku, |item| {
                item.set_pick_frequency(cmd.picks_per_week, cmd.occurred_at);
                Ok(item.velocity_class())
            })
        })?;
        self.dispatch(&mut item);
        info!(sku = %cmd.sku, picks_per_week = cmd.picks_per_week, class = %result, "pick frequency set");
        Ok(result)
    }

    /// Repair satellite records left stale by an uncompensated write.
    pub fn reconcile(&self, tenant_id: TenantId, sku: &Sku, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        Ok(self.coordinator.reconcile(tenant_id, sku, now)?)
    }

    /// Re-project every stored item of a tenant.
    pub fn rebuild_views(&self, tenant_id: TenantId) -> Result<usize, ServiceError> {
        let items = self.repositories().stock.find_all(tenant_id)?;
        self.projector.rebuild(tenant_id, &items);
        Ok(items.len())
    }

    fn unit_cost(&self, cmd: &ReceiveStock) -> Result<Option<Money>, ServiceError> {
        match cmd.unit_cost_minor {
            None | Some(0) => Ok(None),
            Some(minor) if minor < 0 => Err(ServiceError::Validation(format!(
                "unit cost must not be negative, got {minor}"
            ))),
            Some(minor) => {
                let code = cmd.currency.as_deref().unwrap_or(&self.config.default_currency);
                Ok(Some(Money::from_minor(minor, code)?))
            }
        }
    }

    fn with_retry<T>(&self, op: impl Fn() -> Result<T, CoordinatorError>) -> Result<T, ServiceError> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "concurrent update; retrying");
                }
                outcome => return outcome.map_err(ServiceError::from),
            }
        }
    }

    /// Project and publish the facts of a committed aggregate.
    fn dispatch(&self, item: &mut StockItem) {
        let tenant_id = item.scope().tenant_id;
        let facts = item.drain_facts().into_iter().map(EngineFact::from);
        let envelopes = self.sequences.wrap(tenant_id, item.id_typed().0, STOCK_AGGREGATE_TYPE, facts);

        if self.projector.get(tenant_id, item.sku()).is_none() {
            self.projector.refresh(item);
        }
        for envelope in &envelopes {
            let Some(fact) = envelope.payload().as_stock() else {
                continue;
            };
            let stock_envelope = envelope.clone().map(|_| fact.clone());
            if let Err(e) = self.projector.apply_envelope(&stock_envelope) {
                warn!(sku = %item.sku(), event_type = envelope.event_type(), error = %e, "projection failed");
            }
        }
        self.projector.refresh(item);

        if envelopes.is_empty() {
            return;
        }
        if let Err(e) = self.publisher.publish_all(envelopes) {
            warn!(sku = %item.sku(), error = %e, "facts not published");
        }
    }
}

fn log_valuation(sku: &Sku, movement: &str, outcome: Result<stockflow_accounting::LedgerTransactionId, ValuationError>) {
    match outcome {
        Ok(transaction_id) => debug!(sku = %sku, movement, %transaction_id, "movement valued"),
        Err(e) => warn!(sku = %sku, movement, error = %e, "valuation skipped"),
    }
}
