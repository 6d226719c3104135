//! Valuation side channel driven by physical movements.
//!
//! One ledger per (tenant, sku), created on the first valued receipt. Every
//! posting is persisted as the ledger snapshot plus its two entries, then the
//! `InventoryValued` fact is published.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use stockflow_accounting::{
    InventoryLedger, LedgerEntry, LedgerError, LedgerPosting, LedgerTransactionId, ValuationMethod,
};
use stockflow_core::{AggregateId, AggregateRoot, ExpectedVersion, Money, TenantId};
use stockflow_events::{EventEnvelope, EventPublisher};
use stockflow_inventory::{Sku, StockScope};

use crate::fact::{EngineFact, Sequences};
use crate::repository::{LedgerEntryRepository, LedgerRepository, RepositoryError};

pub const LEDGER_AGGREGATE_TYPE: &str = "InventoryLedger";

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ValuationError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ValuationError::Ledger(LedgerError::NotFound))
    }
}

pub struct LedgerService<P> {
    ledgers: Arc<dyn LedgerRepository>,
    entries: Arc<dyn LedgerEntryRepository>,
    publisher: P,
    method: ValuationMethod,
    sequences: Sequences,
}

impl<P> LedgerService<P>
where
    P: EventPublisher<EventEnvelope<EngineFact>>,
{
    pub fn new(
        ledgers: Arc<dyn LedgerRepository>,
        entries: Arc<dyn LedgerEntryRepository>,
        publisher: P,
        method: ValuationMethod,
    ) -> Self {
        Self {
            ledgers,
            entries,
            publisher,
            method,
            sequences: Sequences::default(),
        }
    }

    pub fn method(&self) -> ValuationMethod {
        self.method
    }

    /// Value a receipt, opening the ledger in the cost's currency if needed.
    #[allow(clippy::too_many_arguments)]
    pub fn record_receipt(
        &self,
        scope: &StockScope,
        sku: &Sku,
        quantity: i64,
        unit_cost: Money,
        location_id: &str,
        reference_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerPosting, ValuationError> {
        let ledger = match self.ledgers.find_by_sku(scope.tenant_id, sku)? {
            Some(ledger) => ledger,
            None => InventoryLedger::new(scope.clone(), sku.clone(), self.method, unit_cost.currency(), now),
        };
        self.post(ledger, |ledger| {
            ledger.record_receiving(quantity, unit_cost, location_id, reference_id, actor, now)
        })
    }

    /// Relieve inventory into COGS for picked or shipped units.
    #[allow(clippy::too_many_arguments)]
    pub fn record_pick(
        &self,
        tenant_id: TenantId,
        sku: &Sku,
        quantity: i64,
        location_id: &str,
        order_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerPosting, ValuationError> {
        let ledger = self.existing(tenant_id, sku)?;
        self.post(ledger, |ledger| ledger.record_pick(quantity, location_id, order_id, actor, now))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_adjustment(
        &self,
        tenant_id: TenantId,
        sku: &Sku,
        delta: i64,
        reason: &str,
        location_id: &str,
        reference_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerPosting, ValuationError> {
        let ledger = self.existing(tenant_id, sku)?;
        self.post(ledger, |ledger| {
            ledger.record_adjustment(delta, reason, location_id, reference_id, actor, now)
        })
    }

    pub fn ledger(&self, tenant_id: TenantId, sku: &Sku) -> Result<Option<InventoryLedger>, RepositoryError> {
        self.ledgers.find_by_sku(tenant_id, sku)
    }

    pub fn entries(&self, tenant_id: TenantId, sku: &Sku) -> Result<Vec<LedgerEntry>, RepositoryError> {
        self.entries.find_by_sku(tenant_id, sku)
    }

    pub fn transaction_entries(
        &self,
        tenant_id: TenantId,
        transaction_id: LedgerTransactionId,
    ) -> Result<Vec<LedgerEntry>, RepositoryError> {
        self.entries.find_by_transaction(tenant_id, transaction_id)
    }

    fn existing(&self, tenant_id: TenantId, sku: &Sku) -> Result<InventoryLedger, ValuationError> {
        self.ledgers
            .find_by_sku(tenant_id, sku)?
            .ok_or(ValuationError::Ledger(LedgerError::NotFound))
    }

    fn post(
        &self,
        mut ledger: InventoryLedger,
        record: impl FnOnce(&mut InventoryLedger) -> Result<LedgerPosting, LedgerError>,
    ) -> Result<LedgerPosting, ValuationError> {
        let expected = ExpectedVersion::from_loaded(ledger.version());
        let posting = record(&mut ledger)?;

        let version = self.ledgers.save(&ledger, expected)?;
        ledger.set_version(version);
        self.entries.save_all(&posting.entries)?;

        let tenant_id = ledger.scope().tenant_id;
        let aggregate_id = AggregateId::from_uuid(*ledger.id().as_uuid());
        let facts = ledger.drain_facts().into_iter().map(EngineFact::from);
        let envelopes = self.sequences.wrap(tenant_id, aggregate_id, LEDGER_AGGREGATE_TYPE, facts);
        if let Err(e) = self.publisher.publish_all(envelopes) {
            warn!(sku = %ledger.sku(), error = %e, "valuation fact not published");
        }

        debug!(
            sku = %ledger.sku(),
            transaction_id = %posting.transaction_id,
            balance = ledger.current_balance(),
            value = %ledger.current_value(),
            "ledger posting recorded"
        );
        Ok(posting)
    }
}
