//! Persistence ports for the stock aggregate, its satellite records and the
//! valuation ledger.
//!
//! Every store is tenant-keyed and versioned: a save carries the
//! `ExpectedVersion` derived from the loaded copy and returns the new
//! version. A stale save fails `Concurrency` and changes nothing.

pub mod in_memory;

#[cfg(test)]
pub mod faulty;

use std::sync::Arc;

use stockflow_accounting::{InventoryLedger, LedgerEntry, LedgerTransactionId};
use stockflow_core::{Entity, ExpectedVersion, TenantId};
use stockflow_events::TenantScoped;
use stockflow_inventory::{
    AllocationRecord, ReservationRecord, ReservationStatus, Sku, StockItem, TransactionRecord,
};

pub use in_memory::{
    InMemoryLedgerEntryRepository, InMemoryLedgerRepository, InMemoryRecordStore,
    InMemoryStockRepository,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("record not found")]
    NotFound,

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused a write that would break a storage rule.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub(crate) fn poisoned() -> Self {
        RepositoryError::Unavailable("lock poisoned".to_string())
    }
}

/// Stock aggregates keyed by `(tenant, sku)`.
pub trait StockRepository: Send + Sync {
    /// Persist the aggregate and return its new version.
    fn save(&self, item: &StockItem, expected: ExpectedVersion) -> Result<u64, RepositoryError>;

    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Option<StockItem>, RepositoryError>;

    fn find_by_location(&self, tenant_id: TenantId, location_id: &str) -> Result<Vec<StockItem>, RepositoryError>;

    fn find_by_zone(&self, tenant_id: TenantId, zone: &str) -> Result<Vec<StockItem>, RepositoryError>;

    /// Items holding an active or staged reservation for the order.
    fn find_by_order(&self, tenant_id: TenantId, order_id: &str) -> Result<Vec<StockItem>, RepositoryError>;

    fn find_low_stock(&self, tenant_id: TenantId) -> Result<Vec<StockItem>, RepositoryError>;

    fn find_all(&self, tenant_id: TenantId) -> Result<Vec<StockItem>, RepositoryError>;

    /// Refused with `Conflict` while the item still holds quantity.
    fn delete(&self, tenant_id: TenantId, sku: &Sku) -> Result<(), RepositoryError>;
}

impl<S> StockRepository for Arc<S>
where
    S: StockRepository + ?Sized,
{
    fn save(&self, item: &StockItem, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        (**self).save(item, expected)
    }

    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Option<StockItem>, RepositoryError> {
        (**self).find_by_sku(tenant_id, sku)
    }

    fn find_by_location(&self, tenant_id: TenantId, location_id: &str) -> Result<Vec<StockItem>, RepositoryError> {
        (**self).find_by_location(tenant_id, location_id)
    }

    fn find_by_zone(&self, tenant_id: TenantId, zone: &str) -> Result<Vec<StockItem>, RepositoryError> {
        (**self).find_by_zone(tenant_id, zone)
    }

    fn find_by_order(&self, tenant_id: TenantId, order_id: &str) -> Result<Vec<StockItem>, RepositoryError> {
        (**self).find_by_order(tenant_id, order_id)
    }

    fn find_low_stock(&self, tenant_id: TenantId) -> Result<Vec<StockItem>, RepositoryError> {
        (**self).find_low_stock(tenant_id)
    }

    fn find_all(&self, tenant_id: TenantId) -> Result<Vec<StockItem>, RepositoryError> {
        (**self).find_all(tenant_id)
    }

    fn delete(&self, tenant_id: TenantId, sku: &Sku) -> Result<(), RepositoryError> {
        (**self).delete(tenant_id, sku)
    }
}

/// Independently versioned records (reservations, allocations, transactions).
pub trait RecordRepository<R>: Send + Sync
where
    R: Entity + TenantScoped,
{
    fn save(&self, record: &R, expected: ExpectedVersion) -> Result<u64, RepositoryError>;

    fn find_by_id(&self, tenant_id: TenantId, id: &R::Id) -> Result<Option<R>, RepositoryError>;

    /// Every record of the tenant matching `predicate`, in no particular order.
    fn find_where(
        &self,
        tenant_id: TenantId,
        predicate: &dyn Fn(&R) -> bool,
    ) -> Result<Vec<R>, RepositoryError>;
}

impl<R, S> RecordRepository<R> for Arc<S>
where
    R: Entity + TenantScoped,
    S: RecordRepository<R> + ?Sized,
{
    fn save(&self, record: &R, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        (**self).save(record, expected)
    }

    fn find_by_id(&self, tenant_id: TenantId, id: &R::Id) -> Result<Option<R>, RepositoryError> {
        (**self).find_by_id(tenant_id, id)
    }

    fn find_where(
        &self,
        tenant_id: TenantId,
        predicate: &dyn Fn(&R) -> bool,
    ) -> Result<Vec<R>, RepositoryError> {
        (**self).find_where(tenant_id, predicate)
    }
}

pub trait ReservationRepository: RecordRepository<ReservationRecord> {
    fn find_by_order(&self, tenant_id: TenantId, order_id: &str) -> Result<Vec<ReservationRecord>, RepositoryError> {
        let mut found = self.find_where(tenant_id, &|r: &ReservationRecord| r.order_id == order_id)?;
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    fn find_active_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Vec<ReservationRecord>, RepositoryError> {
        let mut found =
            self.find_where(tenant_id, &|r: &ReservationRecord| &r.sku == sku && r.status == ReservationStatus::Active)?;
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }
}

impl<T> ReservationRepository for T where T: RecordRepository<ReservationRecord> + ?Sized {}

pub trait AllocationRepository: RecordRepository<AllocationRecord> {
    fn find_by_order(&self, tenant_id: TenantId, order_id: &str) -> Result<Vec<AllocationRecord>, RepositoryError> {
        let mut found = self.find_where(tenant_id, &|a: &AllocationRecord| a.order_id == order_id)?;
        found.sort_by_key(|a| a.staged_at);
        Ok(found)
    }
}

impl<T> AllocationRepository for T where T: RecordRepository<AllocationRecord> + ?Sized {}

pub trait TransactionRepository: RecordRepository<TransactionRecord> {
    /// Oldest first.
    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Vec<TransactionRecord>, RepositoryError> {
        let mut found = self.find_where(tenant_id, &|t: &TransactionRecord| &t.sku == sku)?;
        found.sort_by_key(|t| t.transaction.created_at);
        Ok(found)
    }
}

impl<T> TransactionRepository for T where T: RecordRepository<TransactionRecord> + ?Sized {}

/// Valuation ledgers keyed by `(tenant, sku)`.
pub trait LedgerRepository: Send + Sync {
    fn save(&self, ledger: &InventoryLedger, expected: ExpectedVersion) -> Result<u64, RepositoryError>;

    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Option<InventoryLedger>, RepositoryError>;
}

/// Append-only ledger lines.
pub trait LedgerEntryRepository: Send + Sync {
    /// All entries or none; a duplicate entry id rejects the whole batch.
    fn save_all(&self, entries: &[LedgerEntry]) -> Result<(), RepositoryError>;

    /// In posting order.
    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Vec<LedgerEntry>, RepositoryError>;

    fn find_by_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: LedgerTransactionId,
    ) -> Result<Vec<LedgerEntry>, RepositoryError>;
}

/// The stock aggregate store plus the satellite record stores, shared by the
/// coordinator and the service.
#[derive(Clone)]
pub struct Repositories {
    pub stock: Arc<dyn StockRepository>,
    pub reservations: Arc<dyn RecordRepository<ReservationRecord>>,
    pub allocations: Arc<dyn RecordRepository<AllocationRecord>>,
    pub transactions: Arc<dyn RecordRepository<TransactionRecord>>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            stock: Arc::new(InMemoryStockRepository::new()),
            reservations: Arc::new(InMemoryRecordStore::new()),
            allocations: Arc::new(InMemoryRecordStore::new()),
            transactions: Arc::new(InMemoryRecordStore::new()),
        }
    }
}
