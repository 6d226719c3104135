//! Failure injection for coordinator tests.

use std::sync::Mutex;

use stockflow_core::{Entity, ExpectedVersion, TenantId};
use stockflow_events::TenantScoped;
use stockflow_inventory::{Sku, StockItem};

use super::{RecordRepository, RepositoryError, StockRepository};

/// Which saves fail: skip `pass` saves, then fail the next `fail` saves.
#[derive(Debug, Default)]
struct Plan {
    pass: usize,
    fail: usize,
}

/// Wraps a store and fails saves on demand. Reads always go through.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    plan: Mutex<Plan>,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            plan: Mutex::new(Plan::default()),
        }
    }

    /// Let `pass` saves succeed, then fail `fail` saves with `Unavailable`.
    pub fn fail_saves(&self, pass: usize, fail: usize) {
        if let Ok(mut plan) = self.plan.lock() {
            *plan = Plan { pass, fail };
        }
    }

    fn gate(&self) -> Result<(), RepositoryError> {
        let mut plan = self.plan.lock().map_err(|_| RepositoryError::poisoned())?;
        if plan.pass > 0 {
            plan.pass -= 1;
            return Ok(());
        }
        if plan.fail > 0 {
            plan.fail -= 1;
            return Err(RepositoryError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl<S: StockRepository> StockRepository for FaultyStore<S> {
    fn save(&self, item: &StockItem, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        self.gate()?;
        self.inner.save(item, expected)
    }

    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Option<StockItem>, RepositoryError> {
        self.inner.find_by_sku(tenant_id, sku)
    }

    fn find_by_location(&self, tenant_id: TenantId, location_id: &str) -> Result<Vec<StockItem>, RepositoryError> {
        self.inner.find_by_location(tenant_id, location_id)
    }

    fn find_by_zone(&self, tenant_id: TenantId, zone: &str) -> Result<Vec<StockItem>, RepositoryError> {
        self.inner.find_by_zone(tenant_id, zone)
    }

    fn find_by_order(&self, tenant_id: TenantId, order_id: &str) -> Result<Vec<StockItem>, RepositoryError> {
        self.inner.find_by_order(tenant_id, order_id)
    }

    fn find_low_stock(&self, tenant_id: TenantId) -> Result<Vec<StockItem>, RepositoryError> {
        self.inner.find_low_stock(tenant_id)
    }

    fn find_all(&self, tenant_id: TenantId) -> Result<Vec<StockItem>, RepositoryError> {
        self.inner.find_all(tenant_id)
    }

    fn delete(&self, tenant_id: TenantId, sku: &Sku) -> Result<(), RepositoryError> {
        self.inner.delete(tenant_id, sku)
    }
}

impl<R, S> RecordRepository<R> for FaultyStore<S>
where
    R: Entity + TenantScoped,
    S: RecordRepository<R>,
{
    fn save(&self, record: &R, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        self.gate()?;
        self.inner.save(record, expected)
    }

    fn find_by_id(&self, tenant_id: TenantId, id: &R::Id) -> Result<Option<R>, RepositoryError> {
        self.inner.find_by_id(tenant_id, id)
    }

    fn find_where(
        &self,
        tenant_id: TenantId,
        predicate: &dyn Fn(&R) -> bool,
    ) -> Result<Vec<R>, RepositoryError> {
        self.inner.find_where(tenant_id, predicate)
    }
}
