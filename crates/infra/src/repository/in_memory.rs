use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use stockflow_accounting::{InventoryLedger, LedgerEntry, LedgerTransactionId};
use stockflow_core::{AggregateRoot, Entity, ExpectedVersion, TenantId};
use stockflow_events::TenantScoped;
use stockflow_inventory::{Sku, StockItem};

use super::{LedgerEntryRepository, LedgerRepository, RecordRepository, RepositoryError, StockRepository};

/// Version gate shared by every in-memory store.
///
/// Returns the version the record will be stored at.
fn next_version(
    what: &str,
    current: Option<u64>,
    expected: ExpectedVersion,
) -> Result<u64, RepositoryError> {
    if expected == ExpectedVersion::NoRecord && current.is_some() {
        return Err(RepositoryError::Duplicate(what.to_string()));
    }
    if !expected.matches(current) {
        return Err(RepositoryError::Concurrency(format!(
            "{what}: expected {expected:?}, found {current:?}"
        )));
    }
    Ok(current.unwrap_or(0) + 1)
}

/// In-memory stock aggregate store.
///
/// Intended for tests/dev. Lookups other than `find_by_sku` scan the tenant.
#[derive(Debug, Default)]
pub struct InMemoryStockRepository {
    items: RwLock<HashMap<(TenantId, Sku), StockItem>>,
}

impl InMemoryStockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn scan(
        &self,
        tenant_id: TenantId,
        predicate: impl Fn(&StockItem) -> bool,
    ) -> Result<Vec<StockItem>, RepositoryError> {
        let items = self.items.read().map_err(|_| RepositoryError::poisoned())?;
        let mut found: Vec<StockItem> = items
            .iter()
            .filter(|((t, _), item)| *t == tenant_id && predicate(item))
            .map(|(_, item)| item.clone())
            .collect();
        found.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(found)
    }
}

impl StockRepository for InMemoryStockRepository {
    fn save(&self, item: &StockItem, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        let key = (item.scope().tenant_id, item.sku().clone());
        let mut items = self.items.write().map_err(|_| RepositoryError::poisoned())?;

        let current = items.get(&key).map(AggregateRoot::version);
        let version = next_version(&format!("stock item {}", item.sku()), current, expected)?;

        let mut stored = item.clone();
        stored.set_version(version);
        stored.drain_facts();
        items.insert(key, stored);
        Ok(version)
    }

    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Option<StockItem>, RepositoryError> {
        let items = self.items.read().map_err(|_| RepositoryError::poisoned())?;
        Ok(items.get(&(tenant_id, sku.clone())).cloned())
    }

    fn find_by_location(&self, tenant_id: TenantId, location_id: &str) -> Result<Vec<StockItem>, RepositoryError> {
        self.scan(tenant_id, |item| item.location(location_id).is_some())
    }

    fn find_by_zone(&self, tenant_id: TenantId, zone: &str) -> Result<Vec<StockItem>, RepositoryError> {
        self.scan(tenant_id, |item| item.has_zone(zone))
    }

    fn find_by_order(&self, tenant_id: TenantId, order_id: &str) -> Result<Vec<StockItem>, RepositoryError> {
        self.scan(tenant_id, |item| item.has_order(order_id))
    }

    fn find_low_stock(&self, tenant_id: TenantId) -> Result<Vec<StockItem>, RepositoryError> {
        self.scan(tenant_id, StockItem::is_low_stock)
    }

    fn find_all(&self, tenant_id: TenantId) -> Result<Vec<StockItem>, RepositoryError> {
        self.scan(tenant_id, |_| true)
    }

    fn delete(&self, tenant_id: TenantId, sku: &Sku) -> Result<(), RepositoryError> {
        let key = (tenant_id, sku.clone());
        let mut items = self.items.write().map_err(|_| RepositoryError::poisoned())?;
        let item = items.get(&key).ok_or(RepositoryError::NotFound)?;
        if item.total_quantity() > 0 {
            return Err(RepositoryError::Conflict(format!(
                "stock item {sku} still holds {} units",
                item.total_quantity()
            )));
        }
        items.remove(&key);
        Ok(())
    }
}

/// In-memory store for satellite records, keyed by `(tenant, record id)`.
#[derive(Debug)]
pub struct InMemoryRecordStore<R: Entity> {
    records: RwLock<HashMap<(TenantId, R::Id), R>>,
}

impl<R: Entity> InMemoryRecordStore<R> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Entity> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RecordRepository<R> for InMemoryRecordStore<R>
where
    R: Entity + TenantScoped + Clone + Send + Sync,
    R::Id: Send + Sync,
{
    fn save(&self, record: &R, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        let key = (record.tenant_id(), record.id().clone());
        let mut records = self.records.write().map_err(|_| RepositoryError::poisoned())?;

        let current = records.get(&key).map(Entity::version);
        let version = next_version(&format!("record {:?}", record.id()), current, expected)?;

        let mut stored = record.clone();
        stored.set_version(version);
        records.insert(key, stored);
        Ok(version)
    }

    fn find_by_id(&self, tenant_id: TenantId, id: &R::Id) -> Result<Option<R>, RepositoryError> {
        let records = self.records.read().map_err(|_| RepositoryError::poisoned())?;
        Ok(records.get(&(tenant_id, id.clone())).cloned())
    }

    fn find_where(
        &self,
        tenant_id: TenantId,
        predicate: &dyn Fn(&R) -> bool,
    ) -> Result<Vec<R>, RepositoryError> {
        let records = self.records.read().map_err(|_| RepositoryError::poisoned())?;
        Ok(records
            .iter()
            .filter(|((t, _), record)| *t == tenant_id && predicate(record))
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedgerRepository {
    ledgers: RwLock<HashMap<(TenantId, Sku), InventoryLedger>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerRepository for InMemoryLedgerRepository {
    fn save(&self, ledger: &InventoryLedger, expected: ExpectedVersion) -> Result<u64, RepositoryError> {
        let key = (ledger.scope().tenant_id, ledger.sku().clone());
        let mut ledgers = self.ledgers.write().map_err(|_| RepositoryError::poisoned())?;

        let current = ledgers.get(&key).map(AggregateRoot::version);
        let version = next_version(&format!("ledger {}", ledger.sku()), current, expected)?;

        let mut stored = ledger.clone();
        stored.set_version(version);
        stored.drain_facts();
        ledgers.insert(key, stored);
        Ok(version)
    }

    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Option<InventoryLedger>, RepositoryError> {
        let ledgers = self.ledgers.read().map_err(|_| RepositoryError::poisoned())?;
        Ok(ledgers.get(&(tenant_id, sku.clone())).cloned())
    }
}

/// Append-only ledger lines, one vector per tenant in posting order.
#[derive(Debug, Default)]
pub struct InMemoryLedgerEntryRepository {
    entries: RwLock<HashMap<TenantId, Vec<LedgerEntry>>>,
}

impl InMemoryLedgerEntryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(
        &self,
        tenant_id: TenantId,
        predicate: impl Fn(&LedgerEntry) -> bool,
    ) -> Result<Vec<LedgerEntry>, RepositoryError> {
        let entries = self.entries.read().map_err(|_| RepositoryError::poisoned())?;
        Ok(entries
            .get(&tenant_id)
            .map(|lines| lines.iter().filter(|e| predicate(e)).cloned().collect())
            .unwrap_or_default())
    }
}

impl LedgerEntryRepository for InMemoryLedgerEntryRepository {
    fn save_all(&self, batch: &[LedgerEntry]) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().map_err(|_| RepositoryError::poisoned())?;

        let mut seen = HashSet::new();
        for entry in batch {
            let exists = entries
                .get(&entry.tenant_id)
                .is_some_and(|lines| lines.iter().any(|e| e.id == entry.id));
            if exists || !seen.insert(entry.id) {
                return Err(RepositoryError::Duplicate(format!("ledger entry {}", entry.id)));
            }
        }

        for entry in batch {
            entries.entry(entry.tenant_id).or_default().push(entry.clone());
        }
        Ok(())
    }

    fn find_by_sku(&self, tenant_id: TenantId, sku: &Sku) -> Result<Vec<LedgerEntry>, RepositoryError> {
        self.select(tenant_id, |e| &e.sku == sku)
    }

    fn find_by_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: LedgerTransactionId,
    ) -> Result<Vec<LedgerEntry>, RepositoryError> {
        self.select(tenant_id, |e| e.transaction_id == transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use stockflow_inventory::{ReservationRecord, StockReceipt, StockScope};

    use super::*;
    use crate::repository::ReservationRepository;

    fn scope(tenant_id: TenantId) -> StockScope {
        StockScope::new(tenant_id, "FAC-1", "WH-1")
    }

    fn item(tenant_id: TenantId, sku: &str) -> StockItem {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        StockItem::create(scope(tenant_id), Sku::new(sku).unwrap(), "Widget", 5, 20, now).unwrap()
    }

    #[test]
    fn save_assigns_versions_and_rejects_stale_writes() {
        let repo = InMemoryStockRepository::new();
        let tenant = TenantId::new();
        let mut stock = item(tenant, "SKU-1");

        let v1 = repo.save(&stock, ExpectedVersion::from_loaded(stock.version())).unwrap();
        assert_eq!(v1, 1);
        stock.set_version(v1);

        let stale = repo.save(&stock, ExpectedVersion::Exact(0));
        assert!(matches!(stale, Err(RepositoryError::Concurrency(_))));

        let v2 = repo.save(&stock, ExpectedVersion::from_loaded(stock.version())).unwrap();
        assert_eq!(v2, 2);
        assert_eq!(repo.find_by_sku(tenant, stock.sku()).unwrap().unwrap().version(), 2);
    }

    #[test]
    fn second_create_of_the_same_sku_is_a_duplicate() {
        let repo = InMemoryStockRepository::new();
        let tenant = TenantId::new();
        repo.save(&item(tenant, "SKU-1"), ExpectedVersion::NoRecord).unwrap();

        let again = repo.save(&item(tenant, "SKU-1"), ExpectedVersion::NoRecord);
        assert!(matches!(again, Err(RepositoryError::Duplicate(_))));
    }

    #[test]
    fn tenants_do_not_see_each_other() {
        let repo = InMemoryStockRepository::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        repo.save(&item(a, "SKU-1"), ExpectedVersion::NoRecord).unwrap();
        repo.save(&item(b, "SKU-1"), ExpectedVersion::NoRecord).unwrap();
        repo.save(&item(b, "SKU-2"), ExpectedVersion::NoRecord).unwrap();

        assert_eq!(repo.find_all(a).unwrap().len(), 1);
        assert_eq!(repo.find_all(b).unwrap().len(), 2);
        assert!(repo.find_by_sku(a, &Sku::new("SKU-2").unwrap()).unwrap().is_none());
    }

    #[test]
    fn delete_is_refused_while_stock_remains() {
        let repo = InMemoryStockRepository::new();
        let tenant = TenantId::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut stock = item(tenant, "SKU-1");
        stock
            .receive_stock(
                StockReceipt {
                    location_id: "A-01".into(),
                    zone: "A".into(),
                    address: None,
                    quantity: 3,
                    reference_id: "PO-1".into(),
                    received_by: "receiver".into(),
                },
                now,
            )
            .unwrap();
        repo.save(&stock, ExpectedVersion::NoRecord).unwrap();

        let refused = repo.delete(tenant, stock.sku());
        assert!(matches!(refused, Err(RepositoryError::Conflict(_))));

        repo.save(&item(tenant, "SKU-EMPTY"), ExpectedVersion::NoRecord).unwrap();
        repo.delete(tenant, &Sku::new("SKU-EMPTY").unwrap()).unwrap();
        assert_eq!(
            repo.delete(tenant, &Sku::new("SKU-EMPTY").unwrap()),
            Err(RepositoryError::NotFound)
        );
    }

    #[test]
    fn location_and_order_lookups_scan_the_tenant() {
        let repo = InMemoryStockRepository::new();
        let tenant = TenantId::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut stock = item(tenant, "SKU-1");
        stock
            .receive_stock(
                StockReceipt {
                    location_id: "A-01".into(),
                    zone: "A".into(),
                    address: None,
                    quantity: 30,
                    reference_id: "PO-1".into(),
                    received_by: "receiver".into(),
                },
                now,
            )
            .unwrap();
        stock.reserve("ORD-9", "A-01", 4, now).unwrap();
        repo.save(&stock, ExpectedVersion::NoRecord).unwrap();
        repo.save(&item(tenant, "SKU-2"), ExpectedVersion::NoRecord).unwrap();

        assert_eq!(repo.find_by_location(tenant, "A-01").unwrap().len(), 1);
        assert_eq!(repo.find_by_zone(tenant, "A").unwrap().len(), 1);
        assert_eq!(repo.find_by_order(tenant, "ORD-9").unwrap().len(), 1);
        assert!(repo.find_by_order(tenant, "ORD-0").unwrap().is_empty());
        // SKU-2 holds nothing, so it sits at or below its reorder point.
        let low: Vec<_> = repo.find_low_stock(tenant).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].sku().as_str(), "SKU-2");
    }

    #[test]
    fn stored_copies_carry_no_pending_facts() {
        let repo = InMemoryStockRepository::new();
        let tenant = TenantId::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut stock = item(tenant, "SKU-1");
        stock
            .receive_stock(
                StockReceipt {
                    location_id: "A-01".into(),
                    zone: "A".into(),
                    address: None,
                    quantity: 1,
                    reference_id: "PO-1".into(),
                    received_by: "receiver".into(),
                },
                now,
            )
            .unwrap();
        assert!(!stock.pending_facts().is_empty());
        repo.save(&stock, ExpectedVersion::NoRecord).unwrap();

        let loaded = repo.find_by_sku(tenant, stock.sku()).unwrap().unwrap();
        assert!(loaded.pending_facts().is_empty());
    }

    #[test]
    fn records_are_versioned_per_record() {
        let repo: InMemoryRecordStore<ReservationRecord> = InMemoryRecordStore::new();
        let tenant = TenantId::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut stock = item(tenant, "SKU-1");
        stock
            .receive_stock(
                StockReceipt {
                    location_id: "A-01".into(),
                    zone: "A".into(),
                    address: None,
                    quantity: 10,
                    reference_id: "PO-1".into(),
                    received_by: "receiver".into(),
                },
                now,
            )
            .unwrap();
        let id = stock.reserve("ORD-1", "A-01", 2, now).unwrap();
        let mut record = ReservationRecord::from_embedded(
            stock.scope().clone(),
            stock.sku().clone(),
            stock.reservation(id).unwrap(),
            "clerk",
        );

        let v = repo.save(&record, ExpectedVersion::from_loaded(record.version())).unwrap();
        record.set_version(v);
        record.cancel("clerk", "changed mind", now).unwrap();
        assert_eq!(repo.save(&record, ExpectedVersion::from_loaded(record.version())).unwrap(), 2);

        assert_eq!(repo.find_by_order(tenant, "ORD-1").unwrap().len(), 1);
        assert!(repo.find_active_by_sku(tenant, stock.sku()).unwrap().is_empty());
        assert!(repo.find_by_id(TenantId::new(), &id).unwrap().is_none());
    }
}
