//! Read-side queries over the stock list views.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use stockflow_core::TenantId;
use stockflow_inventory::Sku;

use crate::config::EngineConfig;
use crate::read_model::{StockListView, TenantStore};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    UpdatedAt,
    AvailableQuantity,
    Sku,
    ProductName,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Filters, sort and page of a stock list request. Every filter is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockListQuery {
    pub sku: Option<Sku>,
    /// Case-insensitive substring of the product name.
    pub product_name: Option<String>,
    /// Case-insensitive substring of the sku or the product name.
    pub search: Option<String>,
    pub low_stock: Option<bool>,
    pub out_of_stock: Option<bool>,
    pub min_available: Option<i64>,
    pub max_available: Option<i64>,
    pub has_reservations: Option<bool>,
    pub location_id: Option<String>,
    pub zone: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl StockListQuery {
    fn matches(&self, view: &StockListView) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };

        self.sku.as_ref().is_none_or(|sku| &view.sku == sku)
            && self
                .product_name
                .as_deref()
                .is_none_or(|name| contains(&view.product_name, name))
            && self.search.as_deref().is_none_or(|term| {
                contains(view.sku.as_str(), term) || contains(&view.product_name, term)
            })
            && self.low_stock.is_none_or(|flag| view.is_low_stock == flag)
            && self.out_of_stock.is_none_or(|flag| view.is_out_of_stock == flag)
            && self.min_available.is_none_or(|min| view.available_quantity >= min)
            && self.max_available.is_none_or(|max| view.available_quantity <= max)
            && self
                .has_reservations
                .is_none_or(|flag| (view.active_reservations > 0) == flag)
            && self
                .location_id
                .as_deref()
                .is_none_or(|loc| view.locations.iter().any(|l| l == loc))
            && self.zone.as_deref().is_none_or(|zone| view.zones.iter().any(|z| z == zone))
    }

    fn compare(&self, a: &StockListView, b: &StockListView) -> Ordering {
        let ordering = match self.sort_by {
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::AvailableQuantity => a.available_quantity.cmp(&b.available_quantity),
            SortField::Sku => a.sku.cmp(&b.sku),
            SortField::ProductName => a
                .product_name
                .to_lowercase()
                .cmp(&b.product_name.to_lowercase()),
        };
        // Sku breaks ties so pages are stable.
        let ordering = ordering.then_with(|| a.sku.cmp(&b.sku));
        match self.sort_order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Stock counts by status for dashboards.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
}

/// Answers list/summary queries from the projected views only.
pub struct StockQueryService<S>
where
    S: TenantStore<Sku, StockListView>,
{
    store: S,
    default_limit: usize,
    max_limit: usize,
}

impl<S> StockQueryService<S>
where
    S: TenantStore<Sku, StockListView>,
{
    pub fn new(store: S, config: &EngineConfig) -> Self {
        Self {
            store,
            default_limit: config.default_page_limit,
            max_limit: config.max_page_limit,
        }
    }

    pub fn list(&self, tenant_id: TenantId, query: &StockListQuery) -> PagedResult<StockListView> {
        let limit = query.limit.unwrap_or(self.default_limit).min(self.max_limit).max(1);
        let offset = query.offset.unwrap_or(0);

        let mut views: Vec<StockListView> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|v| query.matches(v))
            .collect();
        views.sort_by(|a, b| query.compare(a, b));

        let total = views.len();
        let items: Vec<StockListView> = views.into_iter().skip(offset).take(limit).collect();
        PagedResult {
            has_more: offset + items.len() < total,
            items,
            total,
            limit,
            offset,
        }
    }

    pub fn summary(&self, tenant_id: TenantId, sku: &Sku) -> Option<StockListView> {
        self.store.get(tenant_id, sku)
    }

    /// Low-stock items, lowest availability first.
    pub fn low_stock(&self, tenant_id: TenantId, limit: Option<usize>, offset: Option<usize>) -> PagedResult<StockListView> {
        self.list(
            tenant_id,
            &StockListQuery {
                low_stock: Some(true),
                sort_by: SortField::AvailableQuantity,
                sort_order: SortOrder::Ascending,
                limit,
                offset,
                ..StockListQuery::default()
            },
        )
    }

    pub fn out_of_stock(&self, tenant_id: TenantId) -> Vec<StockListView> {
        let mut views: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|v| v.is_out_of_stock)
            .collect();
        views.sort_by(|a, b| a.sku.cmp(&b.sku));
        views
    }

    pub fn by_location(&self, tenant_id: TenantId, location_id: &str) -> Vec<StockListView> {
        let mut views: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|v| v.locations.iter().any(|l| l == location_id))
            .collect();
        views.sort_by(|a, b| a.sku.cmp(&b.sku));
        views
    }

    pub fn count_by_status(&self, tenant_id: TenantId) -> StatusCounts {
        self.store
            .list(tenant_id)
            .iter()
            .fold(StatusCounts::default(), |mut counts, v| {
                counts.total += 1;
                counts.low_stock += usize::from(v.is_low_stock);
                counts.out_of_stock += usize::from(v.is_out_of_stock);
                counts
            })
    }
}
