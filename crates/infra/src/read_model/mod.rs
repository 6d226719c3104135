//! Tenant-isolated read model storage and the stock list projector.

pub mod stock_list;
pub mod tenant_store;

pub use stock_list::{ProjectionError, StockListView, StockProjector};
pub use tenant_store::{InMemoryTenantStore, TenantStore};
