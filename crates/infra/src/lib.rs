//! Infrastructure layer: stores, coordination, the command surface and the
//! read side.
//!
//! Everything here is synchronous and in-memory. Storage sits behind the
//! repository traits, so a database-backed store only has to honour the same
//! versioning contract.

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod fact;
pub mod ledger_service;
pub mod query;
pub mod read_model;
pub mod repository;
pub mod service;

mod integration_tests;

pub use config::EngineConfig;
pub use coordinator::{Coordinator, CoordinatorError};
pub use fact::EngineFact;
pub use ledger_service::{LedgerService, ValuationError};
pub use query::{PagedResult, SortField, SortOrder, StatusCounts, StockListQuery, StockQueryService};
pub use read_model::{InMemoryTenantStore, StockListView, StockProjector, TenantStore};
pub use repository::{Repositories, RepositoryError};
pub use service::{ErrorKind, InventoryService, ServiceError};
