//! Inventory control domain.
//!
//! The per-SKU stock aggregate, its embedded reservation and hard-allocation
//! copies, the independently persisted satellite records, and the facts the
//! aggregate emits. Pure domain logic: no IO, no storage, no clocks (callers
//! pass `now`).

pub mod allocation;
pub mod error;
pub mod facts;
pub mod location;
pub mod reservation;
pub mod scope;
pub mod stock;
pub mod transaction;
pub mod velocity;

pub use allocation::{AllocationId, AllocationRecord, AllocationStatus, HardAllocation};
pub use error::StockError;
pub use facts::{DiscrepancyType, StockFact};
pub use location::StockLocation;
pub use reservation::{
    RESERVATION_TTL_HOURS, Reservation, ReservationId, ReservationRecord, ReservationStatus,
};
pub use scope::{LocationAddress, Sku, StockScope};
pub use stock::{
    PickOutcome, ReservationWriteOff, ShortageOutcome, ShortageReport, StockItem, StockItemId,
    StockReceipt,
};
pub use transaction::{InventoryTransaction, TransactionId, TransactionRecord, TransactionType};
pub use velocity::{StorageStrategy, VelocityClass};
