use thiserror::Error;

use stockflow_core::DomainError;

use crate::allocation::AllocationStatus;
use crate::reservation::ReservationStatus;

/// Business-rule failures of the stock state machine.
///
/// Every variant leaves the aggregate untouched: operations validate fully
/// before mutating.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("insufficient stock at {location}: requested {requested}, available {available}")]
    InsufficientStock {
        location: String,
        requested: i64,
        available: i64,
    },

    #[error("location not found: {0}")]
    LocationNotFound(String),

    #[error("reservation not found")]
    ReservationNotFound,

    #[error("hard allocation not found")]
    AllocationNotFound,

    #[error("reservation already hard allocated")]
    AlreadyHardAllocated,

    #[error("invalid allocation status: expected {expected}, found {found}")]
    InvalidAllocationStatus {
        expected: AllocationStatus,
        found: AllocationStatus,
    },

    #[error("cannot return shipped inventory")]
    AlreadyShipped,

    #[error("actual quantity >= expected quantity, no shortage")]
    NoShortageToRecord,

    #[error("invalid reservation status: {0}")]
    InvalidReservationStatus(ReservationStatus),

    #[error("new expiry must be later than the current one")]
    InvalidExpiry,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StockError {
    /// Caller mistakes (bad input), as opposed to business-rule conflicts.
    pub fn is_validation(&self) -> bool {
        match self {
            StockError::InvalidQuantity(_) | StockError::InvalidExpiry => true,
            StockError::Domain(e) => e.is_validation(),
            _ => false,
        }
    }
}
