//! Hard allocations: physically staged stock for one reservation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{Entity, TenantId};
use stockflow_events::TenantScoped;

use crate::error::StockError;
use crate::reservation::ReservationId;
use crate::scope::{Sku, StockScope};

stockflow_core::uuid_id!(
    /// Identifier of a hard allocation.
    AllocationId
);

/// `staged -> packed -> shipped`, or `(staged | packed) -> returned`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Staged,
    Packed,
    Shipped,
    Returned,
}

impl AllocationStatus {
    pub fn is_active(self) -> bool {
        matches!(self, AllocationStatus::Staged | AllocationStatus::Packed)
    }
}

impl core::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            AllocationStatus::Staged => "staged",
            AllocationStatus::Packed => "packed",
            AllocationStatus::Shipped => "shipped",
            AllocationStatus::Returned => "returned",
        };
        f.write_str(s)
    }
}

fn require(found: AllocationStatus, expected: AllocationStatus) -> Result<(), StockError> {
    if found == expected {
        Ok(())
    } else {
        Err(StockError::InvalidAllocationStatus { expected, found })
    }
}

/// Checks shared by the embedded copy and the record for a return to shelf.
fn ensure_returnable(status: AllocationStatus) -> Result<(), StockError> {
    match status {
        AllocationStatus::Staged | AllocationStatus::Packed => Ok(()),
        AllocationStatus::Shipped => Err(StockError::AlreadyShipped),
        AllocationStatus::Returned => Err(StockError::InvalidAllocationStatus {
            expected: AllocationStatus::Staged,
            found: AllocationStatus::Returned,
        }),
    }
}

/// Hard allocation as embedded in the stock aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardAllocation {
    pub id: AllocationId,
    pub reservation_id: ReservationId,
    pub order_id: String,
    pub quantity: i64,
    pub source_location_id: String,
    pub staging_location_id: String,
    pub status: AllocationStatus,
    pub staged_by: String,
    pub packed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub packed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl HardAllocation {
    pub(crate) fn pack(&mut self, packed_by: &str, now: DateTime<Utc>) -> Result<(), StockError> {
        require(self.status, AllocationStatus::Staged)?;
        self.status = AllocationStatus::Packed;
        self.packed_by = Some(packed_by.to_string());
        self.packed_at = Some(now);
        Ok(())
    }

    pub(crate) fn ship(&mut self, now: DateTime<Utc>) -> Result<(), StockError> {
        require(self.status, AllocationStatus::Packed)?;
        self.status = AllocationStatus::Shipped;
        self.shipped_at = Some(now);
        Ok(())
    }

    pub(crate) fn check_returnable(&self) -> Result<(), StockError> {
        ensure_returnable(self.status)
    }
}

/// Independently persisted hard-allocation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub id: AllocationId,
    pub reservation_id: ReservationId,
    pub scope: StockScope,
    pub sku: Sku,
    pub order_id: String,
    pub quantity: i64,
    pub source_location_id: String,
    pub staging_location_id: String,
    pub status: AllocationStatus,
    pub staged_by: String,
    pub staged_at: DateTime<Utc>,
    pub packed_by: Option<String>,
    pub packed_at: Option<DateTime<Utc>>,
    pub shipped_by: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub returned_by: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,
    pub return_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    version: u64,
}

impl AllocationRecord {
    pub fn from_embedded(scope: StockScope, sku: Sku, allocation: &HardAllocation) -> Self {
        Self {
            id: allocation.id,
            reservation_id: allocation.reservation_id,
            scope,
            sku,
            order_id: allocation.order_id.clone(),
            quantity: allocation.quantity,
            source_location_id: allocation.source_location_id.clone(),
            staging_location_id: allocation.staging_location_id.clone(),
            status: allocation.status,
            staged_by: allocation.staged_by.clone(),
            staged_at: allocation.created_at,
            packed_by: allocation.packed_by.clone(),
            packed_at: allocation.packed_at,
            shipped_by: None,
            shipped_at: allocation.shipped_at,
            returned_by: None,
            returned_at: allocation.returned_at,
            return_reason: None,
            updated_at: allocation.created_at,
            version: 0,
        }
    }

    pub fn mark_packed(&mut self, packed_by: impl Into<String>, now: DateTime<Utc>) -> Result<(), StockError> {
        require(self.status, AllocationStatus::Staged)?;
        self.status = AllocationStatus::Packed;
        self.packed_by = Some(packed_by.into());
        self.packed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_shipped(&mut self, shipped_by: impl Into<String>, now: DateTime<Utc>) -> Result<(), StockError> {
        require(self.status, AllocationStatus::Packed)?;
        self.status = AllocationStatus::Shipped;
        self.shipped_by = Some(shipped_by.into());
        self.shipped_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn return_to_shelf(
        &mut self,
        returned_by: impl Into<String>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        ensure_returnable(self.status)?;
        self.status = AllocationStatus::Returned;
        self.returned_by = Some(returned_by.into());
        self.return_reason = Some(reason.into());
        self.returned_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for AllocationRecord {
    type Id = AllocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl TenantScoped for AllocationRecord {
    fn tenant_id(&self) -> TenantId {
        self.scope.tenant_id
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use stockflow_core::TenantId;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    fn record() -> AllocationRecord {
        let embedded = HardAllocation {
            id: AllocationId::new(),
            reservation_id: ReservationId::new(),
            order_id: "ORD-1".to_string(),
            quantity: 3,
            source_location_id: "LOC-1".to_string(),
            staging_location_id: "STAGE-1".to_string(),
            status: AllocationStatus::Staged,
            staged_by: "picker".to_string(),
            packed_by: None,
            created_at: now(),
            packed_at: None,
            shipped_at: None,
            returned_at: None,
        };
        AllocationRecord::from_embedded(
            StockScope::new(TenantId::new(), "FAC-1", "WH-1"),
            Sku::new("SKU-1").unwrap(),
            &embedded,
        )
    }

    #[test]
    fn ship_requires_packed() {
        let mut r = record();
        assert_eq!(
            r.mark_shipped("carrier", now()),
            Err(StockError::InvalidAllocationStatus {
                expected: AllocationStatus::Packed,
                found: AllocationStatus::Staged,
            })
        );
        r.mark_packed("packer", now()).unwrap();
        r.mark_shipped("carrier", now()).unwrap();
        assert_eq!(r.status, AllocationStatus::Shipped);
    }

    #[test]
    fn shipped_allocation_cannot_return() {
        let mut r = record();
        r.mark_packed("packer", now()).unwrap();
        r.mark_shipped("carrier", now()).unwrap();
        assert_eq!(
            r.return_to_shelf("picker", "damaged box", now()),
            Err(StockError::AlreadyShipped)
        );
    }

    #[test]
    fn packed_allocation_can_return() {
        let mut r = record();
        r.mark_packed("packer", now()).unwrap();
        r.return_to_shelf("picker", "order cancelled", now()).unwrap();
        assert_eq!(r.status, AllocationStatus::Returned);
        assert_eq!(r.return_reason.as_deref(), Some("order cancelled"));
    }
}
