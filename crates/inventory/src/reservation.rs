//! Soft reservations: the embedded fast-read copy and the persisted record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{Entity, TenantId};
use stockflow_events::TenantScoped;

use crate::error::StockError;
use crate::scope::{Sku, StockScope};

stockflow_core::uuid_id!(
    /// Identifier of a soft reservation (shared by the embedded copy and the record).
    ReservationId
);

/// Soft reservations expire after this long unless extended.
pub const RESERVATION_TTL_HOURS: i64 = 24;

pub fn default_expiry(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(RESERVATION_TTL_HOURS)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Staged,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Fulfilled | ReservationStatus::Cancelled | ReservationStatus::Expired
        )
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Staged => "staged",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Reservation as embedded in the stock aggregate.
///
/// `quantity` is the amount still held; partial picks reduce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at <= now
    }
}

/// Independently persisted reservation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: ReservationId,
    pub scope: StockScope,
    pub sku: Sku,
    pub order_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub staged_at: Option<DateTime<Utc>>,
    pub staged_by: Option<String>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    version: u64,
}

impl ReservationRecord {
    /// Mirror an embedded reservation into a new record.
    pub fn from_embedded(
        scope: StockScope,
        sku: Sku,
        reservation: &Reservation,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: reservation.id,
            scope,
            sku,
            order_id: reservation.order_id.clone(),
            location_id: reservation.location_id.clone(),
            quantity: reservation.quantity,
            status: reservation.status,
            created_by: created_by.into(),
            created_at: reservation.created_at,
            expires_at: reservation.expires_at,
            staged_at: None,
            staged_by: None,
            fulfilled_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            updated_at: reservation.created_at,
            version: 0,
        }
    }

    fn require(&self, allowed: &[ReservationStatus]) -> Result<(), StockError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(StockError::InvalidReservationStatus(self.status))
        }
    }

    pub fn mark_staged(&mut self, staged_by: impl Into<String>, now: DateTime<Utc>) -> Result<(), StockError> {
        self.require(&[ReservationStatus::Active])?;
        self.status = ReservationStatus::Staged;
        self.staged_by = Some(staged_by.into());
        self.staged_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Put a staged reservation back to active (stage compensation).
    pub fn revert_staged(&mut self, now: DateTime<Utc>) -> Result<(), StockError> {
        self.require(&[ReservationStatus::Staged])?;
        self.status = ReservationStatus::Active;
        self.staged_by = None;
        self.staged_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_fulfilled(&mut self, now: DateTime<Utc>) -> Result<(), StockError> {
        self.require(&[ReservationStatus::Active, ReservationStatus::Staged])?;
        self.status = ReservationStatus::Fulfilled;
        self.fulfilled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record a (partial) pick against an active reservation.
    pub fn record_pick(&mut self, remaining: i64, now: DateTime<Utc>) -> Result<(), StockError> {
        self.require(&[ReservationStatus::Active])?;
        if remaining <= 0 {
            return self.mark_fulfilled(now);
        }
        self.quantity = remaining;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(
        &mut self,
        cancelled_by: impl Into<String>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        self.require(&[ReservationStatus::Active, ReservationStatus::Staged])?;
        self.status = ReservationStatus::Cancelled;
        self.cancelled_by = Some(cancelled_by.into());
        self.cancel_reason = Some(reason.into());
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_expired(&mut self, now: DateTime<Utc>) -> Result<(), StockError> {
        self.require(&[ReservationStatus::Active])?;
        self.status = ReservationStatus::Expired;
        self.updated_at = now;
        Ok(())
    }

    pub fn extend_expiration(&mut self, new_expiry: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), StockError> {
        self.require(&[ReservationStatus::Active])?;
        if new_expiry <= self.expires_at {
            return Err(StockError::InvalidExpiry);
        }
        self.expires_at = new_expiry;
        self.updated_at = now;
        Ok(())
    }

    /// Shrink the held quantity after a stock write-off; zero cancels.
    pub fn apply_write_off(&mut self, remaining: i64, now: DateTime<Utc>) -> Result<(), StockError> {
        if remaining <= 0 {
            return self.cancel("system", "stock shortage", now);
        }
        self.require(&[ReservationStatus::Active])?;
        self.quantity = remaining;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for ReservationRecord {
    type Id = ReservationId;

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

impl TenantScoped for ReservationRecord {
    fn tenant_id(&self) -> TenantId {
        self.scope.tenant_id
    }
}
