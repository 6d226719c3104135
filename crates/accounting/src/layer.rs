use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::Money;

stockflow_core::uuid_id!(
    /// Identifier of a cost layer.
    CostLayerId
);

/// A batch of units at one unit cost, in receipt order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLayer {
    pub id: CostLayerId,
    pub quantity: i64,
    pub unit_cost: Money,
    pub received_at: DateTime<Utc>,
    pub reference_id: String,
}
