//! The fact type handed to the publisher.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_accounting::InventoryValued;
use stockflow_core::{AggregateId, TenantId};
use stockflow_events::{Event, EventEnvelope};
use stockflow_inventory::{Sku, StockFact};

/// Every fact the engine publishes: stock movements and valuation changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "fact")]
pub enum EngineFact {
    Stock(StockFact),
    Valuation(InventoryValued),
}

impl EngineFact {
    pub fn sku(&self) -> &Sku {
        match self {
            EngineFact::Stock(fact) => fact.sku(),
            EngineFact::Valuation(fact) => &fact.sku,
        }
    }

    pub fn as_stock(&self) -> Option<&StockFact> {
        match self {
            EngineFact::Stock(fact) => Some(fact),
            EngineFact::Valuation(_) => None,
        }
    }
}

impl Event for EngineFact {
    fn event_type(&self) -> &'static str {
        match self {
            EngineFact::Stock(fact) => fact.event_type(),
            EngineFact::Valuation(fact) => fact.event_type(),
        }
    }

    fn version(&self) -> u32 {
        match self {
            EngineFact::Stock(fact) => fact.version(),
            EngineFact::Valuation(fact) => fact.version(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EngineFact::Stock(fact) => fact.occurred_at(),
            EngineFact::Valuation(fact) => fact.occurred_at(),
        }
    }
}

impl From<StockFact> for EngineFact {
    fn from(fact: StockFact) -> Self {
        EngineFact::Stock(fact)
    }
}

impl From<InventoryValued> for EngineFact {
    fn from(fact: InventoryValued) -> Self {
        EngineFact::Valuation(fact)
    }
}

/// Per-aggregate envelope sequence numbers, starting at 1.
#[derive(Debug, Default)]
pub(crate) struct Sequences {
    next: Mutex<HashMap<(TenantId, AggregateId), u64>>,
}

impl Sequences {
    /// Wrap `facts` in envelopes numbered after the aggregate's last one.
    pub(crate) fn wrap(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        facts: impl IntoIterator<Item = EngineFact>,
    ) -> Vec<EventEnvelope<EngineFact>> {
        // The map holds plain counters, so a poisoned lock is still usable.
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let last = next.entry((tenant_id, aggregate_id)).or_insert(0);
        facts
            .into_iter()
            .map(|fact| {
                *last += 1;
                EventEnvelope::wrap(tenant_id, aggregate_id, aggregate_type, *last, fact)
            })
            .collect()
    }
}
