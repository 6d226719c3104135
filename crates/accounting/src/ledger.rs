use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateRoot, Currency, Money};
use stockflow_events::Event;
use stockflow_inventory::{Sku, StockScope};

use crate::account::{AccountBalance, AccountType, EntrySide};
use crate::entry::{LedgerEntry, LedgerEntryId, LedgerPosting, LedgerTransactionId, ReferenceType};
use crate::error::LedgerError;
use crate::layer::{CostLayer, CostLayerId};
use crate::valuation::ValuationMethod;

stockflow_core::uuid_id!(
    /// Identifier of a valuation ledger.
    InventoryLedgerId
);

/// Fact: the valuation of a SKU changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryValued {
    pub sku: Sku,
    pub method: ValuationMethod,
    pub total_quantity: i64,
    pub total_value: Money,
    pub average_unit_cost: Option<Money>,
    pub layer_count: usize,
    pub occurred_at: DateTime<Utc>,
}

impl Event for InventoryValued {
    fn event_type(&self) -> &'static str {
        "accounting.inventory-valued"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// What a posting moves between two accounts.
struct Movement<'a> {
    debit: AccountType,
    credit: AccountType,
    quantity: i64,
    value: Money,
    location_id: &'a str,
    reference_id: &'a str,
    reference_type: ReferenceType,
    description: String,
    actor: &'a str,
}

/// Aggregate root: InventoryLedger (one per SKU within a scope).
///
/// Cost layers are kept in receipt order. For FIFO and LIFO the ledger value
/// always equals the sum of the remaining layer values; weighted average keeps
/// layer quantities only for bookkeeping and values every unit at
/// `current_value / current_balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLedger {
    id: InventoryLedgerId,
    scope: StockScope,
    sku: Sku,
    method: ValuationMethod,
    currency: Currency,
    layers: Vec<CostLayer>,
    accounts: BTreeMap<AccountType, AccountBalance>,
    current_balance: i64,
    current_value: Money,
    last_unit_cost: Option<Money>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    #[serde(skip)]
    facts: Vec<InventoryValued>,
}

impl InventoryLedger {
    pub fn new(
        scope: StockScope,
        sku: Sku,
        method: ValuationMethod,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InventoryLedgerId::new(),
            scope,
            sku,
            method,
            currency,
            layers: Vec::new(),
            accounts: BTreeMap::new(),
            current_balance: 0,
            current_value: Money::zero(currency),
            last_unit_cost: None,
            created_at: now,
            updated_at: now,
            version: 0,
            facts: Vec::new(),
        }
    }

    pub fn scope(&self) -> &StockScope {
        &self.scope
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn method(&self) -> ValuationMethod {
        self.method
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn layers(&self) -> &[CostLayer] {
        &self.layers
    }

    pub fn current_balance(&self) -> i64 {
        self.current_balance
    }

    pub fn current_value(&self) -> Money {
        self.current_value
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `None` while the ledger holds no units.
    pub fn average_unit_cost(&self) -> Option<Money> {
        if self.current_balance <= 0 {
            return None;
        }
        self.current_value.divide(self.current_balance).ok()
    }

    pub fn account(&self, account: AccountType) -> AccountBalance {
        self.accounts
            .get(&account)
            .copied()
            .unwrap_or_else(|| AccountBalance::zero(self.currency))
    }

    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn pending_facts(&self) -> &[InventoryValued] {
        &self.facts
    }

    pub fn drain_facts(&mut self) -> Vec<InventoryValued> {
        std::mem::take(&mut self.facts)
    }

    /// Value a receipt: new layer, Dr Inventory / Cr GoodsInTransit.
    pub fn record_receiving(
        &mut self,
        quantity: i64,
        unit_cost: Money,
        location_id: &str,
        reference_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerPosting, LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        if unit_cost.currency() != self.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: self.currency,
                found: unit_cost.currency(),
            });
        }
        if unit_cost.is_zero() {
            return Err(LedgerError::ZeroUnitCost);
        }
        let value = unit_cost.multiply(quantity)?;
        let new_value = self.current_value.add(value)?;

        self.push_layer(quantity, unit_cost, reference_id, now);
        self.current_balance += quantity;
        self.current_value = new_value;
        Ok(self.post(
            Movement {
                debit: AccountType::Inventory,
                credit: AccountType::GoodsInTransit,
                quantity,
                value,
                location_id,
                reference_id,
                reference_type: ReferenceType::Receipt,
                description: format!("received {quantity} @ {unit_cost}"),
                actor,
            },
            now,
        ))
    }

    /// Relieve inventory into cost of goods sold.
    pub fn record_pick(
        &mut self,
        quantity: i64,
        location_id: &str,
        order_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerPosting, LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        if quantity > self.current_balance {
            return Err(LedgerError::InsufficientStock {
                requested: quantity,
                balance: self.current_balance,
            });
        }
        let value = self.consume(quantity)?;
        Ok(self.post(
            Movement {
                debit: AccountType::Cogs,
                credit: AccountType::Inventory,
                quantity,
                value,
                location_id,
                reference_id: order_id,
                reference_type: ReferenceType::Order,
                description: format!("picked {quantity} for {order_id}"),
                actor,
            },
            now,
        ))
    }

    /// Value a count correction. Gains are booked at the current average cost.
    pub fn record_adjustment(
        &mut self,
        delta: i64,
        reason: &str,
        location_id: &str,
        reference_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerPosting, LedgerError> {
        if delta == 0 {
            return Err(LedgerError::InvalidQuantity(0));
        }

        if delta > 0 {
            let unit_cost = self
                .average_unit_cost()
                .filter(Money::is_positive)
                .or(self.last_unit_cost)
                .ok_or(LedgerError::NoCostLayers)?;
            let value = unit_cost.multiply(delta)?;
            let new_value = self.current_value.add(value)?;

            self.push_layer(delta, unit_cost, reference_id, now);
            self.current_balance += delta;
            self.current_value = new_value;
            return Ok(self.post(
                Movement {
                    debit: AccountType::Inventory,
                    credit: AccountType::Adjustments,
                    quantity: delta,
                    value,
                    location_id,
                    reference_id,
                    reference_type: ReferenceType::Adjustment,
                    description: format!("adjustment +{delta}: {reason}"),
                    actor,
                },
                now,
            ));
        }

        let quantity = -delta;
        let value = self.consume(quantity)?;
        Ok(self.post(
            Movement {
                debit: AccountType::Adjustments,
                credit: AccountType::Inventory,
                quantity,
                value,
                location_id,
                reference_id,
                reference_type: ReferenceType::Adjustment,
                description: format!("adjustment -{quantity}: {reason}"),
                actor,
            },
            now,
        ))
    }

    fn push_layer(&mut self, quantity: i64, unit_cost: Money, reference_id: &str, now: DateTime<Utc>) {
        self.layers.push(CostLayer {
            id: CostLayerId::new(),
            quantity,
            unit_cost,
            received_at: now,
            reference_id: reference_id.to_string(),
        });
        self.last_unit_cost = Some(unit_cost);
    }

    /// Take `quantity` units out of the layers; returns the value removed.
    ///
    /// The plan is computed before anything is touched, so a failure leaves
    /// the ledger unchanged.
    fn consume(&mut self, quantity: i64) -> Result<Money, LedgerError> {
        if self.layers.is_empty() {
            return Err(LedgerError::NoCostLayers);
        }
        let layered: i64 = self.layers.iter().map(|l| l.quantity).sum();
        if layered < quantity || self.current_balance < quantity {
            return Err(LedgerError::InsufficientCostLayers { requested: quantity, layered });
        }

        let order: Vec<usize> = match self.method {
            ValuationMethod::Lifo => (0..self.layers.len()).rev().collect(),
            ValuationMethod::Fifo | ValuationMethod::WeightedAverage => (0..self.layers.len()).collect(),
        };
        let mut plan = Vec::new();
        let mut left = quantity;
        let mut layered_value = Money::zero(self.currency);
        for idx in order {
            if left == 0 {
                break;
            }
            let take = left.min(self.layers[idx].quantity);
            if take == 0 {
                continue;
            }
            layered_value = layered_value.add(self.layers[idx].unit_cost.multiply(take)?)?;
            plan.push((idx, take));
            left -= take;
        }

        let value = match self.method {
            ValuationMethod::WeightedAverage if quantity == self.current_balance => self.current_value,
            ValuationMethod::WeightedAverage => {
                self.current_value.divide(self.current_balance)?.multiply(quantity)?
            }
            ValuationMethod::Fifo | ValuationMethod::Lifo => layered_value,
        };
        let remaining_value = self.current_value.subtract(value)?;

        for (idx, take) in plan {
            self.layers[idx].quantity -= take;
        }
        self.layers.retain(|l| l.quantity > 0);
        self.current_balance -= quantity;
        self.current_value = remaining_value;
        Ok(value)
    }

    /// Book the debit/credit pair and queue the valuation fact.
    fn post(&mut self, movement: Movement<'_>, now: DateTime<Utc>) -> LedgerPosting {
        let transaction_id = LedgerTransactionId::new();
        let unit_cost = movement
            .value
            .divide(movement.quantity)
            .unwrap_or_else(|_| Money::zero(self.currency));

        let mut entries = Vec::with_capacity(2);
        for (account, side) in [
            (movement.debit, EntrySide::Debit),
            (movement.credit, EntrySide::Credit),
        ] {
            self.accounts
                .entry(account)
                .or_insert_with(|| AccountBalance::zero(self.currency))
                .post(side, movement.quantity, movement.value.amount_minor());
            entries.push(LedgerEntry {
                id: LedgerEntryId::new(),
                transaction_id,
                tenant_id: self.scope.tenant_id,
                sku: self.sku.clone(),
                account,
                side,
                quantity: movement.quantity,
                unit_cost,
                value: movement.value,
                running_balance: self.current_balance,
                running_value: self.current_value,
                location_id: (!movement.location_id.is_empty())
                    .then(|| movement.location_id.to_string()),
                reference_id: movement.reference_id.to_string(),
                reference_type: movement.reference_type,
                description: movement.description.clone(),
                created_at: now,
                created_by: movement.actor.to_string(),
            });
        }

        self.updated_at = now;
        self.facts.push(InventoryValued {
            sku: self.sku.clone(),
            method: self.method,
            total_quantity: self.current_balance,
            total_value: self.current_value,
            average_unit_cost: self.average_unit_cost(),
            layer_count: self.layers.len(),
            occurred_at: now,
        });
        LedgerPosting { transaction_id, entries }
    }
}

impl AggregateRoot for InventoryLedger {
    type Id = InventoryLedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
