//! `stockflow-core`: domain building blocks shared by the inventory engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, optimistic-concurrency versions and the
//! fixed-point `Money` value used by the valuation ledger.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId};
pub use money::{Currency, Money, MoneyError};
pub use value_object::ValueObject;
