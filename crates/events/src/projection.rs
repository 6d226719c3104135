use crate::{Event, EventEnvelope};

/// A projection builds a read model from published facts.
///
/// Projections implement the **CQRS read model pattern**: the write side owns
/// the truth, the read model is a denormalized, disposable, eventually
/// consistent view of it.
///
/// ## Idempotency
///
/// Applying the same envelope twice must leave the read model unchanged.
/// Implementations track the last applied `sequence_number` per aggregate
/// and ignore anything at or below it.
///
/// ## Tenant Isolation
///
/// The envelope's `tenant_id` scopes every update. A payload that claims a
/// different tenant than its envelope must be rejected.
///
/// ## Errors
///
/// Errors are returned to the caller, which on the write path logs and
/// swallows them: a projection failure never fails a stock mutation.
pub trait Projection {
    type Ev: Event;
    type Error: core::fmt::Debug + core::fmt::Display;

    /// Apply a single envelope to the read model.
    fn apply(&self, envelope: &EventEnvelope<Self::Ev>) -> Result<(), Self::Error>;
}
