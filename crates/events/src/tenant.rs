use stockflow_core::TenantId;

use crate::EventEnvelope;

/// Anything that belongs to exactly one tenant: envelopes, persisted records.
///
/// Stores use it to key records without knowing their concrete type;
/// subscribers pinned to one tenant use it to drop foreign messages.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}
