use chrono::{DateTime, Utc};

/// A domain-agnostic fact.
///
/// Facts are:
/// - **immutable** (they describe something that already happened)
/// - **versioned** (schema evolution for external consumers)
/// - collected on the aggregate and dispatched by the caller after persistence
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable fact name (e.g. "inventory.received").
    fn event_type(&self) -> &'static str;

    /// Schema version for this fact type.
    fn version(&self) -> u32;

    /// When the fact occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
