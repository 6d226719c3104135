//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Satellite records (reservations, allocations, transactions) are entities:
/// they are looked up and persisted by identity, independently of the stock
/// aggregate that created them.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Persisted version used for optimistic concurrency (0 = never saved).
    fn version(&self) -> u64;

    /// Record the version assigned by the store after a successful save.
    fn set_version(&mut self, version: u64);
}
