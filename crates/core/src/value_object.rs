//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: `Money`,
/// `Currency`, SKUs and location addresses. To "modify" one, build a new value.
///
/// Entities (reservations, allocations) are the opposite: two records with
/// the same ID are the same record even when their fields differ.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
