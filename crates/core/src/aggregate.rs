//! Aggregate root trait and optimistic concurrency expectations.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// Aggregates here are state-stored: they mutate in memory, accumulate facts,
/// and are persisted as a whole document guarded by `version()`.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Persisted version of the aggregate (0 = never saved).
    ///
    /// Incremented by the repository on every successful save.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (migrations, administrative repair).
    Any,
    /// The record must not exist yet.
    NoRecord,
    /// Require the stored record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation derived from a loaded record's version.
    pub fn from_loaded(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::NoRecord
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    /// `actual` is `None` when the store holds no record.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::NoRecord, None) => true,
            (ExpectedVersion::NoRecord, Some(_)) => false,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            (ExpectedVersion::Exact(_), None) => false,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_expects_no_record() {
        assert_eq!(ExpectedVersion::from_loaded(0), ExpectedVersion::NoRecord);
        assert!(ExpectedVersion::NoRecord.matches(None));
        assert!(!ExpectedVersion::NoRecord.matches(Some(1)));
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let err = ExpectedVersion::Exact(3).check(Some(4)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert!(ExpectedVersion::Exact(4).check(Some(4)).is_ok());
        assert!(ExpectedVersion::Any.check(None).is_ok());
    }
}
