//! Fact plumbing: event trait, envelopes, publication and projections.
//!
//! Aggregates collect facts in memory; callers wrap them in envelopes after a
//! successful save and hand them to a publisher and to projections.

pub mod envelope;
pub mod event;
pub mod in_memory_publisher;
pub mod projection;
pub mod publisher;
pub mod tenant;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_publisher::{InMemoryPublisher, PublishError};
pub use projection::Projection;
pub use publisher::{EventPublisher, Subscription};
pub use tenant::TenantScoped;
