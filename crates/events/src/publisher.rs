//! Fact publication abstraction.
//!
//! The publisher is the hand-off point to an external broker. The engine only
//! guarantees that facts are handed over **after** the aggregate was persisted;
//! delivery, retries and wire encoding belong to the implementation.
//!
//! Publication is best-effort from the engine's point of view: a failed
//! publish never rolls back a committed stock mutation. Consumers must be
//! idempotent because a caller may re-publish after a partial failure.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to published facts (broadcast semantics).
///
/// Each subscription receives a copy of every message published after it was
/// created, in publication order.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Publisher interface: publish one, publish all.
pub trait EventPublisher<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    /// Publish in order, stopping at the first failure.
    fn publish_all(&self, messages: Vec<M>) -> Result<(), Self::Error> {
        for message in messages {
            self.publish(message)?;
        }
        Ok(())
    }
}

impl<M, P> EventPublisher<M> for Arc<P>
where
    P: EventPublisher<M> + ?Sized,
{
    type Error = P::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn publish_all(&self, messages: Vec<M>) -> Result<(), Self::Error> {
        (**self).publish_all(messages)
    }
}
