//! In-memory publisher for tests/dev.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::publisher::{EventPublisher, Subscription};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Internal lock poisoning.
    #[error("publisher lock poisoned")]
    Poisoned,

    /// The broker refused the message (simulated outage).
    #[error("broker unavailable")]
    Unavailable,
}

/// In-memory pub/sub publisher.
///
/// - No IO / no async
/// - Keeps a copy of every published message for assertions
/// - Best-effort fan-out to subscribers
/// - Can be switched into an "unavailable" mode to exercise failure paths
#[derive(Debug)]
pub struct InMemoryPublisher<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
    published: Mutex<Vec<M>>,
    unavailable: AtomicBool,
}

impl<M> InMemoryPublisher<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker outage: every publish fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still yields a (silent) subscription.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

impl<M: Clone> InMemoryPublisher<M> {
    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<M> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl<M> Default for InMemoryPublisher<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl<M> EventPublisher<M> for InMemoryPublisher<M>
where
    M: Clone + Send + 'static,
{
    type Error = PublishError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable);
        }

        let mut subs = self.subscribers.lock().map_err(|_| PublishError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        self.published
            .lock()
            .map_err(|_| PublishError::Poisoned)?
            .push(message);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_in_publication_order() {
        let publisher = InMemoryPublisher::<u32>::new();
        let sub = publisher.subscribe();

        publisher.publish_all(vec![1, 2, 3]).unwrap();

        assert_eq!(sub.drain(), vec![1, 2, 3]);
        assert_eq!(publisher.published(), vec![1, 2, 3]);
    }

    #[test]
    fn unavailable_publisher_rejects_and_records_nothing() {
        let publisher = InMemoryPublisher::<u32>::new();
        publisher.set_unavailable(true);

        assert_eq!(publisher.publish(7), Err(PublishError::Unavailable));
        assert!(publisher.published().is_empty());

        publisher.set_unavailable(false);
        publisher.publish(8).unwrap();
        assert_eq!(publisher.published(), vec![8]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let publisher = InMemoryPublisher::<u32>::new();
        drop(publisher.subscribe());
        let live = publisher.subscribe();

        publisher.publish(1).unwrap();
        assert_eq!(live.try_recv().unwrap(), 1);
    }
}
