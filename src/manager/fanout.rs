//! Event fan-out to session subscribers
//!
//! Every process run gets an epoch. Pipelines publish with the epoch they were
//! started under, and stopping a session advances the epoch, so a pipeline
//! that is still draining after `stop()` can no longer reach subscribers.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::types::events::ClassifiedEvent;

struct FanoutInner {
    epoch: u64,
    subscribers: Vec<mpsc::UnboundedSender<ClassifiedEvent>>,
}

/// Subscriber list guarded together with the current epoch
pub struct Fanout {
    inner: Mutex<FanoutInner>,
}

impl Fanout {
    /// Create a fan-out with no subscribers at epoch 0
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FanoutInner {
                epoch: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        EventSubscription { rx }
    }

    /// Start a new epoch, invalidating every publisher of the previous one
    pub fn advance(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.epoch
    }

    /// Current epoch
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Deliver to every subscriber, regardless of epoch
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: ClassifiedEvent) -> usize {
        let mut inner = self.inner.lock();
        Self::deliver(&mut inner, event)
    }

    /// Deliver only if `epoch` is still current
    ///
    /// Returns `false` once the epoch has been superseded.
    pub fn publish_for(&self, epoch: u64, event: ClassifiedEvent) -> bool {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return false;
        }
        Self::deliver(&mut inner, event);
        true
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    fn deliver(inner: &mut FanoutInner, event: ClassifiedEvent) -> usize {
        // Dropped receivers are pruned here
        inner
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
        inner.subscribers.len()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a session subscription
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<ClassifiedEvent>,
}

impl EventSubscription {
    /// Wait for the next event
    ///
    /// Returns `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<ClassifiedEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is already queued
    pub fn try_recv(&mut self) -> Option<ClassifiedEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every queued event without waiting
    pub fn drain(&mut self) -> Vec<ClassifiedEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Stream for EventSubscription {
    type Item = ClassifiedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
