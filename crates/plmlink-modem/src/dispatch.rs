use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use plmlink_frame::{Frame, StandardTemplate};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::dedup::Deduplicator;
use crate::error::{ModemError, Result};
use crate::topic::Topic;

/// Where the dispatcher delivered a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Waiter,
    Subscriber,
    Unhandled,
    /// Suppressed as a repeat of a broadcast already delivered.
    Duplicate,
    /// No consumer, or the consumer's channel was full.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Waiter,
    Subscriber,
}

struct WaiterEntry {
    id: u64,
    template: Option<StandardTemplate>,
    tx: mpsc::Sender<Frame>,
}

struct SubscriberEntry {
    id: u64,
    tx: mpsc::Sender<Frame>,
    dedup: Option<Deduplicator>,
}

impl SubscriberEntry {
    fn is_repeat(&mut self, topic: &Topic, frame: &Frame) -> bool {
        let (Some(dedup), Frame::Standard(msg)) = (self.dedup.as_mut(), frame) else {
            return false;
        };
        if !msg.flags.msg_type.may_repeat() {
            return false;
        }
        !dedup.is_new(topic.as_str(), msg.flags.hops_left, Instant::now())
    }
}

#[derive(Default)]
struct Registry {
    waiters: HashMap<Topic, WaiterEntry>,
    subscribers: HashMap<Topic, SubscriberEntry>,
    unhandled: Option<mpsc::Sender<Frame>>,
    next_id: u64,
    closed: bool,
}

/// Routes each frame to exactly one consumer by topic.
///
/// At most one waiter and one subscriber may hold a topic at a time. A
/// frame goes to the waiter if its template accepts it, otherwise to the
/// subscriber, otherwise to the unhandled channel.
pub(crate) struct Dispatcher {
    registry: Mutex<Registry>,
    depth: usize,
}

impl Dispatcher {
    pub(crate) fn new(depth: usize) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry::default()),
            depth: depth.max(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register one waiter channel on every topic in `topics`.
    pub(crate) fn waiter(
        self: &Arc<Self>,
        topics: &[Topic],
        template: Option<StandardTemplate>,
    ) -> Result<Waiter> {
        let (tx, rx) = mpsc::channel(self.depth);
        let mut registry = self.lock();
        if registry.closed {
            return Err(ModemError::Shutdown);
        }
        if let Some(taken) = topics.iter().find(|t| registry.waiters.contains_key(*t)) {
            return Err(ModemError::TopicInUse(taken.to_string()));
        }

        let mut registrations = Vec::with_capacity(topics.len());
        for topic in topics {
            registry.next_id += 1;
            let id = registry.next_id;
            registry.waiters.insert(
                topic.clone(),
                WaiterEntry {
                    id,
                    template,
                    tx: tx.clone(),
                },
            );
            registrations.push(Registration {
                dispatcher: Arc::downgrade(self),
                slot: Slot::Waiter,
                topic: topic.clone(),
                id,
            });
        }
        trace!(?topics, "registered waiter");

        Ok(Waiter {
            rx,
            _registrations: registrations,
        })
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        topic: Topic,
        dedup: Option<Deduplicator>,
    ) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(self.depth);
        let mut registry = self.lock();
        if registry.closed {
            return Err(ModemError::Shutdown);
        }
        if registry.subscribers.contains_key(&topic) {
            return Err(ModemError::TopicInUse(topic.to_string()));
        }
        registry.next_id += 1;
        let id = registry.next_id;
        let deduplicated = dedup.is_some();
        registry
            .subscribers
            .insert(topic.clone(), SubscriberEntry { id, tx, dedup });
        debug!(%topic, deduplicated, "registered subscription");

        Ok(Subscription {
            rx,
            deduplicated,
            topic: topic.clone(),
            _registration: Registration {
                dispatcher: Arc::downgrade(self),
                slot: Slot::Subscriber,
                topic,
                id,
            },
        })
    }

    /// Replace the unhandled-frame channel.
    pub(crate) fn unhandled(&self) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(self.depth);
        let mut registry = self.lock();
        if !registry.closed {
            registry.unhandled = Some(tx);
        }
        rx
    }

    pub(crate) fn dispatch(&self, topic: &Topic, frame: Frame) -> Delivery {
        let mut registry = self.lock();

        if let Some(waiter) = registry.waiters.get(topic) {
            let accepted = waiter
                .template
                .as_ref()
                .is_none_or(|template| template.matches_frame(&frame));
            if accepted {
                match waiter.tx.try_send(frame) {
                    Ok(()) => return Delivery::Waiter,
                    Err(TrySendError::Full(_)) => {
                        warn!(%topic, "waiter channel full, dropping frame");
                        return Delivery::Dropped;
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }

        if let Some(subscriber) = registry.subscribers.get_mut(topic) {
            if subscriber.is_repeat(topic, &frame) {
                debug!(%topic, "dropping duplicate broadcast");
                return Delivery::Duplicate;
            }
            match subscriber.tx.try_send(frame) {
                Ok(()) => return Delivery::Subscriber,
                Err(TrySendError::Full(_)) => {
                    warn!(%topic, "subscriber channel full, dropping frame");
                    return Delivery::Dropped;
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }

        match registry.unhandled.as_ref().map(|tx| tx.try_send(frame)) {
            Some(Ok(())) => Delivery::Unhandled,
            _ => {
                trace!(%topic, "no consumer for frame");
                Delivery::Dropped
            }
        }
    }

    /// Drop every registration; pending waits observe shutdown.
    pub(crate) fn close(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        registry.waiters.clear();
        registry.subscribers.clear();
        registry.unhandled = None;
    }

    fn release(&self, slot: Slot, topic: &Topic, id: u64) {
        let mut registry = self.lock();
        match slot {
            Slot::Waiter => {
                if registry.waiters.get(topic).is_some_and(|w| w.id == id) {
                    registry.waiters.remove(topic);
                }
            }
            Slot::Subscriber => {
                if registry.subscribers.get(topic).is_some_and(|s| s.id == id) {
                    registry.subscribers.remove(topic);
                }
            }
        }
    }
}

/// Removes its topic registration when dropped.
struct Registration {
    dispatcher: Weak<Dispatcher>,
    slot: Slot,
    topic: Topic,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.release(self.slot, &self.topic, self.id);
        }
    }
}

/// Awaitable slot for frames on one or more topics.
///
/// Holds its topics until dropped; frames that arrive before
/// [`Waiter::recv`] is called are buffered.
pub struct Waiter {
    rx: mpsc::Receiver<Frame>,
    _registrations: Vec<Registration>,
}

impl Waiter {
    /// Wait up to `timeout` for the next frame.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Frame> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(ModemError::Shutdown),
            Err(_) => Err(ModemError::Timeout(timeout)),
        }
    }

    /// Wait until `deadline` for the next frame.
    pub async fn recv_until(&mut self, deadline: Instant) -> Result<Frame> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.recv(timeout).await
    }

    /// Take a buffered frame without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Discard buffered frames.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics: Vec<&Topic> = self._registrations.iter().map(|r| &r.topic).collect();
        f.debug_struct("Waiter").field("topics", &topics).finish()
    }
}

/// Long-lived stream of frames for one topic.
///
/// Ends when the modem shuts down. Subscriptions created from a
/// [`crate::DeduplicatesBroadcast`] listener never see repeated copies of
/// the same broadcast.
pub struct Subscription {
    rx: mpsc::Receiver<Frame>,
    deduplicated: bool,
    topic: Topic,
    _registration: Registration,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next frame, or `None` after shutdown.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("deduplicated", &self.deduplicated)
            .finish()
    }
}
