//! Cross-tab change notification.
//!
//! A [`ChangeChannel`] carries payload-free "something changed" signals between
//! independent client stores that share the same storage. Receivers always re-read
//! storage; the signal itself means nothing beyond "look again".
//!
//! [`BroadcastHub`] is the in-process transport: one `tokio::sync::broadcast`
//! channel per topic. Every [`ChannelEndpoint`] has its own identity and never
//! receives its own posts, like a page-level broadcast channel.
//!
//! Delivery has two modes:
//! - **pull** (default): the owner drains pending signals with [`ChangeChannel::drain`].
//! - **push**: after [`ChangeChannel::on_message`] installs a handler, every foreign
//!   post calls it synchronously from the publisher, and `drain` reports nothing.
//!   Transports that cannot call back keep the default `on_message`, which refuses.
//!
//! When no transport is available the client uses [`NoopChannel`].

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use uuid::Uuid;

/// Per-topic buffer size. Lagging receivers collapse missed signals into one.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A unique identifier for a channel endpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(Uuid);

impl EndpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback run for each foreign signal on a push-mode endpoint.
pub type SignalHandler = Arc<dyn Fn() + Send + Sync>;

/// One endpoint on a topic.
pub trait ChangeChannel: Send + Sync {
    /// Posts a change signal to every other endpoint on the topic.
    fn publish(&self);

    /// Consumes pending signals from other endpoints and returns how many arrived.
    fn drain(&self) -> usize;

    /// Switches the endpoint to push delivery. Returns `false` when the transport
    /// cannot call back, in which case the endpoint stays pull-based.
    fn on_message(&self, handler: SignalHandler) -> bool {
        let _ = handler;
        false
    }
}

/// Something that can open endpoints by topic.
pub trait BroadcastTransport: Send + Sync {
    fn open(&self, topic: &str) -> Box<dyn ChangeChannel>;
}

/// Channel used when no transport exists. Publishes go nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChannel;

impl ChangeChannel for NoopChannel {
    fn publish(&self) {}

    fn drain(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy)]
struct Signal {
    source: EndpointId,
}

type Handlers = Arc<Mutex<Vec<(EndpointId, SignalHandler)>>>;

#[derive(Clone)]
struct Topic {
    tx: broadcast::Sender<Signal>,
    handlers: Handlers,
}

/// In-process broadcast transport keyed by topic.
#[derive(Default)]
pub struct BroadcastHub {
    topics: Mutex<HashMap<String, Topic>>,
}

impl Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("BroadcastHub")
            .field("topics", &topics.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new endpoint on `topic`. It only sees signals posted after this call.
    pub fn endpoint(&self, topic: &str) -> ChannelEndpoint {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let Topic { tx, handlers } = topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic {
                tx: broadcast::channel(DEFAULT_CHANNEL_CAPACITY).0,
                handlers: Arc::default(),
            })
            .clone();
        let rx = tx.subscribe();

        ChannelEndpoint {
            id: EndpointId::new(),
            topic: topic.to_string(),
            tx,
            rx: Mutex::new(rx),
            handlers,
            pushed: AtomicBool::new(false),
        }
    }
}

impl BroadcastTransport for BroadcastHub {
    fn open(&self, topic: &str) -> Box<dyn ChangeChannel> {
        Box::new(self.endpoint(topic))
    }
}

/// An endpoint opened on a [`BroadcastHub`].
pub struct ChannelEndpoint {
    id: EndpointId,
    topic: String,
    tx: broadcast::Sender<Signal>,
    rx: Mutex<broadcast::Receiver<Signal>>,
    handlers: Handlers,
    pushed: AtomicBool,
}

impl Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("pushed", &self.pushed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ChannelEndpoint {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn lock_handlers(&self) -> MutexGuard<'_, Vec<(EndpointId, SignalHandler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChannelEndpoint {
    fn drop(&mut self) {
        let id = self.id;
        self.lock_handlers().retain(|(owner, _)| *owner != id);
    }
}

impl ChangeChannel for ChannelEndpoint {
    fn publish(&self) {
        // send() only fails when there are no receivers, and this endpoint is one.
        let _ = self.tx.send(Signal { source: self.id });

        let targets: Vec<SignalHandler> = self
            .lock_handlers()
            .iter()
            .filter(|(owner, _)| *owner != self.id)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in targets {
            handler();
        }
    }

    fn drain(&self) -> usize {
        let pushed = self.pushed.load(Ordering::Acquire);
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut received = 0;
        loop {
            match rx.try_recv() {
                // Already delivered through the handler.
                Ok(_) if pushed => {}
                Err(TryRecvError::Lagged(_)) if pushed => {}
                Ok(signal) if signal.source == self.id => {}
                Ok(_) => received += 1,
                Err(TryRecvError::Lagged(skipped)) => {
                    log::debug!("channel {}: lagged by {skipped} signals", self.topic);
                    received += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        received
    }

    fn on_message(&self, handler: SignalHandler) -> bool {
        let mut handlers = self.lock_handlers();
        handlers.retain(|(owner, _)| *owner != self.id);
        handlers.push((self.id, handler));
        self.pushed.store(true, Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn endpoint_does_not_receive_own_posts() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("t");
        a.publish();
        assert_eq!(a.drain(), 0);
    }

    #[test]
    fn other_endpoints_on_topic_receive_each_post() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("t");
        let b = hub.endpoint("t");
        let c = hub.endpoint("t");

        a.publish();
        a.publish();
        assert_eq!(b.drain(), 2);
        assert_eq!(c.drain(), 2);
        assert_eq!(b.drain(), 0);
    }

    #[test]
    fn topics_are_isolated() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("consentify:one");
        let b = hub.endpoint("consentify:two");
        a.publish();
        assert_eq!(b.drain(), 0);
    }

    #[test]
    fn late_endpoint_misses_earlier_posts() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("t");
        a.publish();
        let b = hub.endpoint("t");
        assert_eq!(b.drain(), 0);
        assert_eq!(b.topic(), "t");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn lagging_receiver_still_sees_a_signal() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("t");
        let b = hub.endpoint("t");
        for _ in 0..(DEFAULT_CHANNEL_CAPACITY * 2) {
            a.publish();
        }
        assert!(b.drain() >= 1);
        assert_eq!(b.drain(), 0);
    }

    #[test]
    fn transport_opens_boxed_endpoints() {
        let hub = BroadcastHub::new();
        let a = hub.open("t");
        let b = hub.open("t");
        a.publish();
        assert_eq!(b.drain(), 1);
    }

    #[test]
    fn noop_channel_is_silent() {
        let ch = NoopChannel;
        ch.publish();
        assert_eq!(ch.drain(), 0);
        assert!(!ch.on_message(Arc::new(|| {})));
    }

    fn counting_handler() -> (Arc<AtomicUsize>, SignalHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn push_endpoint_is_called_by_foreign_posts_only() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("t");
        let b = hub.endpoint("t");
        let (count, handler) = counting_handler();
        assert!(b.on_message(handler));

        a.publish();
        a.publish();
        b.publish();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(b.drain(), 0);
    }

    #[test]
    fn push_and_pull_endpoints_mix_on_one_topic() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("t");
        let pull = hub.endpoint("t");
        let push = hub.endpoint("t");
        let (count, handler) = counting_handler();
        push.on_message(handler);

        a.publish();
        assert_eq!(pull.drain(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replacing_the_handler_keeps_one_registration() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("t");
        let b = hub.endpoint("t");
        let (first, h1) = counting_handler();
        let (second, h2) = counting_handler();
        b.on_message(h1);
        b.on_message(h2);

        a.publish();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_endpoint_stops_receiving_pushes() {
        let hub = BroadcastHub::new();
        let a = hub.endpoint("t");
        let b = hub.endpoint("t");
        let (count, handler) = counting_handler();
        b.on_message(handler);

        drop(b);
        a.publish();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
