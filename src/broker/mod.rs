//! In-process publish/subscribe broker with one topic per table.
//!
//! Each topic owns a bounded queue and a dispatcher thread. The dispatcher
//! takes one message at a time and fans it out to every listener before
//! taking the next, so dispatch order equals publish order and a slow
//! listener throttles the whole topic.
//!
//! Listeners must subscribe before the first publish. The run enforces this
//! with a start barrier; the topic enforces it by rejecting late
//! subscriptions.

use crate::cancel::{CancelToken, Cancelled, WAIT_SLICE};
use crate::row::Row;
use ahash::AHashMap;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default capacity of a topic's internal queue
pub const DEFAULT_TOPIC_CAPACITY: usize = 8192;

/// A message travelling through a topic or relay queue
#[derive(Debug, Clone)]
pub enum Message {
    Row(Arc<Row>),
    /// End of stream. Sent exactly once per topic.
    Poison,
}

impl Message {
    pub fn is_poison(&self) -> bool {
        matches!(self, Message::Poison)
    }
}

/// Outcome of handing a message to a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No room right now; retry with a blocking delivery
    Full,
    /// The consumer behind this listener has gone away
    Detached,
}

/// A fan-out target registered on a topic
pub trait Listener: Send + Sync {
    /// Deliver without blocking
    fn try_deliver(&self, message: &Message) -> Delivery;

    /// Deliver, blocking until there is room, the consumer detaches, or the
    /// run is cancelled
    fn deliver(&self, message: &Message, cancel: &CancelToken) -> Result<Delivery, Cancelled>;
}

/// Broker error types
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("cannot subscribe to topic '{0}' after publishing has started")]
    LateSubscription(String),

    #[error("topic '{0}' has no subscribers")]
    NoSubscribers(String),

    #[error("topic '{0}' is already closed")]
    Closed(String),

    #[error("failed to start dispatcher for topic '{topic}': {source}")]
    Spawn {
        topic: String,
        #[source]
        source: std::io::Error,
    },

    #[error("publish cancelled")]
    Cancelled,
}

impl From<Cancelled> for BrokerError {
    fn from(_: Cancelled) -> Self {
        BrokerError::Cancelled
    }
}

type ListenerList = Arc<RwLock<Vec<Arc<dyn Listener>>>>;

/// A named fan-out channel
pub struct Topic {
    name: String,
    sender: Sender<Message>,
    listeners: ListenerList,
    publishing: AtomicBool,
    closed: AtomicBool,
    cancel: CancelToken,
}

impl Topic {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a listener. Only legal before the first publish.
    pub fn subscribe(&self, listener: Arc<dyn Listener>) -> Result<(), BrokerError> {
        let mut listeners = self.listeners.write();
        if self.publishing.load(Ordering::SeqCst) {
            return Err(BrokerError::LateSubscription(self.name.clone()));
        }
        listeners.push(listener);
        Ok(())
    }

    pub fn has_subscribers(&self) -> bool {
        !self.listeners.read().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Enqueue a row, blocking while the queue is full
    pub fn publish(&self, row: Arc<Row>) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed(self.name.clone()));
        }
        self.publishing.store(true, Ordering::SeqCst);
        if !self.has_subscribers() {
            return Err(BrokerError::NoSubscribers(self.name.clone()));
        }

        let mut message = Message::Row(row);
        loop {
            self.cancel.check()?;
            match self.sender.send_timeout(message, WAIT_SLICE) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(m)) => message = m,
                // Dispatcher is gone; nothing left to deliver to
                Err(SendTimeoutError::Disconnected(_)) => return Ok(()),
            }
        }
    }

    /// Send the poison marker. Returns `false` if the topic was already closed.
    ///
    /// Keeps trying while the dispatcher makes progress; under cancellation
    /// the dispatcher drops blocked deliveries, so this always terminates.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.publishing.store(true, Ordering::SeqCst);

        let mut message = Message::Poison;
        loop {
            match self.sender.send_timeout(message, WAIT_SLICE) {
                Ok(()) | Err(SendTimeoutError::Disconnected(_)) => return true,
                Err(SendTimeoutError::Timeout(m)) => message = m,
            }
        }
    }
}

/// Where a worker sends its rows once the start barrier has released
#[derive(Clone)]
pub enum Publisher {
    Topic(Arc<Topic>),
    /// Stand-in for a table nobody subscribes to
    Null,
}

impl Publisher {
    pub fn publish(&self, row: &Arc<Row>) -> Result<(), BrokerError> {
        match self {
            Publisher::Topic(topic) => topic.publish(Arc::clone(row)),
            Publisher::Null => Ok(()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Publisher::Null)
    }
}

/// Per-run topic registry.
///
/// Owned by the run and passed to workers by reference. Dispatcher threads
/// hold only their queue receiver and a listener snapshot, never the topic.
pub struct Broker {
    topics: Mutex<AHashMap<String, Arc<Topic>>>,
    dispatchers: Mutex<Vec<(String, JoinHandle<u64>)>>,
    capacity: usize,
    cancel: CancelToken,
}

impl Broker {
    pub fn new(capacity: usize, cancel: CancelToken) -> Self {
        Self {
            topics: Mutex::new(AHashMap::new()),
            dispatchers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            cancel,
        }
    }

    /// Get or lazily create the topic for `name`
    pub fn topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        let mut topics = self.topics.lock();
        if let Some(topic) = topics.get(name) {
            return Ok(Arc::clone(topic));
        }

        let (sender, receiver) = bounded(self.capacity);
        let listeners: ListenerList = Arc::new(RwLock::new(Vec::new()));

        let handle = {
            let topic = name.to_string();
            let listeners = Arc::clone(&listeners);
            let cancel = self.cancel.clone();
            std::thread::Builder::new()
                .name(format!("topic-{}", name))
                .spawn(move || dispatch(&topic, receiver, listeners, cancel))
                .map_err(|source| BrokerError::Spawn {
                    topic: name.to_string(),
                    source,
                })?
        };

        let topic = Arc::new(Topic {
            name: name.to_string(),
            sender,
            listeners,
            publishing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: self.cancel.clone(),
        });

        self.dispatchers.lock().push((name.to_string(), handle));
        topics.insert(name.to_string(), Arc::clone(&topic));

        Ok(topic)
    }

    /// Existing topic for `name`, without creating one
    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.lock().get(name).cloned()
    }

    /// Publisher for a table: the real topic if anyone subscribed to it
    pub fn publisher(&self, name: &str) -> Publisher {
        match self.get(name) {
            Some(topic) if topic.has_subscribers() => Publisher::Topic(topic),
            _ => Publisher::Null,
        }
    }

    /// Poison the topic for `name` if it exists. At most once per topic.
    pub fn close(&self, name: &str) -> bool {
        match self.get(name) {
            Some(topic) => topic.close(),
            None => false,
        }
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every topic and join dispatchers, waiting at most `grace`.
    ///
    /// Dispatchers still running after the grace period are detached.
    pub fn shutdown(&self, grace: Duration) {
        let topics: Vec<Arc<Topic>> = self.topics.lock().values().cloned().collect();
        for topic in &topics {
            topic.close();
        }

        let deadline = Instant::now() + grace;
        let dispatchers = std::mem::take(&mut *self.dispatchers.lock());
        for (name, handle) in dispatchers {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                match handle.join() {
                    Ok(delivered) => {
                        tracing::debug!(topic = %name, messages = delivered, "dispatcher stopped")
                    }
                    Err(_) => tracing::error!(topic = %name, "dispatcher panicked"),
                }
            } else {
                tracing::warn!(topic = %name, "dispatcher still running after shutdown grace period");
            }
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if !self.dispatchers.get_mut().is_empty() {
            self.shutdown(Duration::ZERO);
        }
    }
}

/// Dispatcher loop for one topic. Returns the number of messages dispatched.
fn dispatch(
    name: &str,
    receiver: Receiver<Message>,
    listeners: ListenerList,
    cancel: CancelToken,
) -> u64 {
    let mut targets: Option<Vec<Arc<dyn Listener>>> = None;
    let mut dispatched = 0u64;

    while let Ok(message) = receiver.recv() {
        // Subscriptions are frozen once publishing starts
        let targets = targets.get_or_insert_with(|| listeners.read().clone());
        fan_out(name, &message, targets, &cancel);
        dispatched += 1;

        if message.is_poison() {
            break;
        }
    }

    dispatched
}

/// Two-phase fan-out: a non-blocking pass over every listener, then blocking
/// delivery to the ones that were full. Detached listeners are dropped.
fn fan_out(
    name: &str,
    message: &Message,
    targets: &mut Vec<Arc<dyn Listener>>,
    cancel: &CancelToken,
) {
    let mut pending = Vec::new();
    let mut detached = Vec::new();

    for (i, listener) in targets.iter().enumerate() {
        match listener.try_deliver(message) {
            Delivery::Delivered => {}
            Delivery::Full => pending.push(i),
            Delivery::Detached => detached.push(i),
        }
    }

    for i in pending {
        match targets[i].deliver(message, cancel) {
            Ok(Delivery::Detached) => detached.push(i),
            Ok(_) => {}
            Err(Cancelled) => {
                tracing::trace!(topic = %name, "dropping delivery to blocked listener after cancel");
            }
        }
    }

    if !detached.is_empty() {
        detached.sort_unstable();
        for i in detached.into_iter().rev() {
            targets.remove(i);
        }
        tracing::debug!(topic = %name, remaining = targets.len(), "listener detached");
    }
}

/// Poisons a table's topic when dropped, so every exit path ends the stream
pub struct PoisonGuard<'a> {
    broker: &'a Broker,
    topic: String,
}

impl<'a> PoisonGuard<'a> {
    pub fn new(broker: &'a Broker, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }
}

impl Drop for PoisonGuard<'_> {
    fn drop(&mut self) {
        self.broker.close(&self.topic);
    }
}
