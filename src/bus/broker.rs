//! Topic-addressed, best-effort fan-out of messages.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::message::Message;
use crate::server::metrics::BROKER_DROPPED;
use crate::Result;

/// Capacity of the incoming queue.
pub const INCOMING_CAPACITY: usize = 10;

/// Capacity of each subscriber's delivery buffer.
pub const SUBSCRIBER_CAPACITY: usize = 10;

/// Matches message topics against a subscription pattern.
#[derive(Debug, Clone)]
enum TopicMatcher {
    Any,
    Glob(GlobMatcher),
    Exact(String),
}

impl TopicMatcher {
    fn new(pattern: &str) -> Self {
        if pattern == "*" {
            return Self::Any;
        }
        match Glob::new(pattern) {
            Ok(glob) => Self::Glob(glob.compile_matcher()),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Invalid topic pattern, matching literally");
                Self::Exact(pattern.to_string())
            }
        }
    }

    fn is_match(&self, topic: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Glob(m) => m.is_match(topic),
            Self::Exact(t) => t == topic,
        }
    }
}

struct Subscriber {
    matcher: TopicMatcher,
    tx: mpsc::Sender<Message>,
}

type Subscribers = Arc<RwLock<HashMap<u64, Subscriber>>>;

/// A subscription handle: the id to unsubscribe with and the receiving end.
///
/// The receiver yields `None` once the subscription was removed or the
/// broker closed.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<Message>,
}

impl Subscription {
    /// Receive the next message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

/// In-process message broker.
///
/// Clone is cheap; all clones share one dispatch task and subscriber map.
#[derive(Clone)]
pub struct Broker {
    incoming: mpsc::Sender<Message>,
    subscribers: Subscribers,
    shutdown: CancellationToken,
}

impl Broker {
    /// Create a broker and start its dispatch task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (incoming, mut rx) = mpsc::channel::<Message>(INCOMING_CAPACITY);
        let subscribers: Subscribers = Arc::new(RwLock::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let dispatch_subscribers = Arc::clone(&subscribers);
        let dispatch_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = dispatch_shutdown.cancelled() => break,
                    m = rx.recv() => match m {
                        Some(m) => notify_all(&dispatch_subscribers, &m),
                        None => break,
                    },
                }
            }
            tracing::debug!("Message broker dispatch stopped");
        });

        Self {
            incoming,
            subscribers,
            shutdown,
        }
    }

    /// Publish a message without blocking.
    ///
    /// Returns `false` when the incoming queue is full or the broker is
    /// closed; the message is then discarded.
    pub fn accept(&self, topic: impl Into<String>, text: impl Into<String>) -> bool {
        self.accept_message(Message::new(topic, text))
    }

    /// Publish an already constructed message without blocking.
    pub fn accept_message(&self, m: Message) -> bool {
        match self.incoming.try_send(m) {
            Ok(()) => true,
            Err(TrySendError::Full(m)) => {
                BROKER_DROPPED.inc();
                tracing::warn!(message = %m, "Message buffer full, discarded");
                false
            }
            Err(TrySendError::Closed(m)) => {
                tracing::debug!(message = %m, "Broker closed, discarded");
                false
            }
        }
    }

    /// Subscribe to all topics matching a shell-style pattern.
    ///
    /// `*` subscribes to everything.
    #[must_use]
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut subscribers = self.subscribers.write();

        let mut id: u64 = rand::random();
        while subscribers.contains_key(&id) {
            id = rand::random();
        }
        subscribers.insert(
            id,
            Subscriber {
                matcher: TopicMatcher::new(pattern),
                tx,
            },
        );
        Subscription { id, rx }
    }

    /// Remove a subscription, closing its channel.
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.write().remove(&id);
    }

    /// Remove all subscriptions, closing their channels.
    pub fn unsubscribe_all(&self) {
        self.subscribers.write().clear();
    }

    /// Number of current subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Run `f` for every message matching `pattern`, in order.
    ///
    /// Errors returned by `f` are logged. Returns the subscription id;
    /// unsubscribing stops the handler.
    pub fn on<F, Fut>(&self, pattern: &str, f: F) -> u64
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut sub = self.subscribe(pattern);
        let id = sub.id;
        tokio::spawn(async move {
            while let Some(m) = sub.recv().await {
                let topic = m.topic.clone();
                if let Err(e) = f(m).await {
                    tracing::warn!(%topic, error = %e, "Message handler failed");
                }
            }
        });
        id
    }

    /// Forward every message from `other` into this broker as
    /// `namespace.<topic>`.
    ///
    /// Returns the subscription id on `other`.
    pub fn connect(&self, other: &Self, namespace: &str) -> u64 {
        let mut sub = other.subscribe("*");
        let id = sub.id;
        let this = self.clone();
        let namespace = namespace.to_string();
        tokio::spawn(async move {
            while let Some(m) = sub.recv().await {
                this.accept_message(m.namespaced(&namespace));
            }
        });
        id
    }

    /// Stop dispatching and close every subscriber's channel.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.unsubscribe_all();
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn notify_all(subscribers: &Subscribers, m: &Message) {
    let subscribers = subscribers.read();

    for (id, sub) in subscribers.iter() {
        if !sub.matcher.is_match(&m.topic) {
            continue;
        }
        match sub.tx.try_send(m.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                BROKER_DROPPED.inc();
                tracing::warn!(subscriber = id, topic = %m.topic, "Subscriber cannot receive, buffer full");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!(subscriber = id, "Subscriber gone");
            }
        }
    }
}
