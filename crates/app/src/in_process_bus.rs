//! In-process bus backed by a tokio broadcast channel.
//!
//! Behaves like a single broker connection: messages published on it are
//! delivered to the registered handler when their topic matches one of the
//! subscribed filters (MQTT `+`/`#` semantics). Used by the tests to run
//! the core without a broker.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use homewatch_domain::error::HomeWatchError;
use homewatch_domain::message::SenMlMessage;
use homewatch_domain::topic;

use crate::ports::{BusClient, MessageHandler};

/// A raw message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// In-process bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when nothing listens (the message is dropped).
pub struct InProcessBus {
    sender: broadcast::Sender<BusMessage>,
    filters: Arc<RwLock<Vec<String>>>,
}

impl InProcessBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            filters: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Publish raw bytes, as a sensor would.
    pub fn publish_raw(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        let _ = self.sender.send(BusMessage {
            topic: topic.into(),
            payload: payload.into(),
        });
    }

    /// Observe every message published *after* this call, regardless of
    /// subscriptions.
    #[must_use]
    pub fn watch(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    /// Filters subscribed so far.
    pub fn filters(&self) -> Vec<String> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deliver matching messages to `handler` until `token` is cancelled.
    ///
    /// Each message is awaited before the next one is taken, preserving
    /// delivery order.
    pub fn spawn_delivery<H: MessageHandler>(
        &self,
        handler: H,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let mut receiver = self.sender.subscribe();
        let filters = Arc::clone(&self.filters);
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    () = token.cancelled() => break,
                    received = receiver.recv() => received,
                };
                match message {
                    Ok(message) => {
                        let subscribed = filters
                            .read()
                            .unwrap_or_else(PoisonError::into_inner)
                            .iter()
                            .any(|filter| topic::matches(filter, &message.topic));
                        if subscribed {
                            handler.on_message(&message.topic, &message.payload).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "in-process bus delivery lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl BusClient for InProcessBus {
    fn publish(
        &self,
        topic: &str,
        message: &SenMlMessage,
    ) -> impl Future<Output = Result<(), HomeWatchError>> + Send {
        let result = message
            .to_vec()
            .map(|payload| self.publish_raw(topic, payload))
            .map_err(HomeWatchError::from);
        async { result }
    }

    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<(), HomeWatchError>> + Send {
        let mut filters = self
            .filters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !filters.iter().any(|existing| existing == filter) {
            filters.push(filter.to_string());
        }
        async { Ok(()) }
    }
}
