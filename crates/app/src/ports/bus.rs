//! Bus port — topic-based publish/subscribe transport.

use std::future::Future;
use std::sync::Arc;

use homewatch_domain::error::HomeWatchError;
use homewatch_domain::message::SenMlMessage;

/// Outbound side of the single bus connection.
///
/// One instance exists per process; it is shared by the rebalancer (for the
/// sensor subscription) and every controller (for commands).
pub trait BusClient {
    /// Publish `message` on `topic` with at-least-once delivery.
    fn publish(
        &self,
        topic: &str,
        message: &SenMlMessage,
    ) -> impl Future<Output = Result<(), HomeWatchError>> + Send;

    /// Subscribe the connection to `filter`. Subscribing twice is harmless.
    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<(), HomeWatchError>> + Send;
}

/// Inbound side: receives every message delivered on the connection.
///
/// The transport awaits each call before delivering the next message, so a
/// handler sees messages in delivery order.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one inbound message. Must not fail; errors are logged inside.
    fn on_message(&self, topic: &str, payload: &[u8]) -> impl Future<Output = ()> + Send;
}

impl<T: MessageHandler> MessageHandler for Arc<T> {
    fn on_message(&self, topic: &str, payload: &[u8]) -> impl Future<Output = ()> + Send {
        (**self).on_message(topic, payload)
    }
}
