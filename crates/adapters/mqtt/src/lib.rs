//! # homewatch-adapter-mqtt
//!
//! MQTT adapter — the single bus connection of the process, over MQTT 3.1.1
//! via `rumqttc`.
//!
//! ## Responsibilities
//! - Connect to the broker and fail fast when no CONNACK arrives
//! - Implement [`BusClient`] (`publish` / `subscribe`, QoS 1, bounded by a
//!   request timeout)
//! - Drive the event loop and hand every inbound PUBLISH to one
//!   [`MessageHandler`], in delivery order
//! - Re-issue subscriptions after the client reconnects
//!
//! ## Dependency rule
//! Same as other adapters: depends on `homewatch-app` and `homewatch-domain`.

pub mod config;
pub mod error;

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use homewatch_app::ports::{BusClient, MessageHandler};
use homewatch_domain::broker::BrokerAddress;
use homewatch_domain::error::HomeWatchError;
use homewatch_domain::message::SenMlMessage;

pub use config::MqttConfig;
pub use error::MqttError;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Filters subscribed on this connection, replayed after a reconnect.
type Subscriptions = Arc<RwLock<Vec<String>>>;

/// Connect to `broker` and wait for the CONNACK.
///
/// # Errors
///
/// Returns [`MqttError::Connection`] if the broker cannot be reached,
/// [`MqttError::Refused`] if it rejects the session, and
/// [`MqttError::ConnectTimeout`] if no answer arrives in time.
pub async fn connect(
    config: &MqttConfig,
    broker: &BrokerAddress,
) -> Result<(MqttBus, MqttConnection), MqttError> {
    let mut options = MqttOptions::new(&config.client_id, &broker.host, broker.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);

    let (client, mut event_loop) = AsyncClient::new(options, config.channel_capacity);

    tracing::info!(%broker, client_id = %config.client_id, "connecting to MQTT broker");
    tokio::time::timeout(config.connect_timeout(), wait_for_connack(&mut event_loop))
        .await
        .map_err(|_| MqttError::ConnectTimeout {
            broker: broker.to_string(),
            timeout_secs: config.connect_timeout_secs,
        })??;
    tracing::info!(%broker, "connected to MQTT broker");

    let subscriptions = Subscriptions::default();
    let bus = MqttBus {
        client: client.clone(),
        request_timeout: config.request_timeout(),
        subscriptions: Arc::clone(&subscriptions),
    };
    let connection = MqttConnection {
        client,
        event_loop,
        subscriptions,
    };
    Ok((bus, connection))
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), MqttError> {
    loop {
        match event_loop.poll().await.map_err(MqttError::Connection)? {
            Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
                return Ok(());
            }
            Event::Incoming(Packet::ConnAck(ack)) => return Err(MqttError::Refused(ack.code)),
            _ => {}
        }
    }
}

/// Outbound half of the connection. Cheap to share behind an `Arc`.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    request_timeout: Duration,
    subscriptions: Subscriptions,
}

impl MqttBus {
    /// Send DISCONNECT. Best effort; errors are logged.
    pub async fn disconnect(&self) {
        match tokio::time::timeout(self.request_timeout, self.client.disconnect()).await {
            Ok(Ok(())) => tracing::info!("MQTT disconnect sent"),
            Ok(Err(err)) => tracing::warn!(error = %err, "MQTT disconnect failed"),
            Err(_) => tracing::warn!("MQTT disconnect timed out"),
        }
    }

    async fn publish_bytes(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        tokio::time::timeout(
            self.request_timeout,
            self.client.publish(topic, QoS::AtLeastOnce, false, payload),
        )
        .await
        .map_err(|_| MqttError::RequestTimeout {
            topic: topic.to_string(),
        })?
        .map_err(MqttError::Client)
    }

    async fn subscribe_filter(&self, filter: &str) -> Result<(), MqttError> {
        tokio::time::timeout(
            self.request_timeout,
            self.client.subscribe(filter, QoS::AtLeastOnce),
        )
        .await
        .map_err(|_| MqttError::RequestTimeout {
            topic: filter.to_string(),
        })?
        .map_err(MqttError::Client)?;

        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !subscriptions.iter().any(|existing| existing == filter) {
            subscriptions.push(filter.to_string());
        }
        Ok(())
    }
}

impl BusClient for MqttBus {
    fn publish(
        &self,
        topic: &str,
        message: &SenMlMessage,
    ) -> impl Future<Output = Result<(), HomeWatchError>> + Send {
        let payload = message.to_vec().map_err(MqttError::Payload);
        async move { Ok(self.publish_bytes(topic, payload?).await?) }
    }

    async fn subscribe(&self, filter: &str) -> Result<(), HomeWatchError> {
        self.subscribe_filter(filter).await?;
        Ok(())
    }
}

/// Inbound half of the connection: owns the event loop.
pub struct MqttConnection {
    client: AsyncClient,
    event_loop: EventLoop,
    subscriptions: Subscriptions,
}

impl MqttConnection {
    /// Drive the event loop until `token` is cancelled, handing every inbound
    /// PUBLISH to `handler`.
    ///
    /// Messages are handed over through a queue so the event loop keeps
    /// polling while the handler publishes commands on the same connection.
    pub fn spawn<H: MessageHandler>(self, handler: H, token: CancellationToken) -> JoinHandle<()> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let delivery = tokio::spawn(deliver(receiver, handler, token.clone()));
        tokio::spawn(self.run(sender, token, delivery))
    }

    async fn run(
        mut self,
        sender: mpsc::UnboundedSender<(String, Vec<u8>)>,
        token: CancellationToken,
        delivery: JoinHandle<()>,
    ) {
        loop {
            let event = tokio::select! {
                () = token.cancelled() => break,
                event = self.event_loop.poll() => event,
            };
            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    tracing::trace!(topic = %publish.topic, "MQTT message received");
                    if sender
                        .send((publish.topic, publish.payload.to_vec()))
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("MQTT session re-established");
                    self.resubscribe();
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "MQTT connection error, retrying");
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
        drop(sender);
        if let Err(err) = delivery.await {
            tracing::warn!(error = %err, "MQTT delivery task ended abnormally");
        }
        tracing::info!("MQTT event loop stopped");
    }

    fn resubscribe(&self) {
        let filters = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for filter in filters {
            if let Err(err) = self.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                tracing::warn!(%filter, error = %err, "MQTT resubscribe failed");
            }
        }
    }
}

async fn deliver<H: MessageHandler>(
    mut receiver: mpsc::UnboundedReceiver<(String, Vec<u8>)>,
    handler: H,
    token: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            () = token.cancelled() => break,
            message = receiver.recv() => message,
        };
        let Some((topic, payload)) = message else {
            break;
        };
        handler.on_message(&topic, &payload).await;
    }
}
