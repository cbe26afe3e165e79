//! MQTT Connection Adapter
//!
//! Implements the connection boundary on top of `rumqttc`. Each connection
//! owns an event-loop task that drives the socket, forwards inbound
//! publishes to the registered handler and resolves the acknowledgement the
//! owning actor is currently waiting for.

use super::{
    AdapterError, ClientOptions, ConnectedHandler, Connection, ConnectionLostHandler, Connector,
    InboundMessage, MessageHandler, QoS,
};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    SubscribeReasonCode,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

const DEFAULT_PORT: u16 = 1883;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Acknowledgement an in-flight request resolves on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckKind {
    /// QoS 0 publish: the packet left the client
    Written,
    PubAck,
    PubComp,
    SubAck,
}

impl AckKind {
    fn for_publish(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => AckKind::Written,
            QoS::AtLeastOnce => AckKind::PubAck,
            QoS::ExactlyOnce => AckKind::PubComp,
        }
    }
}

struct PendingAck {
    expect: AckKind,
    reply: oneshot::Sender<Result<(), AdapterError>>,
}

/// State shared between a connection and its event-loop task.
///
/// Actors issue one request at a time, so a single pending slot is enough.
#[derive(Default)]
struct Shared {
    pending: Mutex<Option<PendingAck>>,
    closing: AtomicBool,
}

impl Shared {
    async fn complete(&self, kind: AckKind, result: Result<(), AdapterError>) {
        let mut pending = self.pending.lock().await;
        if pending.as_ref().map(|p| p.expect) == Some(kind) {
            if let Some(p) = pending.take() {
                let _ = p.reply.send(result);
            }
        }
    }

    async fn fail_pending(&self, reason: &str) {
        if let Some(p) = self.pending.lock().await.take() {
            let _ = p.reply.send(Err(AdapterError::Operation(reason.to_string())));
        }
    }
}

struct Handlers {
    client_id: String,
    on_connected: Option<ConnectedHandler>,
    on_message: Option<MessageHandler>,
    on_connection_lost: Option<ConnectionLostHandler>,
}

/// Connector for MQTT 3.1.1 brokers
#[derive(Debug, Clone)]
pub struct MqttConnector {
    keep_alive: Duration,
    channel_capacity: usize,
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }
}

impl MqttConnector {
    pub fn new(keep_alive: Duration, channel_capacity: usize) -> Self {
        Self {
            keep_alive,
            channel_capacity,
        }
    }
}

/// Split a broker address into host and port.
///
/// Accepts `host`, `host:port`, and either form prefixed by `tcp://` or `mqtt://`.
pub fn parse_broker(address: &str) -> Result<(String, u16), AdapterError> {
    let trimmed = address.trim();
    let rest = trimmed
        .strip_prefix("tcp://")
        .or_else(|| trimmed.strip_prefix("mqtt://"))
        .unwrap_or(trimmed);

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| AdapterError::InvalidBroker(address.to_string()))?;
            (host, port)
        }
        None => (rest, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(AdapterError::InvalidBroker(address.to_string()));
    }
    Ok((host.to_string(), port))
}

#[async_trait]
impl Connector for MqttConnector {
    type Connection = MqttConnection;

    async fn connect(&self, options: ClientOptions) -> Result<MqttConnection, AdapterError> {
        let (host, port) = parse_broker(&options.broker)?;

        let mut mqtt_options = MqttOptions::new(options.client_id.clone(), host, port);
        mqtt_options
            .set_keep_alive(self.keep_alive)
            .set_clean_session(true)
            .set_max_packet_size(options.max_packet_size, options.max_packet_size);
        if !options.username.is_empty() {
            mqtt_options.set_credentials(options.username.clone(), options.password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, self.channel_capacity);

        // Drive the handshake inline; rumqttc reports a refused CONNACK as an error.
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    return Err(AdapterError::Connect(format!("{:?}", ack.code)));
                }
                Ok(_) => {}
                Err(e) => return Err(AdapterError::Connect(e.to_string())),
            }
        }

        if let Some(on_connected) = &options.on_connected {
            on_connected();
        }

        let shared = Arc::new(Shared::default());
        let handlers = Handlers {
            client_id: options.client_id.clone(),
            on_connected: options.on_connected,
            on_message: options.on_message,
            on_connection_lost: options.on_connection_lost,
        };
        let task = tokio::spawn(drive(eventloop, shared.clone(), handlers));

        Ok(MqttConnection {
            client_id: options.client_id,
            client,
            shared,
            task: Mutex::new(Some(task)),
        })
    }
}

/// Poll the event loop until the session is closed
async fn drive(mut eventloop: EventLoop, shared: Arc<Shared>, handlers: Handlers) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Some(on_message) = &handlers.on_message {
                    on_message(InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
            }
            Ok(Event::Incoming(Packet::PubAck(_))) => {
                shared.complete(AckKind::PubAck, Ok(())).await;
            }
            Ok(Event::Incoming(Packet::PubComp(_))) => {
                shared.complete(AckKind::PubComp, Ok(())).await;
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let rejected = ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                let result = if rejected {
                    Err(AdapterError::Operation("subscription rejected by broker".into()))
                } else {
                    Ok(())
                };
                shared.complete(AckKind::SubAck, result).await;
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                log::debug!("[{}] reconnected", handlers.client_id);
                if let Some(on_connected) = &handlers.on_connected {
                    on_connected();
                }
            }
            Ok(Event::Outgoing(Outgoing::Publish(_))) => {
                shared.complete(AckKind::Written, Ok(())).await;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                let reason = e.to_string();
                shared.fail_pending(&reason).await;
                if shared.closing.load(Ordering::Acquire) {
                    break;
                }
                log::debug!("[{}] connection lost: {}", handlers.client_id, reason);
                if let Some(on_connection_lost) = &handlers.on_connection_lost {
                    on_connection_lost(&reason);
                }
                // Keep polling: rumqttc reconnects on the next poll.
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    log::debug!("[{}] event loop stopped", handlers.client_id);
}

/// Established MQTT session
pub struct MqttConnection {
    client_id: String,
    client: AsyncClient,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttConnection {
    async fn await_ack<F>(&self, expect: AckKind, request: F) -> Result<(), AdapterError>
    where
        F: Future<Output = Result<(), rumqttc::ClientError>>,
    {
        if self.shared.closing.load(Ordering::Acquire) {
            return Err(AdapterError::ConnectionClosed);
        }

        // Install the waiter before the request can possibly be acknowledged.
        let (reply, ack) = oneshot::channel();
        *self.shared.pending.lock().await = Some(PendingAck { expect, reply });

        if let Err(e) = request.await {
            self.shared.pending.lock().await.take();
            return Err(AdapterError::Operation(e.to_string()));
        }

        ack.await.map_err(|_| AdapterError::ConnectionClosed)?
    }
}

#[async_trait]
impl Connection for MqttConnection {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), AdapterError> {
        let request = self.client.publish(topic, to_rumqttc(qos), false, payload);
        self.await_ack(AckKind::for_publish(qos), request).await
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), AdapterError> {
        let request = self.client.subscribe(topic, to_rumqttc(qos));
        self.await_ack(AckKind::SubAck, request).await
    }

    async fn disconnect(&self, grace: Duration) {
        if self.shared.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.client.disconnect().await {
            log::debug!("[{}] disconnect request failed: {}", self.client_id, e);
        }

        let task = self.task.lock().await.take();
        if let Some(mut task) = task {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                log::debug!("[{}] disconnect grace elapsed, aborting event loop", self.client_id);
                task.abort();
            }
        }
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

fn to_rumqttc(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}
