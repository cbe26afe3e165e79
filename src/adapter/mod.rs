//! Connection Adapter Module
//!
//! The narrow capability boundary between the benchmark core and a concrete
//! messaging client: connect, publish, subscribe, disconnect, plus inbound
//! message and lifecycle notifications. The core only ever sees these types.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod loopback;
pub mod mqtt;

pub use loopback::LoopbackBroker;
pub use mqtt::MqttConnector;

/// Grace period granted to a disconnect before the transport is torn down
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Adapter error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("invalid broker address '{0}'")]
    InvalidBroker(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("connection closed")]
    ConnectionClosed,
}

/// MQTT delivery guarantee level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = u8;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(other),
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// A message delivered to a subscribed client
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;
pub type ConnectedHandler = Arc<dyn Fn() + Send + Sync>;
pub type ConnectionLostHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-client connection settings, fixed before connecting
#[derive(Clone)]
pub struct ClientOptions {
    pub broker: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub max_packet_size: usize,
    pub on_connected: Option<ConnectedHandler>,
    pub on_message: Option<MessageHandler>,
    pub on_connection_lost: Option<ConnectionLostHandler>,
}

impl ClientOptions {
    pub fn new(broker: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            client_id: client_id.into(),
            username: String::new(),
            password: String::new(),
            max_packet_size: 10 * 1024,
            on_connected: None,
            on_message: None,
            on_connection_lost: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    pub fn on_connected(mut self, handler: ConnectedHandler) -> Self {
        self.on_connected = Some(handler);
        self
    }

    pub fn on_message(mut self, handler: MessageHandler) -> Self {
        self.on_message = Some(handler);
        self
    }

    pub fn on_connection_lost(mut self, handler: ConnectionLostHandler) -> Self {
        self.on_connection_lost = Some(handler);
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("broker", &self.broker)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("max_packet_size", &self.max_packet_size)
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

/// Factory for connections to one kind of broker
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self, options: ClientOptions) -> Result<Self::Connection, AdapterError>;
}

/// One established client session
///
/// `publish` and `subscribe` return once the broker acknowledged the request.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    fn client_id(&self) -> &str;

    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), AdapterError>;

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), AdapterError>;

    /// Idempotent; never waits longer than `grace` for the broker
    async fn disconnect(&self, grace: Duration);
}
