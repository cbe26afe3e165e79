//! In-process loopback broker.
//!
//! Routes publishes to subscribers of the exact same topic within the
//! current process. Delivery happens on the publishing task before the
//! publish call returns. Used for dry runs and for exercising the harness
//! without a network broker.

use super::{AdapterError, ClientOptions, Connection, Connector, InboundMessage, MessageHandler, QoS};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct Route {
    client_id: String,
    handler: MessageHandler,
}

struct Inner {
    reachable: bool,
    drop_every: Option<u64>,
    routes: Mutex<HashMap<String, Vec<Route>>>,
    connects: AtomicU64,
    publishes: AtomicU64,
    dropped: AtomicU64,
}

/// Loopback broker handle; clones share the same routing table
#[derive(Clone)]
pub struct LoopbackBroker {
    inner: Arc<Inner>,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::build(true, None)
    }
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that refuses every connection
    pub fn unreachable() -> Self {
        Self::build(false, None)
    }

    /// A broker that silently discards every `n`-th accepted publish
    pub fn lossy(n: u64) -> Self {
        Self::build(true, Some(n.max(1)))
    }

    fn build(reachable: bool, drop_every: Option<u64>) -> Self {
        Self {
            inner: Arc::new(Inner {
                reachable,
                drop_every,
                routes: Mutex::new(HashMap::new()),
                connects: AtomicU64::new(0),
                publishes: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Number of connect attempts seen
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connects.load(Ordering::Acquire)
    }

    /// Number of publishes accepted, including dropped ones
    pub fn publishes(&self) -> u64 {
        self.inner.publishes.load(Ordering::Acquire)
    }

    /// Number of publishes discarded instead of routed
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Acquire)
    }

    /// Number of live subscriptions
    pub async fn subscriptions(&self) -> usize {
        self.inner.routes.lock().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl Connector for LoopbackBroker {
    type Connection = LoopbackConnection;

    async fn connect(&self, options: ClientOptions) -> Result<LoopbackConnection, AdapterError> {
        self.inner.connects.fetch_add(1, Ordering::AcqRel);
        if !self.inner.reachable {
            return Err(AdapterError::Connect(format!(
                "broker {} unreachable",
                options.broker
            )));
        }
        if let Some(on_connected) = &options.on_connected {
            on_connected();
        }
        Ok(LoopbackConnection {
            broker: self.clone(),
            client_id: options.client_id,
            on_message: options.on_message,
            closed: AtomicBool::new(false),
        })
    }
}

/// Session on a [`LoopbackBroker`]
pub struct LoopbackConnection {
    broker: LoopbackBroker,
    client_id: String,
    on_message: Option<MessageHandler>,
    closed: AtomicBool,
}

impl LoopbackConnection {
    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.closed.load(Ordering::Acquire) {
            Err(AdapterError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, topic: &str, _qos: QoS, payload: Vec<u8>) -> Result<(), AdapterError> {
        self.ensure_open()?;
        let inner = &self.broker.inner;
        let seq = inner.publishes.fetch_add(1, Ordering::AcqRel) + 1;
        if inner.drop_every.is_some_and(|n| seq % n == 0) {
            inner.dropped.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }

        let handlers: Vec<MessageHandler> = inner
            .routes
            .lock()
            .await
            .get(topic)
            .map(|routes| routes.iter().map(|r| r.handler.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(InboundMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<(), AdapterError> {
        self.ensure_open()?;
        if let Some(handler) = &self.on_message {
            self.broker
                .inner
                .routes
                .lock()
                .await
                .entry(topic.to_string())
                .or_default()
                .push(Route {
                    client_id: self.client_id.clone(),
                    handler: handler.clone(),
                });
        }
        Ok(())
    }

    async fn disconnect(&self, _grace: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut routes = self.broker.inner.routes.lock().await;
        for subscribers in routes.values_mut() {
            subscribers.retain(|r| r.client_id != self.client_id);
        }
        routes.retain(|_, subscribers| !subscribers.is_empty());
    }
}
