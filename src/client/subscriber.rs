//! Subscriber actor and the inbound message handler

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{connect_tracked, iteration_topic, ActorState};
use crate::adapter::{ClientOptions, Connection, Connector, InboundMessage, MessageHandler, QoS};
use crate::envelope;
use crate::registry::ClientRegistry;
use crate::tracker::{Category, Phase, StatsSink};

/// Subscribes to `count` iteration topics
#[derive(Debug)]
pub struct Subscriber {
    options: ClientOptions,
    topic: String,
    qos: QoS,
    count: usize,
    interval: Duration,
    state: ActorState,
}

impl Subscriber {
    pub fn new(options: ClientOptions, topic: String, qos: QoS, count: usize, interval: Duration) -> Self {
        Self {
            options,
            topic,
            qos,
            count,
            interval,
            state: ActorState::Created,
        }
    }

    /// Connect, subscribe every iteration topic, and return the terminal state.
    ///
    /// Messages keep arriving through the handler in the client options after
    /// this returns, until the connection is torn down.
    pub async fn run<C: Connector>(
        mut self,
        connector: Arc<C>,
        registry: ClientRegistry,
        sink: StatsSink,
    ) -> ActorState {
        let client_id = self.options.client_id.clone();

        self.state = ActorState::Connecting;
        let Some(connection) = connect_tracked(connector.as_ref(), self.options.clone(), &sink).await else {
            self.state = ActorState::Failed;
            return self.state;
        };
        registry.register(connection.clone() as Arc<dyn Connection>);

        self.state = ActorState::Running;
        for i in 0..self.count {
            let topic = iteration_topic(&self.topic, i);
            let begin = Instant::now();
            sink.begin(Category::Subscribe);

            if let Err(e) = connection.subscribe(&topic, self.qos).await {
                log::error!("[{:?}] subscribe {:?} failed: {}", client_id, topic, e);
                sink.failed(Category::Subscribe);
                continue;
            }
            sink.done(Category::Subscribe, begin.elapsed());
            log::info!("Subscriber {:?} subscribe {:?} done", client_id, topic);

            tokio::time::sleep(self.interval).await;
        }

        self.state = ActorState::Finished;
        self.state
    }
}

/// Build the handler that turns arrivals into [`Category::Message`] events.
///
/// Every arrival counts as a Begin; it completes as Done with the end-to-end
/// latency, or as Failed when the envelope is unreadable or the timestamp
/// is not strictly between the clock origin and now.
pub fn inbound_handler(client_id: String, sink: StatsSink) -> MessageHandler {
    Arc::new(move |message: InboundMessage| {
        log::info!("Subscriber {:?} received message {:?}", client_id, message.topic);
        let now = envelope::monotonic_nanos();
        sink.begin(Category::Message);
        sink.record(Category::Message, classify(&message, now));
    })
}

fn classify(message: &InboundMessage, now: u64) -> Phase {
    let sent = match envelope::decode(&message.payload) {
        Ok(sent) => sent,
        Err(e) => {
            log::error!("Got invalid message {:?}: {}", message.topic, e);
            return Phase::Failed;
        }
    };
    match now.checked_sub(sent) {
        Some(elapsed) if elapsed < now => Phase::Done(elapsed),
        _ => {
            log::error!("Got invalid message {:?}: begin={}, now={}", message.topic, sent, now);
            Phase::Failed
        }
    }
}
