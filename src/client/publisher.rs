//! Publisher actor

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{connect_tracked, iteration_topic, ActorState};
use crate::adapter::{ClientOptions, Connection, Connector, QoS};
use crate::envelope;
use crate::registry::ClientRegistry;
use crate::tracker::{Category, StatsSink};

/// Publishes `count` timestamped messages, one per iteration topic
#[derive(Debug)]
pub struct Publisher {
    options: ClientOptions,
    topic: String,
    qos: QoS,
    count: usize,
    payload_size: usize,
    interval: Duration,
    state: ActorState,
}

impl Publisher {
    pub fn new(
        options: ClientOptions,
        topic: String,
        qos: QoS,
        count: usize,
        payload_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            options,
            topic,
            qos,
            count,
            payload_size,
            interval,
            state: ActorState::Created,
        }
    }

    /// Connect, publish every iteration, and return the terminal state
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
            let payload = envelope::encode(self.payload_size);
            sink.begin(Category::Publish);

            let payload = match payload {
                Ok(payload) => payload,
                Err(e) => {
                    log::error!("[{:?}] publish {:?} failed: {}", client_id, topic, e);
                    sink.failed(Category::Publish);
                    continue;
                }
            };

            let begin = Instant::now();
            if let Err(e) = connection.publish(&topic, self.qos, payload).await {
                log::error!("[{:?}] publish {:?} failed: {}", client_id, topic, e);
                sink.failed(Category::Publish);
                continue;
            }
            sink.done(Category::Publish, begin.elapsed());
            log::info!("Publisher {:?} publish {:?} done", client_id, topic);

            tokio::time::sleep(self.interval).await;
        }

        self.state = ActorState::Finished;
        self.state
    }
}
