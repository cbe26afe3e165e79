//! Client Actor Module
//!
//! Publisher and subscriber actors each drive one connection through a fixed
//! number of timed operations and report every outcome to the statistics sink.

use std::sync::Arc;
use std::time::Instant;

use crate::adapter::{ClientOptions, Connector};
use crate::tracker::{Category, StatsSink};

pub mod publisher;
pub mod subscriber;

pub use publisher::Publisher;
pub use subscriber::Subscriber;

/// Actor state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Created,
    Connecting,
    Running,
    /// Connect failed; nothing else was attempted
    Failed,
    Finished,
}

/// Topic used for iteration `index` under `base`
pub fn iteration_topic(base: &str, index: usize) -> String {
    format!("{}/{}", base, index)
}

/// Connect and record the outcome under [`Category::Connection`]
pub(crate) async fn connect_tracked<C: Connector>(
    connector: &C,
    options: ClientOptions,
    sink: &StatsSink,
) -> Option<Arc<C::Connection>> {
    let client_id = options.client_id.clone();
    let begin = Instant::now();
    sink.begin(Category::Connection);

    match connector.connect(options).await {
        Ok(connection) => {
            sink.done(Category::Connection, begin.elapsed());
            log::info!("Client {:?} connected", client_id);
            Some(Arc::new(connection))
        }
        Err(e) => {
            log::error!("[{:?}] failed: {}", client_id, e);
            sink.failed(Category::Connection);
            None
        }
    }
}
