//! Client Registry Module
//!
//! Collects every established connection so the run can tear them all down
//! at the end. Registrations and shutdown requests travel over one queue to
//! a single task that owns the connection list.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::adapter::Connection;

enum Command {
    Register(Arc<dyn Connection>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the registry task; clones feed the same registry
#[derive(Clone)]
pub struct ClientRegistry {
    tx: mpsc::UnboundedSender<Command>,
}

impl ClientRegistry {
    /// Start the registry task; `grace` bounds each disconnect at shutdown
    pub fn spawn(grace: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, grace));
        Self { tx }
    }

    /// Track a connection for teardown. A no-op once shutdown has begun.
    pub fn register(&self, connection: Arc<dyn Connection>) {
        if let Err(mpsc::error::SendError(Command::Register(c))) =
            self.tx.send(Command::Register(connection))
        {
            log::debug!("Registry closed, not tracking {}", c.client_id());
        }
    }

    /// Disconnect every registered connection.
    ///
    /// Only the first request performs the teardown; every caller returns
    /// once it has finished.
    pub async fn shutdown_all(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done)).is_err() {
            return;
        }
        let _ = wait.await;
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>, grace: Duration) {
    let mut connections: Vec<Arc<dyn Connection>> = Vec::new();
    let mut closed = false;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Register(connection) if !closed => connections.push(connection),
            Command::Register(connection) => {
                log::debug!("Registry shut down, ignoring {}", connection.client_id());
            }
            Command::Shutdown(done) => {
                if !closed {
                    closed = true;
                    log::info!("Disconnecting {} clients ...", connections.len());
                    for connection in connections.drain(..) {
                        connection.disconnect(grace).await;
                        log::debug!("Client {} disconnected", connection.client_id());
                    }
                    // Requests queued during the teardown are answered below.
                    rx.close();
                }
                let _ = done.send(());
            }
        }
    }
}
