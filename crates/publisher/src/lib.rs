use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const CHANNEL_CAPACITY: usize = 100;

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("failed to bind publish socket at {endpoint}: {source}")]
    SocketBindFailure {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },
    #[error("publish channel is closed")]
    ChannelClosed,
}

/// Owns the downstream pub/sub socket and a bounded queue feeding it. The
/// queue is the system's only backpressure signal: producers block once
/// it fills, rather than the publisher dropping or buffering unboundedly.
pub struct Publisher {
    tx: mpsc::Sender<Vec<u8>>,
}

impl Publisher {
    /// Binds a PUB socket at `endpoint` and starts the drain loop on a
    /// blocking task (the zmq send call is blocking I/O, not a future).
    pub fn bind(endpoint: &str) -> Result<Self, PublisherError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUB).map_err(|source| PublisherError::SocketBindFailure {
            endpoint: endpoint.to_string(),
            source,
        })?;
        socket.bind(endpoint).map_err(|source| PublisherError::SocketBindFailure {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::task::spawn_blocking(move || run_send_loop(socket, rx));

        info!(endpoint, "publisher bound");
        Ok(Publisher { tx })
    }

    /// Enqueue a message for publication. Blocks (asynchronously) if the
    /// queue is full -- this is the deliberate backpressure point.
    pub async fn publish(&self, message: Vec<u8>) -> Result<(), PublisherError> {
        self.tx.send(message).await.map_err(|_| PublisherError::ChannelClosed)
    }
}

fn run_send_loop(socket: zmq::Socket, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(message) = rx.blocking_recv() {
        if let Err(err) = socket.send(message, 0) {
            warn!(error = %err, "dropping message, publish socket send failed");
        }
    }
    error!("publish channel closed, drain loop exiting");
}
