//! Message-bus capability contract.
//!
//! The core consumes a broker through this trait plus two channels: inbound
//! command envelopes and connection-state transitions. Any client capable of
//! durable topic routing can implement it; the stock implementation is the
//! AMQP adapter in [`crate::rabbitmq`].

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

/// Connects to a broker, publishes response envelopes, and feeds consumed
/// command envelopes into the channel handed over at construction.
#[async_trait]
pub trait BusAdapter: Send + Sync {
    /// Establishes the connection and bus topology. Returns false once the
    /// bounded reconnection attempts are exhausted.
    async fn connect(&self, host: &str, port: u16, username: &str, password: &str) -> bool;

    /// Tears the connection down. Idempotent.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Publishes one response envelope, retrying a bounded number of times.
    async fn send_response(&self, message: Value) -> bool;
}

/// Receiving side of the adapter events, owned by the server loop.
pub struct BusEvents {
    /// Command envelopes, in consumption order.
    pub commands: mpsc::Receiver<Value>,
    /// Connection up/down transitions.
    pub connection: watch::Receiver<bool>,
}

/// Sending side, owned by the adapter.
#[derive(Clone)]
pub struct BusEventSenders {
    pub commands: mpsc::Sender<Value>,
    pub connection: watch::Sender<bool>,
}

/// Builds the channel pair linking an adapter to the server loop.
pub fn bus_channels(buffer: usize) -> (BusEventSenders, BusEvents) {
    let (commands_tx, commands_rx) = mpsc::channel(buffer);
    let (connection_tx, connection_rx) = watch::channel(false);
    (
        BusEventSenders {
            commands: commands_tx,
            connection: connection_tx,
        },
        BusEvents {
            commands: commands_rx,
            connection: connection_rx,
        },
    )
}
