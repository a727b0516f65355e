//! Server wiring: graph + dispatcher + bus adapter.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use termsim_core::{SimError, SimResult};
use termsim_graph::TerminalGraph;

use crate::bus::{BusAdapter, BusEvents};
use crate::dispatcher::CommandProcessor;
use crate::params::Params;

/// The stateful service: owns the graph, the command processor, and the bus
/// adapter. Constructed once per process, after the single-instance
/// rendezvous succeeded.
pub struct TerminalGraphServer {
    graph: Arc<TerminalGraph>,
    processor: CommandProcessor,
    adapter: Arc<dyn BusAdapter>,
}

impl TerminalGraphServer {
    pub fn new(graph: Arc<TerminalGraph>, adapter: Arc<dyn BusAdapter>) -> Self {
        let server_id = Uuid::new_v4().to_string();
        info!(server_id = %server_id, "Terminal graph server created");
        Self {
            processor: CommandProcessor::new(graph.clone(), server_id),
            graph,
            adapter,
        }
    }

    pub fn graph(&self) -> &Arc<TerminalGraph> {
        &self.graph
    }

    pub fn server_id(&self) -> &str {
        self.processor.server_id()
    }

    /// Connects the bus adapter (bounded retries inside the adapter).
    pub async fn initialize(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> bool {
        let connected = self.adapter.connect(host, port, username, password).await;
        if connected {
            info!(host, port, "Server initialized and connected to the message bus");
        } else {
            warn!(host, port, "Failed to connect to the message bus");
        }
        connected
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    /// Loads a serialized graph file into the live graph.
    pub fn load_graph(&self, path: &Path) -> SimResult<()> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            SimError::Persistence(format!("Cannot open file {}: {err}", path.display()))
        })?;
        let data: Value = serde_json::from_str(&text)?;
        self.graph.load_state_from_value(&data)?;
        info!(path = %path.display(), "Graph loaded");
        Ok(())
    }

    /// Direct command entry point (used by tests and tooling).
    pub fn process_command(&self, command: &str, params: &Params) -> SimResult<Value> {
        self.processor.dispatch(command, params)
    }

    /// Consumes command envelopes until the channel closes or shutdown is
    /// signalled. A failing command never stops the loop.
    pub async fn run(&self, mut events: BusEvents, shutdown: Arc<Notify>) {
        info!("Listening for commands");
        loop {
            tokio::select! {
                envelope = events.commands.recv() => {
                    let Some(envelope) = envelope else {
                        warn!("Command channel closed, stopping server loop");
                        break;
                    };
                    let response = self.processor.dispatch_envelope(&envelope);
                    if !self.adapter.send_response(response).await {
                        warn!("Failed to publish response");
                    }
                }
                changed = events.connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let connected = *events.connection.borrow();
                    info!(connected, "Bus connection changed");
                }
                _ = shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        info!("Shutting down terminal graph server");
        self.adapter.disconnect().await;
    }
}
