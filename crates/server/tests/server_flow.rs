//! Server loop behavior with a mock bus adapter: envelope round-trips,
//! per-command error isolation, and FIFO response ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};

use termsim_graph::TerminalGraph;
use termsim_server::bus::{bus_channels, BusAdapter};
use termsim_server::server::TerminalGraphServer;

/// Records published responses instead of talking to a broker.
struct MockAdapter {
    connected: AtomicBool,
    responses: Mutex<Vec<Value>>,
}

impl MockAdapter {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            responses: Mutex::new(Vec::new()),
        }
    }

    async fn responses(&self) -> Vec<Value> {
        self.responses.lock().await.clone()
    }
}

#[async_trait]
impl BusAdapter for MockAdapter {
    async fn connect(&self, _host: &str, _port: u16, _username: &str, _password: &str) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_response(&self, message: Value) -> bool {
        self.responses.lock().await.push(message);
        true
    }
}

#[tokio::test]
async fn envelopes_round_trip_through_the_server_loop() {
    let graph = Arc::new(TerminalGraph::new(None));
    let adapter = Arc::new(MockAdapter::new());
    let server = Arc::new(TerminalGraphServer::new(graph, adapter.clone()));
    assert!(server.initialize("localhost", 5672, "guest", "guest").await);

    let (senders, events) = bus_channels(16);
    let shutdown = Arc::new(Notify::new());

    let run_server = server.clone();
    let run_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        run_server.run(events, run_shutdown).await;
    });

    // A valid command, a failing command, then another valid one: the loop
    // must answer all three in order.
    senders
        .commands
        .send(json!({
            "command": "add_terminal",
            "request_id": "r1",
            "params": {
                "terminal_names": ["A"],
                "display_name": "A",
                "terminal_interfaces": {"0": [0]},
                "custom_config": {},
            },
        }))
        .await
        .unwrap();
    senders
        .commands
        .send(json!({
            "command": "get_terminal",
            "request_id": "r2",
            "message_id": "m2",
            "params": {"terminal_name": "ghost"},
        }))
        .await
        .unwrap();
    senders
        .commands
        .send(json!({"command": "get_terminal_count", "request_id": "r3"}))
        .await
        .unwrap();

    // Wait for the three responses to land.
    for _ in 0..100 {
        if adapter.responses().await.len() == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    shutdown.notify_waiters();
    handle.await.unwrap();
    server.shutdown().await;
    assert!(!server.is_connected());

    let responses = adapter.responses().await;
    assert_eq!(responses.len(), 3);

    assert_eq!(responses[0]["request_id"], json!("r1"));
    assert_eq!(responses[0]["success"], json!(true));
    assert_eq!(responses[0]["server_id"], json!(server.server_id()));

    assert_eq!(responses[1]["request_id"], json!("r2"));
    assert_eq!(responses[1]["success"], json!(false));
    assert_eq!(responses[1]["message_id"], json!("m2"));
    assert!(responses[1]["error"].as_str().unwrap().contains("Not found"));

    assert_eq!(responses[2]["request_id"], json!("r3"));
    assert_eq!(responses[2]["result"], json!(1));
}

#[tokio::test]
async fn load_graph_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");

    // Build and save a graph with one terminal.
    let source = TerminalGraph::new(None);
    let names = vec!["Harbor".to_string()];
    let mut interfaces = indexmap::IndexMap::new();
    interfaces.insert(
        termsim_core::TerminalInterface::SeaSide,
        std::collections::BTreeSet::from([termsim_core::TransportationMode::Ship]),
    );
    source
        .add_terminal(&names, "Harbor", &json!({}), interfaces, Some("Coast"))
        .unwrap();
    source.save_to_file(&path).unwrap();

    let graph = Arc::new(TerminalGraph::new(None));
    let adapter = Arc::new(MockAdapter::new());
    let server = TerminalGraphServer::new(graph.clone(), adapter);

    server.load_graph(&path).unwrap();
    assert!(graph.terminal_exists("Harbor"));
    assert_eq!(graph.get_terminals_by_region("Coast"), vec!["Harbor"]);

    assert!(server.load_graph(&dir.path().join("missing.json")).is_err());
}
