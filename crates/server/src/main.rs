use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use termsim_graph::TerminalGraph;
use termsim_server::bus::bus_channels;
use termsim_server::instance::{SingleInstance, INSTANCE_NAME};
use termsim_server::rabbitmq::RabbitMqAdapter;
use termsim_server::server::TerminalGraphServer;

/// Terminal-graph simulation server for multimodal freight networks.
#[derive(Parser, Debug)]
#[command(name = "termsim-server", version, about)]
struct Cli {
    /// RabbitMQ host address
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// RabbitMQ port
    #[arg(short = 'p', long, default_value_t = 5672)]
    port: u16,

    /// RabbitMQ username
    #[arg(short = 'u', long, default_value = "guest")]
    user: String,

    /// RabbitMQ password
    #[arg(short = 'w', long, default_value = "guest")]
    password: String,

    /// Path to the terminal data directory
    #[arg(short = 'd', long, default_value = "./data")]
    data_path: PathBuf,

    /// Load a serialized graph file on startup
    #[arg(short = 'l', long)]
    load: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    // Only one server per machine: claim the rendezvous name before any
    // state is built.
    let _instance = match SingleInstance::acquire(INSTANCE_NAME) {
        Ok(instance) => instance,
        Err(err) => {
            error!(%err, "Another instance of the terminal simulation server is already running");
            std::process::exit(1);
        }
    };

    if !cli.data_path.exists() {
        std::fs::create_dir_all(&cli.data_path)?;
    }
    info!(host = %cli.host, port = cli.port, data_path = %cli.data_path.display(), "Starting terminal simulation server");

    let graph = Arc::new(TerminalGraph::new(Some(cli.data_path.clone())));
    let (senders, events) = bus_channels(64);
    let adapter = Arc::new(RabbitMqAdapter::new(senders));
    let server = TerminalGraphServer::new(graph, adapter);

    if let Some(load) = &cli.load {
        info!(path = %load.display(), "Loading graph");
        if let Err(err) = server.load_graph(load) {
            warn!(%err, path = %load.display(), "Failed to load graph");
        }
    }

    if !server
        .initialize(&cli.host, cli.port, &cli.user, &cli.password)
        .await
    {
        error!("Failed to initialize server, exiting");
        std::process::exit(1);
    }

    let shutdown = Arc::new(Notify::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.notify_waiters();
    });

    server.run(events, shutdown).await;
    server.shutdown().await;
    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(err) => {
            error!(%err, "Failed to register SIGINT handler");
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(err) => {
            error!(%err, "Failed to register SIGTERM handler");
            return;
        }
    };
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}
