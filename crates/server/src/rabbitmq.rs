//! RabbitMQ (AMQP 0-9-1) bus adapter built on lapin.
//!
//! Establishes the normative topology on connect: one durable topic
//! exchange, a durable command queue, and a durable response queue, each
//! bound with its routing key. Messages are JSON with persistent delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{BusAdapter, BusEventSenders};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_SEND_RETRIES: u32 = 3;
const SEND_RETRY_DELAY: Duration = Duration::from_secs(1);
const RECEIVE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub const EXCHANGE_NAME: &str = "CargoNetSim.Exchange";
pub const COMMAND_QUEUE_NAME: &str = "CargoNetSim.CommandQueue.TerminalSim";
pub const RESPONSE_QUEUE_NAME: &str = "CargoNetSim.ResponseQueue.TerminalSim";
pub const COMMAND_ROUTING_KEY: &str = "CargoNetSim.Command.TerminalSim";
pub const RESPONSE_ROUTING_KEY: &str = "CargoNetSim.Response.TerminalSim";

#[derive(Clone)]
struct ConnectParams {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl ConnectParams {
    fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.username, self.password, self.host, self.port
        )
    }
}

struct Shared {
    params: StdMutex<Option<ConnectParams>>,
    connection: Mutex<Option<Connection>>,
    channel: Mutex<Option<Channel>>,
    connected: AtomicBool,
    running: AtomicBool,
    events: BusEventSenders,
}

impl Shared {
    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        let _ = self.events.connection.send(connected);
    }
}

pub struct RabbitMqAdapter {
    shared: Arc<Shared>,
    consumer_task: StdMutex<Option<JoinHandle<()>>>,
}

impl RabbitMqAdapter {
    pub fn new(events: BusEventSenders) -> Self {
        debug!(
            exchange = EXCHANGE_NAME,
            command_queue = COMMAND_QUEUE_NAME,
            response_queue = RESPONSE_QUEUE_NAME,
            "RabbitMQ adapter initialized"
        );
        Self {
            shared: Arc::new(Shared {
                params: StdMutex::new(None),
                connection: Mutex::new(None),
                channel: Mutex::new(None),
                connected: AtomicBool::new(false),
                running: AtomicBool::new(false),
                events,
            }),
            consumer_task: StdMutex::new(None),
        }
    }
}

/// Opens the connection and declares the full topology.
async fn establish(
    params: &ConnectParams,
) -> Result<(Connection, Channel, Consumer), lapin::Error> {
    let connection =
        Connection::connect(&params.uri(), ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    channel
        .exchange_declare(
            EXCHANGE_NAME,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    for queue in [COMMAND_QUEUE_NAME, RESPONSE_QUEUE_NAME] {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
    }
    channel
        .queue_bind(
            COMMAND_QUEUE_NAME,
            EXCHANGE_NAME,
            COMMAND_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            RESPONSE_QUEUE_NAME,
            EXCHANGE_NAME,
            RESPONSE_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let consumer = channel
        .basic_consume(
            COMMAND_QUEUE_NAME,
            "",
            BasicConsumeOptions {
                no_ack: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    Ok((connection, channel, consumer))
}

/// Consumer loop with a 1-second poll so shutdown is observed promptly. On
/// connection loss it disconnects, waits, and reconnects once; a failed
/// reconnect ends the loop with the connection marked down.
async fn consumer_loop(shared: Arc<Shared>, mut consumer: Consumer) {
    while shared.running.load(Ordering::SeqCst) {
        match tokio::time::timeout(RECEIVE_POLL_TIMEOUT, consumer.next()).await {
            Err(_) => continue, // poll timeout, nothing pending
            Ok(Some(Ok(delivery))) => {
                if delivery.data.is_empty() {
                    continue;
                }
                let Ok(mut message) = serde_json::from_slice::<Value>(&delivery.data) else {
                    warn!("Discarding non-JSON command message");
                    continue;
                };
                if !message.is_object() {
                    warn!("Discarding non-object command message");
                    continue;
                }
                if let Some(message_id) = delivery.properties.message_id() {
                    message["message_id"] = Value::String(message_id.to_string());
                }
                debug!(routing_key = %delivery.routing_key, "Received command message");
                if shared.events.commands.send(message).await.is_err() {
                    // The server loop is gone; nothing left to consume for.
                    break;
                }
            }
            Ok(stream_failure) => {
                if let Some(Err(err)) = stream_failure {
                    warn!(%err, "Error receiving message");
                }
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                warn!("Connection lost while consuming, attempting reconnect");
                shared.set_connected(false);
                tokio::time::sleep(RECONNECT_DELAY).await;

                let params = shared.params.lock().unwrap_or_else(|p| p.into_inner()).clone();
                let Some(params) = params else { break };
                match establish(&params).await {
                    Ok((connection, channel, new_consumer)) => {
                        *shared.connection.lock().await = Some(connection);
                        *shared.channel.lock().await = Some(channel);
                        shared.set_connected(true);
                        consumer = new_consumer;
                        info!("Reconnected to RabbitMQ after connection loss");
                    }
                    Err(err) => {
                        error!(%err, "Reconnection failed, consumer worker exiting");
                        break;
                    }
                }
            }
        }
    }
    debug!("Consumer worker terminating");
}

#[async_trait]
impl BusAdapter for RabbitMqAdapter {
    async fn connect(&self, host: &str, port: u16, username: &str, password: &str) -> bool {
        if self.shared.connected.load(Ordering::SeqCst) {
            debug!("Already connected to RabbitMQ");
            return true;
        }

        let params = ConnectParams {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        };
        *self.shared.params.lock().unwrap_or_else(|p| p.into_inner()) = Some(params.clone());

        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            match establish(&params).await {
                Ok((connection, channel, consumer)) => {
                    *self.shared.connection.lock().await = Some(connection);
                    *self.shared.channel.lock().await = Some(channel);
                    self.shared.running.store(true, Ordering::SeqCst);
                    self.shared.set_connected(true);

                    let handle = tokio::spawn(consumer_loop(self.shared.clone(), consumer));
                    *self.consumer_task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);

                    info!(host, port, "Connected to RabbitMQ server");
                    return true;
                }
                Err(err) => {
                    warn!(attempt, %err, "Failed to connect to RabbitMQ, retrying");
                    if attempt < MAX_RECONNECT_ATTEMPTS {
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }

        error!(
            attempts = MAX_RECONNECT_ATTEMPTS,
            "Failed to establish a connection to RabbitMQ"
        );
        false
    }

    async fn disconnect(&self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        let was_connected = self.shared.connected.load(Ordering::SeqCst);
        if !was_running && !was_connected {
            return;
        }

        if let Some(handle) = self.consumer_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
        if let Some(channel) = self.shared.channel.lock().await.take() {
            let _ = channel.close(200, "shutdown").await;
        }
        if let Some(connection) = self.shared.connection.lock().await.take() {
            let _ = connection.close(200, "shutdown").await;
        }
        self.shared.set_connected(false);
        info!("Disconnected from RabbitMQ server");
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn send_response(&self, message: Value) -> bool {
        if !self.is_connected() {
            warn!("Cannot send response: not connected to RabbitMQ server");
            return false;
        }

        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(err) => {
                error!(%err, "Failed to serialize response");
                return false;
            }
        };
        let message_id = message
            .get("message_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        for attempt in 1..=MAX_SEND_RETRIES {
            let publish = {
                let guard = self.shared.channel.lock().await;
                let Some(channel) = guard.as_ref() else {
                    warn!("Cannot send response: channel is gone");
                    return false;
                };
                let properties = BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2)
                    .with_message_id(message_id.clone().into());
                channel
                    .basic_publish(
                        EXCHANGE_NAME,
                        RESPONSE_ROUTING_KEY,
                        BasicPublishOptions::default(),
                        &payload,
                        properties,
                    )
                    .await
            };

            match publish {
                Ok(confirm) => match confirm.await {
                    Ok(_) => {
                        debug!(
                            routing_key = RESPONSE_ROUTING_KEY,
                            bytes = payload.len(),
                            "Published response"
                        );
                        return true;
                    }
                    Err(err) => warn!(attempt, %err, "Publish confirmation failed, retrying"),
                },
                Err(err) => warn!(attempt, %err, "Failed to publish message, retrying"),
            }
            tokio::time::sleep(SEND_RETRY_DELAY).await;
        }

        error!(
            attempts = MAX_SEND_RETRIES,
            "Failed to publish message to RabbitMQ"
        );
        false
    }
}
