//! ---
//! mfg_section: "02-messaging-ipc-data-model"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Validated command publication towards the factory bus."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
//! Command egress. Every command is validated and normalized before it may
//! touch the bus; callers get a plain boolean outcome and the details go to
//! the log, so a broker outage degrades into refused commands rather than
//! errors bubbling through the protocol layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use mf_common::config::BusConfig;
use mf_model::{CommandMessage, CommandScope, DeviceKey};

use crate::topic;
use crate::{BusError, Result};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Capability to publish operator commands onto the factory bus.
///
/// Returns `true` only when the command passed validation and was handed to
/// a live connection. Implementations never panic and never surface
/// transport errors to the caller.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Publish a command to one device's command topic.
    async fn publish_device_command(&self, key: &DeviceKey, command: CommandMessage) -> bool;

    /// Publish a command to the factory-wide broadcast topic.
    async fn publish_global_command(&self, command: CommandMessage) -> bool;
}

/// MQTT-backed [`CommandSink`].
///
/// A background driver task keeps the session alive and tracks whether the
/// broker has acknowledged the connection; publishes are refused while the
/// connection is down instead of queueing silently.
pub struct MqttCommandEgress {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

impl MqttCommandEgress {
    /// Start the egress client. The connection itself is established (and
    /// re-established after failures) by the spawned driver task.
    pub fn connect(config: &BusConfig) -> Result<Self> {
        let (host, port) = config
            .host_port()
            .map_err(|err| BusError::Endpoint(err.to_string()))?;
        let client_id = format!("mf-command-egress-{}", Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, event_loop) = AsyncClient::new(options, 16);
        let connected = Arc::new(AtomicBool::new(false));
        let driver = tokio::spawn(Self::drive(event_loop, Arc::clone(&connected)));
        Ok(Self {
            client,
            connected,
            driver,
        })
    }

    async fn drive(mut event_loop: EventLoop, connected: Arc<AtomicBool>) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected.store(true, Ordering::SeqCst);
                    info!("command egress connected to broker");
                }
                Ok(_) => {}
                Err(err) => {
                    if connected.swap(false, Ordering::SeqCst) {
                        warn!(error = %err, "command egress lost broker connection");
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Whether the broker has acknowledged the current session.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: String, command: CommandMessage, scope: CommandScope) -> bool {
        let command = match command.normalized(scope) {
            Ok(command) => command,
            Err(err) => {
                warn!(topic = %topic, error = %err, "refusing invalid command");
                return false;
            }
        };
        if !self.is_connected() {
            warn!(topic = %topic, command = %command.command_type, "bus unavailable; command not forwarded");
            return false;
        }
        let payload = match serde_json::to_vec(&command) {
            Ok(payload) => payload,
            Err(err) => {
                error!(topic = %topic, error = %err, "failed to encode command");
                return false;
            }
        };
        match self
            .client
            .publish(topic.clone(), QoS::AtLeastOnce, false, payload)
            .await
        {
            Ok(()) => {
                info!(topic = %topic, command = %command.command_type, "command published");
                true
            }
            Err(err) => {
                error!(topic = %topic, error = %err, "command publish failed");
                false
            }
        }
    }

    /// Disconnect from the broker and stop the driver task.
    pub async fn shutdown(&self) {
        let _ = self.client.disconnect().await;
        self.driver.abort();
    }
}

#[async_trait]
impl CommandSink for MqttCommandEgress {
    async fn publish_device_command(&self, key: &DeviceKey, command: CommandMessage) -> bool {
        self.publish(topic::device_command_topic(key), command, CommandScope::Device)
            .await
    }

    async fn publish_global_command(&self, command: CommandMessage) -> bool {
        self.publish(
            topic::broadcast_command_topic().to_owned(),
            command,
            CommandScope::Broadcast,
        )
        .await
    }
}

/// In-process [`CommandSink`] recording every accepted publication.
///
/// Applies the same validation and normalization as the MQTT sink, so the
/// closed loop and the protocol layer can be exercised without a broker.
/// `set_available(false)` simulates a broker outage.
pub struct InMemoryCommandSink {
    published: Mutex<Vec<(String, CommandMessage)>>,
    available: AtomicBool,
}

impl InMemoryCommandSink {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated bus availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of accepted publications as `(topic, command)` pairs, in
    /// publication order.
    pub fn published(&self) -> Vec<(String, CommandMessage)> {
        self.published.lock().clone()
    }

    fn accept(&self, topic: String, command: CommandMessage, scope: CommandScope) -> bool {
        let command = match command.normalized(scope) {
            Ok(command) => command,
            Err(err) => {
                warn!(topic = %topic, error = %err, "refusing invalid command");
                return false;
            }
        };
        if !self.available.load(Ordering::SeqCst) {
            warn!(topic = %topic, command = %command.command_type, "bus unavailable; command not forwarded");
            return false;
        }
        self.published.lock().push((topic, command));
        true
    }
}

impl Default for InMemoryCommandSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSink for InMemoryCommandSink {
    async fn publish_device_command(&self, key: &DeviceKey, command: CommandMessage) -> bool {
        self.accept(topic::device_command_topic(key), command, CommandScope::Device)
    }

    async fn publish_global_command(&self, command: CommandMessage) -> bool {
        self.accept(
            topic::broadcast_command_topic().to_owned(),
            command,
            CommandScope::Broadcast,
        )
    }
}
