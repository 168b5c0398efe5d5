//! ---
//! mfg_section: "02-messaging-ipc-data-model"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Telemetry ingestion from the factory bus into the twin store."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
//! Telemetry ingestion. [`TelemetryProcessor`] is the transport-free core:
//! it parses the topic, decodes the payload by device class, updates the
//! twin, and closes the remediation loop for robot alarms.
//! [`TelemetryIngestor`] wraps it in an MQTT subscription that survives
//! broker restarts.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use mf_common::config::BusConfig;
use mf_model::{CommandMessage, DeviceState};
use mf_twin::TwinStore;

use crate::egress::CommandSink;
use crate::topic::{parse_status_topic, STATUS_WILDCARD};
use crate::{BusError, Result};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connection lifecycle of the telemetry subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestorPhase {
    /// No broker session; waiting to reconnect.
    Disconnected,
    /// Session establishment or resubscription in flight.
    Connecting,
    /// Subscription acknowledged; telemetry is flowing.
    Subscribed,
}

/// Transport-free handling of one delivered telemetry message.
pub struct TelemetryProcessor {
    twin: Arc<TwinStore>,
    commands: Arc<dyn CommandSink>,
    auto_reset_on_alarm: bool,
}

impl TelemetryProcessor {
    pub fn new(
        twin: Arc<TwinStore>,
        commands: Arc<dyn CommandSink>,
        auto_reset_on_alarm: bool,
    ) -> Self {
        Self {
            twin,
            commands,
            auto_reset_on_alarm,
        }
    }

    /// Handle one delivered message. Malformed topics and undecodable
    /// payloads are logged and dropped without touching the twin; a robot
    /// `ALARM` additionally dispatches a `RESET` without blocking the
    /// delivery loop.
    pub async fn process(&self, topic: &str, payload: &[u8]) {
        let Some(key) = parse_status_topic(topic) else {
            warn!(topic = %topic, "dropping message with unrecognized topic");
            return;
        };
        let state = match DeviceState::decode(&key.device_type, payload) {
            Ok(state) => state,
            Err(err) => {
                warn!(key = %key, error = %err, "dropping undecodable telemetry");
                return;
            }
        };

        let alarm = state.is_alarm();
        self.twin.upsert(&key, state);

        if alarm && self.auto_reset_on_alarm {
            warn!(key = %key, "robot reported ALARM; dispatching RESET");
            let commands = Arc::clone(&self.commands);
            tokio::spawn(async move {
                if !commands
                    .publish_device_command(&key, CommandMessage::new("RESET"))
                    .await
                {
                    error!(key = %key, "RESET remediation could not be published");
                }
            });
        }
    }
}

/// Handle to the running ingestion tasks.
pub struct IngestorHandle {
    phase: Arc<Mutex<IngestorPhase>>,
    poll_task: JoinHandle<()>,
    stats_task: JoinHandle<()>,
}

impl IngestorHandle {
    /// Current connection phase.
    pub fn phase(&self) -> IngestorPhase {
        *self.phase.lock()
    }

    /// Stop the delivery loop and the statistics ticker.
    pub async fn shutdown(self) {
        self.poll_task.abort();
        self.stats_task.abort();
    }
}

/// MQTT subscription feeding a [`TelemetryProcessor`].
pub struct TelemetryIngestor;

impl TelemetryIngestor {
    /// Spawn the ingestion tasks: a delivery loop subscribed to
    /// [`STATUS_WILDCARD`] and a periodic statistics log line. The
    /// subscription is re-issued after every reconnect, so a broker restart
    /// only costs the messages published while the session was down.
    pub fn spawn(
        config: &BusConfig,
        processor: TelemetryProcessor,
        stats_interval: Duration,
    ) -> Result<IngestorHandle> {
        let (host, port) = config
            .host_port()
            .map_err(|err| BusError::Endpoint(err.to_string()))?;
        let client_id = format!("mf-telemetry-ingestor-{}", Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, event_loop) = AsyncClient::new(options, 64);
        let phase = Arc::new(Mutex::new(IngestorPhase::Connecting));

        let twin = Arc::clone(&processor.twin);
        let poll_task = tokio::spawn(Self::run(client, event_loop, processor, Arc::clone(&phase)));
        let stats_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(stats_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                info!(devices = twin.device_count(), "twin statistics");
            }
        });

        Ok(IngestorHandle {
            phase,
            poll_task,
            stats_task,
        })
    }

    async fn run(
        client: AsyncClient,
        mut event_loop: EventLoop,
        processor: TelemetryProcessor,
        phase: Arc<Mutex<IngestorPhase>>,
    ) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(
                        session_present = ack.session_present,
                        "connected to broker; subscribing to telemetry"
                    );
                    if let Err(err) = client.subscribe(STATUS_WILDCARD, QoS::AtLeastOnce).await {
                        error!(error = %err, "telemetry subscribe failed");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    *phase.lock() = IngestorPhase::Subscribed;
                    info!(pattern = STATUS_WILDCARD, "telemetry subscription active");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    processor.process(&publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(err) => {
                    *phase.lock() = IngestorPhase::Disconnected;
                    warn!(error = %err, "telemetry connection lost; reconnecting");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    *phase.lock() = IngestorPhase::Connecting;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mf_model::{DeviceKey, RobotStatus};

    use crate::egress::InMemoryCommandSink;

    fn processor(auto_reset: bool) -> (Arc<TwinStore>, Arc<InMemoryCommandSink>, TelemetryProcessor)
    {
        let twin = Arc::new(TwinStore::new());
        let sink = Arc::new(InMemoryCommandSink::new());
        let processor = TelemetryProcessor::new(
            Arc::clone(&twin),
            Arc::clone(&sink) as Arc<dyn CommandSink>,
            auto_reset,
        );
        (twin, sink, processor)
    }

    async fn settle() {
        // Give the fire-and-forget remediation task a chance to run.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn telemetry_lands_in_the_twin() {
        let (twin, _sink, processor) = processor(true);
        processor
            .process(
                "mf/cell-01/conveyor/conveyor-001/status",
                br#"{"deviceId":"conveyor-001","timestamp":5,"active":true,"speed":30.0}"#,
            )
            .await;

        let key = DeviceKey::new("cell-01", "conveyor", "conveyor-001").expect("valid key");
        let state = twin.get(&key).expect("state stored");
        assert_eq!(state.timestamp(), 5);
    }

    #[tokio::test]
    async fn malformed_input_is_dropped_without_side_effects() {
        let (twin, sink, processor) = processor(true);

        // Wrong topic shape.
        processor.process("mf/cell-01/robot/status", b"{}").await;
        // Unknown device class.
        processor
            .process("mf/cell-01/drone/drone-001/status", b"{}")
            .await;
        // Payload that does not match the class schema.
        processor
            .process("mf/cell-01/robot/robot-001/status", b"not-json")
            .await;
        settle().await;

        assert_eq!(twin.device_count(), 0);
        assert!(sink.published().is_empty());
    }

    #[tokio::test]
    async fn robot_alarm_triggers_reset_remediation() {
        let (twin, sink, processor) = processor(true);
        processor
            .process(
                "mf/cell-01/robot/robot-001/status",
                br#"{"deviceId":"robot-001","timestamp":9,"status":"ALARM","processingTime":0.0}"#,
            )
            .await;
        settle().await;

        // The alarm state itself is stored before remediation fires.
        let key = DeviceKey::new("cell-01", "robot", "robot-001").expect("valid key");
        match twin.get(&key) {
            Some(DeviceState::Robot(state)) => assert_eq!(state.status, RobotStatus::Alarm),
            other => panic!("unexpected twin entry: {other:?}"),
        }

        let published = sink.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "mf/cell-01/robot/robot-001/cmd");
        assert_eq!(published[0].1.command_type, "RESET");
        assert!(published[0].1.ts > 0);
    }

    #[tokio::test]
    async fn every_alarm_report_redispatches_reset() {
        let (_twin, sink, processor) = processor(true);
        let payload =
            br#"{"deviceId":"robot-001","timestamp":9,"status":"ALARM","processingTime":0.0}"#;
        processor
            .process("mf/cell-01/robot/robot-001/status", payload)
            .await;
        processor
            .process("mf/cell-01/robot/robot-001/status", payload)
            .await;
        settle().await;

        assert_eq!(sink.published().len(), 2);
    }

    #[tokio::test]
    async fn remediation_respects_the_auto_reset_toggle() {
        let (twin, sink, processor) = processor(false);
        processor
            .process(
                "mf/cell-01/robot/robot-001/status",
                br#"{"deviceId":"robot-001","timestamp":9,"status":"ALARM","processingTime":0.0}"#,
            )
            .await;
        settle().await;

        assert_eq!(twin.device_count(), 1, "state is still recorded");
        assert!(sink.published().is_empty(), "no RESET when disabled");
    }

    #[tokio::test]
    async fn non_alarm_states_do_not_trigger_remediation() {
        let (_twin, sink, processor) = processor(true);
        processor
            .process(
                "mf/cell-01/robot/robot-001/status",
                br#"{"deviceId":"robot-001","timestamp":9,"status":"PROCESSING","processingTime":2.5}"#,
            )
            .await;
        processor
            .process(
                "mf/cell-01/quality/qc-001/status",
                br#"{"deviceId":"qc-001","timestamp":9,"totalProcessed":10,"goodCount":9,"badCount":1}"#,
            )
            .await;
        settle().await;

        assert!(sink.published().is_empty());
    }
}
