//! ---
//! mfg_section: "02-messaging-ipc-data-model"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "MQTT bus adapters: command egress and telemetry ingestion."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
//! Bus-facing adapters for the gateway. [`egress`] publishes validated
//! operator commands, [`ingest`] consumes device telemetry into the twin
//! store and closes the remediation loop, [`topic`] owns the topic grammar
//! shared by both directions.

pub mod egress;
pub mod ingest;
pub mod topic;

/// Shared result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors raised while setting up bus adapters. Runtime publish, subscribe,
/// and decode failures never surface through this type; they are logged and
/// reported as boolean outcomes per the egress contract.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The configured broker endpoint could not be parsed.
    #[error("invalid broker endpoint: {0}")]
    Endpoint(String),
}

pub use egress::{CommandSink, InMemoryCommandSink, MqttCommandEgress};
pub use ingest::{IngestorHandle, IngestorPhase, TelemetryIngestor, TelemetryProcessor};
pub use topic::{
    broadcast_command_topic, device_command_topic, device_status_topic, parse_status_topic,
    STATUS_WILDCARD,
};
