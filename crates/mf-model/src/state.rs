//! ---
//! mfg_section: "02-messaging-ipc-data-model"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Device state, command, and SenML schema helpers."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::senml::SenmlPack;

/// Operational status reported by a robot cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotStatus {
    /// Waiting for a new task.
    Idle,
    /// Executing a work cycle.
    Processing,
    /// Fault condition requiring intervention.
    Alarm,
}

impl RobotStatus {
    /// Stable numeric encoding used by the SenML representation.
    pub fn ordinal(self) -> u8 {
        match self {
            RobotStatus::Idle => 0,
            RobotStatus::Processing => 1,
            RobotStatus::Alarm => 2,
        }
    }

    /// Upper-case wire token (`IDLE`, `PROCESSING`, `ALARM`).
    pub fn as_str(self) -> &'static str {
        match self {
            RobotStatus::Idle => "IDLE",
            RobotStatus::Processing => "PROCESSING",
            RobotStatus::Alarm => "ALARM",
        }
    }
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Telemetry snapshot of a robot cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotState {
    /// Device identifier as reported in the payload.
    pub device_id: String,
    /// UNIX epoch milliseconds when the state was sampled.
    pub timestamp: i64,
    /// Current operational status.
    pub status: RobotStatus,
    /// Duration of the last work cycle, in seconds.
    pub processing_time: f64,
}

/// Telemetry snapshot of a conveyor belt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConveyorState {
    /// Device identifier as reported in the payload.
    pub device_id: String,
    /// UNIX epoch milliseconds when the state was sampled.
    pub timestamp: i64,
    /// Whether the belt is currently running.
    pub active: bool,
    /// Belt speed in objects per minute; never negative.
    pub speed: f64,
}

/// Telemetry snapshot of a quality-control sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityState {
    /// Device identifier as reported in the payload.
    pub device_id: String,
    /// UNIX epoch milliseconds when the data was sampled.
    pub timestamp: i64,
    /// Total objects inspected so far.
    pub total_processed: u64,
    /// Objects that passed inspection.
    pub good_count: u64,
    /// Objects that failed inspection.
    pub bad_count: u64,
}

/// Latest known state of a device, tagged by device class.
///
/// Serializes untagged so the JSON body is exactly the device payload; the
/// class is carried out of band by the topic / resource path, which is also
/// why decoding goes through [`DeviceState::decode`] rather than serde's
/// variant inference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviceState {
    /// Robot cell snapshot.
    Robot(RobotState),
    /// Conveyor belt snapshot.
    Conveyor(ConveyorState),
    /// Quality sensor snapshot.
    Quality(QualityState),
}

/// Failure decoding an inbound telemetry payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The topic carried a device type the gateway does not know.
    #[error("unknown device type: {0}")]
    UnknownDeviceType(String),
    /// The payload did not match the schema for the device type.
    #[error("payload decode failed: {0}")]
    Payload(#[from] serde_json::Error),
}

impl DeviceState {
    /// Decode a telemetry payload according to the device type segment of
    /// the topic it arrived on.
    pub fn decode(device_type: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        match device_type {
            "robot" => Ok(DeviceState::Robot(serde_json::from_slice(payload)?)),
            "conveyor" => Ok(DeviceState::Conveyor(serde_json::from_slice(payload)?)),
            "quality" => Ok(DeviceState::Quality(serde_json::from_slice(payload)?)),
            other => Err(DecodeError::UnknownDeviceType(other.to_owned())),
        }
    }

    /// Sample timestamp in epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        match self {
            DeviceState::Robot(s) => s.timestamp,
            DeviceState::Conveyor(s) => s.timestamp,
            DeviceState::Quality(s) => s.timestamp,
        }
    }

    /// True when the state is a robot in `ALARM`, the condition that
    /// triggers closed-loop remediation.
    pub fn is_alarm(&self) -> bool {
        matches!(
            self,
            DeviceState::Robot(RobotState {
                status: RobotStatus::Alarm,
                ..
            })
        )
    }

    /// Plain-text rendering: the primary status token for a robot, the
    /// state's natural text form otherwise.
    pub fn status_text(&self) -> String {
        match self {
            DeviceState::Robot(s) => s.status.to_string(),
            DeviceState::Conveyor(s) => {
                format!("active={} speed={}", s.active, s.speed)
            }
            DeviceState::Quality(s) => format!(
                "processed={} good={} bad={}",
                s.total_processed, s.good_count, s.bad_count
            ),
        }
    }

    /// Compact sensor-measurement rendering: one primary numeric field with
    /// a unit label and the sample timestamp; a conveyor additionally
    /// carries its running flag as a boolean record.
    pub fn to_senml(&self, base_name: &str) -> SenmlPack {
        match self {
            DeviceState::Robot(s) => SenmlPack::numeric(
                base_name,
                "status",
                f64::from(s.status.ordinal()),
                "state",
                s.timestamp,
            ),
            DeviceState::Conveyor(s) => {
                let mut pack =
                    SenmlPack::numeric(base_name, "speed", s.speed, "obj/min", s.timestamp);
                pack.push_boolean("active", s.active, s.timestamp);
                pack
            }
            DeviceState::Quality(s) => SenmlPack::numeric(
                base_name,
                "totalProcessed",
                s.total_processed as f64,
                "count",
                s.timestamp,
            ),
        }
    }
}
