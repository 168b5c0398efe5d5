//! ---
//! mfg_section: "02-messaging-ipc-data-model"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Device state, command, and SenML schema helpers."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod command;
pub mod key;
pub mod senml;
pub mod state;

pub use command::{Ack, AckStatus, CommandError, CommandMessage, CommandScope};
pub use key::DeviceKey;
pub use senml::{SenmlPack, SenmlRecord};
pub use state::{ConveyorState, DecodeError, DeviceState, QualityState, RobotState, RobotStatus};

/// Current UNIX time in milliseconds, the timestamp unit used on the wire.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
