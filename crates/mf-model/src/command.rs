//! ---
//! mfg_section: "02-messaging-ipc-data-model"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Device state, command, and SenML schema helpers."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::epoch_millis;

/// Which command vocabulary applies: a single device or the whole factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// Commands addressed to one device (`START`, `STOP`, `RESET`).
    Device,
    /// Broadcast commands for every device, including `EMERGENCY`.
    Broadcast,
}

impl CommandScope {
    /// The accepted command types for this scope, in upper-case form.
    pub fn vocabulary(self) -> &'static [&'static str] {
        match self {
            CommandScope::Device => &["START", "STOP", "RESET"],
            CommandScope::Broadcast => &["START", "STOP", "RESET", "EMERGENCY"],
        }
    }

    /// Whether an already upper-cased type belongs to this vocabulary.
    pub fn allows(self, command_type: &str) -> bool {
        self.vocabulary().contains(&command_type)
    }
}

/// Validation failure for an operator command.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command carried no type at all.
    #[error("command type is missing or empty")]
    EmptyType,
    /// The type is not part of the scope's vocabulary.
    #[error("unsupported command type: {0}")]
    UnsupportedType(String),
}

/// Command published towards a device or the broadcast channel.
///
/// Wire shape follows the device contract: `{"type": "...", "ts": ...,
/// "msgId": "..."}` with `msgId` omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Command verb; normalized to upper-case before publication.
    #[serde(rename = "type")]
    pub command_type: String,
    /// UNIX epoch milliseconds; stamped at publish time when non-positive.
    #[serde(default)]
    pub ts: i64,
    /// Optional correlation id echoed back in the device ack.
    #[serde(rename = "msgId", default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
}

impl CommandMessage {
    /// Build a command stamped with the current time.
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            ts: epoch_millis(),
            msg_id: None,
        }
    }

    /// Attach a correlation id for ack matching.
    pub fn with_msg_id(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_id = Some(msg_id.into());
        self
    }

    /// Validate against `scope` and return the normalized command: type
    /// trimmed and upper-cased, timestamp stamped if missing. Validation
    /// always happens before publication; a failing command never reaches
    /// the bus.
    pub fn normalized(mut self, scope: CommandScope) -> Result<Self, CommandError> {
        let trimmed = self.command_type.trim();
        if trimmed.is_empty() {
            return Err(CommandError::EmptyType);
        }
        let upper = trimmed.to_ascii_uppercase();
        if !scope.allows(&upper) {
            return Err(CommandError::UnsupportedType(upper));
        }
        self.command_type = upper;
        if self.ts <= 0 {
            self.ts = epoch_millis();
        }
        Ok(self)
    }
}

/// Status carried by a device acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    /// The command was accepted and executed.
    Ok,
    /// The command was rejected or failed on the device.
    Error,
}

/// Acknowledgement emitted by a device in response to a command.
///
/// The gateway documents but does not consume acks; they flow on
/// `mf/{cell}/{type}/{id}/ack` for external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Command type this ack refers to.
    #[serde(rename = "cmdType")]
    pub cmd_type: String,
    /// Outcome reported by the device.
    pub status: AckStatus,
    /// Optional human-readable detail.
    #[serde(default)]
    pub message: String,
    /// UNIX epoch milliseconds when the ack was produced.
    pub ts: i64,
    /// Correlation id copied from the originating command, if any.
    #[serde(rename = "msgId", default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
}
