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

/// Identifies one device within the factory hierarchy.
///
/// The triple doubles as the twin store lookup key and the bus topic suffix
/// (`mf/{cell_id}/{device_type}/{device_id}/...`). All three segments must be
/// non-empty; [`DeviceKey::new`] rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    /// Production cell the device belongs to (e.g. `cell-01`).
    pub cell_id: String,
    /// Device class segment (e.g. `robot`, `conveyor`, `quality`).
    pub device_type: String,
    /// Unique device identifier within the cell (e.g. `robot-001`).
    pub device_id: String,
}

impl DeviceKey {
    /// Build a key from its three segments, rejecting empty ones.
    pub fn new(
        cell_id: impl Into<String>,
        device_type: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Option<Self> {
        let key = Self {
            cell_id: cell_id.into(),
            device_type: device_type.into(),
            device_id: device_id.into(),
        };
        if key.cell_id.is_empty() || key.device_type.is_empty() || key.device_id.is_empty() {
            return None;
        }
        Some(key)
    }

    /// Slash-joined form used in log lines and SenML base names.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.cell_id, self.device_type, self.device_id)
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.cell_id, self.device_type, self.device_id
        )
    }
}
