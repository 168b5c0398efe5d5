//! ---
//! mfg_section: "02-messaging-ipc-data-model"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "MQTT topic grammar shared by ingestion and egress."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
//! Topic grammar of the factory bus. All topics live under the `mf/` root:
//!
//! * `mf/{cell}/{type}/{id}/status` — device telemetry (ingested)
//! * `mf/{cell}/{type}/{id}/cmd`    — commands towards one device
//! * `mf/broadcast/cmd`             — commands towards every device
//!
//! Devices additionally emit `mf/{cell}/{type}/{id}/ack`; the gateway does
//! not subscribe to acks.

use mf_model::DeviceKey;

/// Subscription pattern matching every device status topic.
pub const STATUS_WILDCARD: &str = "mf/+/+/+/status";

const ROOT: &str = "mf";
const BROADCAST: &str = "mf/broadcast/cmd";

/// Topic a device listens on for commands addressed to it.
pub fn device_command_topic(key: &DeviceKey) -> String {
    format!("{ROOT}/{}/cmd", key.path())
}

/// Topic a device publishes its telemetry on. The gateway subscribes via
/// [`STATUS_WILDCARD`]; the concrete form exists for tests and tooling.
pub fn device_status_topic(key: &DeviceKey) -> String {
    format!("{ROOT}/{}/status", key.path())
}

/// Topic every device listens on for factory-wide commands.
pub fn broadcast_command_topic() -> &'static str {
    BROADCAST
}

/// Parse `mf/{cell}/{type}/{id}/status` into a device key. Anything with a
/// different root, depth, literal tail, or an empty segment is rejected.
pub fn parse_status_topic(topic: &str) -> Option<DeviceKey> {
    let mut parts = topic.split('/');
    match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(ROOT), Some(cell), Some(device_type), Some(device_id), Some("status"), None) => {
            DeviceKey::new(cell, device_type, device_id)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_topic_parses_into_key_segments() {
        let key = parse_status_topic("mf/cell-01/robot/robot-001/status").expect("valid topic");
        assert_eq!(key.cell_id, "cell-01");
        assert_eq!(key.device_type, "robot");
        assert_eq!(key.device_id, "robot-001");
    }

    #[test]
    fn malformed_status_topics_are_rejected() {
        for topic in [
            "mf/cell-01/robot/robot-001",
            "mf/cell-01/robot/robot-001/cmd",
            "mf/cell-01/robot/robot-001/status/extra",
            "other/cell-01/robot/robot-001/status",
            "mf/cell-01//robot-001/status",
            "mf//robot/robot-001/status",
            "",
        ] {
            assert!(parse_status_topic(topic).is_none(), "accepted: {topic:?}");
        }
    }

    #[test]
    fn command_topics_mirror_the_status_hierarchy() {
        let key = DeviceKey::new("cell-01", "conveyor", "conveyor-002").expect("valid key");
        assert_eq!(
            device_command_topic(&key),
            "mf/cell-01/conveyor/conveyor-002/cmd"
        );
        assert_eq!(
            device_status_topic(&key),
            "mf/cell-01/conveyor/conveyor-002/status"
        );
        assert_eq!(broadcast_command_topic(), "mf/broadcast/cmd");
    }
}
