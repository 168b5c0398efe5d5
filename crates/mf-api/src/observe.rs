//! ---
//! mfg_section: "05-networking-external-interfaces"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Per-device observe channels bridging the twin to WebSocket clients."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use mf_model::{DeviceKey, DeviceState};
use mf_twin::TwinStore;

const OBSERVE_CAPACITY: usize = 32;

/// Lazily created per-device broadcast channels.
///
/// The first use of a device's state path creates its channel and registers
/// exactly one twin listener forwarding every replacement into it. Slow
/// observers lag and drop frames rather than backpressuring the ingest
/// path.
pub struct ObserverRegistry {
    twin: Arc<TwinStore>,
    channels: Mutex<HashMap<DeviceKey, broadcast::Sender<DeviceState>>>,
}

impl ObserverRegistry {
    pub fn new(twin: Arc<TwinStore>) -> Self {
        Self {
            twin,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, key: &DeviceKey) -> broadcast::Sender<DeviceState> {
        let mut channels = self.channels.lock();
        if let Some(sender) = channels.get(key) {
            return sender.clone();
        }
        let (sender, _) = broadcast::channel(OBSERVE_CAPACITY);
        let forward = sender.clone();
        self.twin.add_listener(key, move |state| {
            // No receiver connected is not an error.
            let _ = forward.send(state.clone());
        });
        channels.insert(key.clone(), sender.clone());
        debug!(key = %key, "observe channel created");
        sender
    }

    /// Subscribe to state replacements for `key`.
    pub fn subscribe(&self, key: &DeviceKey) -> broadcast::Receiver<DeviceState> {
        self.sender(key).subscribe()
    }

    /// Proactively re-send the current snapshot, used when a command accept
    /// marks the sibling state resource changed. A no-op for unseen keys.
    pub fn mark_changed(&self, key: &DeviceKey) {
        if let Some(state) = self.twin.get(key) {
            let _ = self.sender(key).send(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mf_model::{DeviceState, RobotState, RobotStatus};

    fn robot_key() -> DeviceKey {
        DeviceKey::new("cell-01", "robot", "robot-001").expect("valid key")
    }

    fn robot_state(status: RobotStatus) -> DeviceState {
        DeviceState::Robot(RobotState {
            device_id: "robot-001".into(),
            timestamp: 1,
            status,
            processing_time: 0.5,
        })
    }

    #[tokio::test]
    async fn upserts_flow_through_the_channel() {
        let twin = Arc::new(TwinStore::new());
        let registry = ObserverRegistry::new(Arc::clone(&twin));
        let mut receiver = registry.subscribe(&robot_key());

        twin.upsert(&robot_key(), robot_state(RobotStatus::Processing));
        let received = receiver.recv().await.expect("frame delivered");
        assert_eq!(received, robot_state(RobotStatus::Processing));
    }

    #[tokio::test]
    async fn mark_changed_resends_the_current_snapshot() {
        let twin = Arc::new(TwinStore::new());
        let registry = ObserverRegistry::new(Arc::clone(&twin));

        // Unseen key: nothing to resend, nothing breaks.
        registry.mark_changed(&robot_key());

        twin.upsert(&robot_key(), robot_state(RobotStatus::Idle));
        let mut receiver = registry.subscribe(&robot_key());
        registry.mark_changed(&robot_key());

        let received = receiver.recv().await.expect("snapshot resent");
        assert_eq!(received, robot_state(RobotStatus::Idle));
    }

    #[tokio::test]
    async fn one_listener_serves_many_subscribers() {
        let twin = Arc::new(TwinStore::new());
        let registry = ObserverRegistry::new(Arc::clone(&twin));
        let mut first = registry.subscribe(&robot_key());
        let mut second = registry.subscribe(&robot_key());

        twin.upsert(&robot_key(), robot_state(RobotStatus::Alarm));
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
    }
}
