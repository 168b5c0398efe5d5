//! ---
//! mfg_section: "01-core-functionality"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Concurrent observable store of latest device states."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
//! The digital twin store: a concurrent map from [`DeviceKey`] to the
//! latest state snapshot, with per-key subscriber lists driving the
//! protocol layer's push notifications. The store knows nothing about
//! transports; ingestion writes into it and the resource tree reads from
//! it and listens on it.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use mf_model::{DeviceKey, DeviceState};

/// Callback bound to one device key, invoked synchronously on every state
/// replacement for that key, in registration order.
pub type StateListener = Arc<dyn Fn(&DeviceState) + Send + Sync>;

/// One device's slot: the snapshot, its listeners, and a write-order lock.
///
/// `write_order` serializes upsert+notify for the key so notifications are
/// strictly ordered by arrival; `state` stays a separate lock so readers
/// never wait behind listener fan-out.
#[derive(Default)]
struct Slot {
    write_order: Mutex<()>,
    state: RwLock<Option<DeviceState>>,
    listeners: RwLock<Vec<StateListener>>,
}

/// Concurrent map of device key to latest state snapshot.
///
/// Constructed once at startup and handed to every component as an
/// `Arc<TwinStore>`; there is no hidden global instance.
#[derive(Default)]
pub struct TwinStore {
    slots: RwLock<HashMap<DeviceKey, Arc<Slot>>>,
}

impl TwinStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &DeviceKey) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().get(key) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().entry(key.clone()).or_default())
    }

    /// Replace the entry for `key`, then synchronously invoke every
    /// listener registered for it with the new state, in registration
    /// order. A panicking listener is logged and skipped; it neither stops
    /// the remaining listeners nor propagates to the caller.
    pub fn upsert(&self, key: &DeviceKey, state: DeviceState) {
        let slot = self.slot(key);
        let _order = slot.write_order.lock();
        *slot.state.write() = Some(state.clone());
        debug!(key = %key, "twin state updated");

        // Snapshot the listener list so a listener may register further
        // listeners on the same key without deadlocking.
        let listeners: Vec<StateListener> = slot.listeners.read().clone();
        for (index, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(&state))).is_err() {
                error!(key = %key, listener = index, "state listener panicked; continuing");
            }
        }
    }

    /// Latest snapshot for `key`; `None` until the first telemetry upsert.
    pub fn get(&self, key: &DeviceKey) -> Option<DeviceState> {
        let slot = {
            let slots = self.slots.read();
            slots.get(key).cloned()
        };
        slot.and_then(|slot| slot.state.read().clone())
    }

    /// All seen states whose key belongs to `cell_id`, ordered by key.
    pub fn list_by_cell(&self, cell_id: &str) -> BTreeMap<DeviceKey, DeviceState> {
        let slots = self.slots.read();
        slots
            .iter()
            .filter(|(key, _)| key.cell_id == cell_id)
            .filter_map(|(key, slot)| {
                slot.state
                    .read()
                    .clone()
                    .map(|state| (key.clone(), state))
            })
            .collect()
    }

    /// Append `listener` to the key's subscriber list. Safe to call
    /// concurrently with upserts on the same or different keys; the slot is
    /// created eagerly so listeners can watch keys not yet seen.
    pub fn add_listener(&self, key: &DeviceKey, listener: impl Fn(&DeviceState) + Send + Sync + 'static) {
        let slot = self.slot(key);
        slot.listeners.write().push(Arc::new(listener));
        debug!(key = %key, "state listener registered");
    }

    /// Number of devices with at least one observed state.
    pub fn device_count(&self) -> usize {
        let slots = self.slots.read();
        slots
            .values()
            .filter(|slot| slot.state.read().is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use mf_model::{RobotState, RobotStatus};

    fn robot_key(id: &str) -> DeviceKey {
        DeviceKey::new("cell-01", "robot", id).expect("valid key")
    }

    fn robot_state(status: RobotStatus, timestamp: i64) -> DeviceState {
        DeviceState::Robot(RobotState {
            device_id: "robot-001".into(),
            timestamp,
            status,
            processing_time: 1.0,
        })
    }

    #[test]
    fn read_after_write_returns_latest_snapshot() {
        let store = TwinStore::new();
        let key = robot_key("robot-001");

        store.upsert(&key, robot_state(RobotStatus::Idle, 1));
        assert_eq!(store.get(&key), Some(robot_state(RobotStatus::Idle, 1)));

        store.upsert(&key, robot_state(RobotStatus::Processing, 2));
        assert_eq!(
            store.get(&key),
            Some(robot_state(RobotStatus::Processing, 2))
        );
    }

    #[test]
    fn unseen_key_reads_as_absent() {
        let store = TwinStore::new();
        assert_eq!(store.get(&robot_key("robot-404")), None);
        assert_eq!(store.device_count(), 0);
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let store = Arc::new(TwinStore::new());
        let key = robot_key("robot-001");
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            store.add_listener(&key, move |_| order.lock().push(tag));
        }

        // Concurrent upserts to unrelated keys must not disturb ordering.
        let noisy = Arc::clone(&store);
        let noise = thread::spawn(move || {
            for i in 0..100 {
                noisy.upsert(
                    &robot_key("robot-noise"),
                    robot_state(RobotStatus::Idle, i),
                );
            }
        });

        for i in 0..10 {
            store.upsert(&key, robot_state(RobotStatus::Processing, i));
        }
        noise.join().expect("noise thread");

        let recorded = order.lock().clone();
        assert_eq!(recorded.len(), 30);
        for chunk in recorded.chunks(3) {
            assert_eq!(chunk, ["first", "second", "third"]);
        }
    }

    #[test]
    fn panicking_listener_does_not_abort_the_rest() {
        let store = TwinStore::new();
        let key = robot_key("robot-001");
        let survivors = Arc::new(AtomicUsize::new(0));

        store.add_listener(&key, |_| panic!("listener bug"));
        let counter = Arc::clone(&survivors);
        store.add_listener(&key, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.upsert(&key, robot_state(RobotStatus::Idle, 1));
        assert_eq!(survivors.load(Ordering::SeqCst), 1);
        assert!(store.get(&key).is_some(), "upsert must not be aborted");
    }

    #[test]
    fn listener_observes_the_state_just_written() {
        let store = Arc::new(TwinStore::new());
        let key = robot_key("robot-001");
        let seen = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&store);
        let seen_clone = Arc::clone(&seen);
        let key_clone = key.clone();
        store.add_listener(&key, move |state| {
            // The read must already observe the value being notified.
            assert_eq!(inner.get(&key_clone).as_ref(), Some(state));
            *seen_clone.lock() = Some(state.clone());
        });

        let state = robot_state(RobotStatus::Alarm, 7);
        store.upsert(&key, state.clone());
        assert_eq!(seen.lock().clone(), Some(state));
    }

    #[test]
    fn list_by_cell_filters_and_orders_by_key() {
        let store = TwinStore::new();
        let r1 = robot_key("robot-001");
        let r2 = robot_key("robot-002");
        let other = DeviceKey::new("cell-02", "robot", "robot-001").expect("valid key");

        store.upsert(&r2, robot_state(RobotStatus::Idle, 1));
        store.upsert(&r1, robot_state(RobotStatus::Idle, 1));
        store.upsert(&other, robot_state(RobotStatus::Idle, 1));

        let listed = store.list_by_cell("cell-01");
        let keys: Vec<_> = listed.keys().cloned().collect();
        assert_eq!(keys, vec![r1, r2]);
    }

    #[test]
    fn concurrent_upserts_to_one_key_serialize_notifications() {
        let store = Arc::new(TwinStore::new());
        let key = robot_key("robot-001");
        let notifications = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&notifications);
        store.add_listener(&key, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut handles = Vec::new();
        for t in 0..4 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    store.upsert(&key, robot_state(RobotStatus::Processing, t * 1000 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("writer thread");
        }

        assert_eq!(notifications.load(Ordering::SeqCst), 200);
        assert!(store.get(&key).is_some());
    }
}
