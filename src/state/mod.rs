// State management module
//
// This module provides the StateManager which wraps LaserState with
// thread-safe access using Arc<RwLock<T>> and emits change events for GUI
// updates.

use crate::models::LaserState;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events are emitted to notify interested parties (primarily the GUI)
/// about state changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A device handle was opened or closed
    ConnectionChanged {
        connected: bool,
        device_id: Option<String>,
    },

    /// The laser was commanded on or off
    EnableChanged {
        enabled: bool,
    },

    /// The device entered or left the emitting state
    EmissionChanged {
        emitting: bool,
    },

    /// The commanded power setpoint changed
    PowerChanged {
        milliwatts: u16,
    },

    /// The last polled device status changed
    StatusChanged {
        head: String,
        system: String,
    },

    /// The status-bar operation line changed
    OperationChanged {
        operation: String,
    },

    /// A device workflow started or finished
    BusyChanged {
        busy: bool,
    },
}

/// Thread-safe state manager with event emission
///
/// This is the central state management component that:
/// - Provides thread-safe access to [`LaserState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// It plays the role the Qt signal pairs played in the predecessor setup:
/// one direction of the UI<->control notification scheme.
///
/// # Usage
///
/// Always use `StateManager` instead of accessing [`LaserState`] directly:
/// - [`read()`](Self::read) for reading state without cloning
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    /// The panel state protected by RwLock for thread-safe access
    state: Arc<RwLock<LaserState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(LaserState::default())),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    ///
    /// This clones the entire state, so it's safe to use without holding locks.
    pub fn snapshot(&self) -> LaserState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let enabled = state_manager.read(|state| state.laser_enabled);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&LaserState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// This is the primary way to modify state. It:
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut LaserState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state changes.
    /// Multiple subscribers can listen simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(&self, old: &LaserState, new: &LaserState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_connected != new.is_connected
            || old.device_id != new.device_id
            || old.port_name != new.port_name
        {
            changes.push(StateChange::ConnectionChanged {
                connected: new.is_connected,
                device_id: new.device_id.clone(),
            });
        }

        if old.laser_enabled != new.laser_enabled {
            changes.push(StateChange::EnableChanged {
                enabled: new.laser_enabled,
            });
        }

        if old.emission != new.emission {
            changes.push(StateChange::EmissionChanged {
                emitting: new.emission,
            });
        }

        if old.power_mw != new.power_mw {
            changes.push(StateChange::PowerChanged {
                milliwatts: new.power_mw,
            });
        }

        if old.head_status != new.head_status || old.system_status != new.system_status {
            changes.push(StateChange::StatusChanged {
                head: new.head_status.clone(),
                system: new.system_status.clone(),
            });
        }

        if old.current_operation != new.current_operation {
            changes.push(StateChange::OperationChanged {
                operation: new.current_operation.clone(),
            });
        }

        if old.is_busy != new.is_busy {
            changes.push(StateChange::BusyChanged { busy: new.is_busy });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Record an opened device handle
    pub fn set_connected(&self, port_name: String, device_id: String) -> Vec<StateChange> {
        self.update(|state| {
            state.port_name = Some(port_name.clone());
            state.device_id = Some(device_id.clone());
            state.is_connected = true;
        })
    }

    /// Record a closed device handle
    pub fn set_disconnected(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_connected = false;
            state.reset_emission_state();
            state.current_operation = "Serial port closed".to_string();
        })
    }

    /// Mark the start of an enable/disable workflow
    pub fn begin_operation(&self, operation: &str) -> Vec<StateChange> {
        self.update(|state| {
            state.is_busy = true;
            state.current_operation = operation.to_string();
        })
    }

    /// Mark the end of the current workflow
    pub fn finish_operation(&self, operation: &str) -> Vec<StateChange> {
        self.update(|state| {
            state.is_busy = false;
            state.current_operation = operation.to_string();
        })
    }

    /// Record that the laser was commanded on
    pub fn laser_enabled(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.laser_enabled = true;
        })
    }

    /// Record that the laser was commanded off.
    ///
    /// The commanded power is always reset to zero alongside, so re-enabling
    /// never starts at a stale setpoint.
    pub fn laser_disabled(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_emission_state();
        })
    }

    /// Record the emission flag reported by the device
    pub fn set_emission(&self, emitting: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.emission = emitting;
        })
    }

    /// Record the commanded power setpoint
    pub fn set_power(&self, milliwatts: u16) -> Vec<StateChange> {
        self.update(|state| {
            state.power_mw = milliwatts;
        })
    }

    /// Record the last polled status pair
    pub fn record_status(&self, head: String, system: String) -> Vec<StateChange> {
        self.update(|state| {
            state.head_status = head;
            state.system_status = system;
        })
    }

    /// Load emission-wait timings and limits from settings
    ///
    /// This populates LaserState from the settings file once at startup.
    pub fn load_from_settings(&self, settings: &crate::models::PanelSettings) -> Vec<StateChange> {
        self.update(|state| {
            let s = &settings.laser_settings;

            state.warmup = Duration::from_secs(s.warmup_secs);
            state.poll_interval = Duration::from_millis(s.poll_interval_ms);
            state.max_polls = s.max_polls;
            state.power_limit_mw = s.power_limit_mw.min(crate::models::MAX_POWER_MW);

            tracing::info!(
                "Loaded settings: warmup={}s, poll={}ms x {}, power_limit={}mW",
                s.warmup_secs,
                s.poll_interval_ms,
                s.max_polls,
                state.power_limit_mw
            );
        })
    }

    /// Get an Arc reference to the state for use in worker threads
    pub fn state_arc(&self) -> Arc<RwLock<LaserState>> {
        Arc::clone(&self.state)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert!(!state.laser_enabled);
        assert!(!state.emission);
        assert_eq!(state.power_mw, 0);
    }

    #[test]
    fn test_update_with_change_detection() {
        let manager = StateManager::new();

        let changes = manager.update(|state| {
            state.laser_enabled = true;
            state.power_mw = 10;
        });

        assert_eq!(changes.len(), 2);
        assert!(matches!(changes[0], StateChange::EnableChanged { enabled: true }));
        assert!(matches!(changes[1], StateChange::PowerChanged { milliwatts: 10 }));
    }

    #[test]
    fn test_connection_changes() {
        let manager = StateManager::new();

        let changes =
            manager.set_connected("/dev/ttyUSB0".to_string(), "MiniLas Evo 640".to_string());

        assert_eq!(changes.len(), 1);
        assert!(matches!(
            changes[0],
            StateChange::ConnectionChanged { connected: true, .. }
        ));

        let state = manager.snapshot();
        assert!(state.is_ready());
    }

    #[test]
    fn test_disable_resets_power() {
        let manager = StateManager::new();
        manager.laser_enabled();
        manager.set_power(50);
        manager.set_emission(true);

        let changes = manager.laser_disabled();

        let state = manager.snapshot();
        assert!(!state.laser_enabled);
        assert!(!state.emission);
        assert_eq!(state.power_mw, 0);

        assert!(changes.iter().any(|c| matches!(c, StateChange::PowerChanged { milliwatts: 0 })));
        assert!(changes.iter().any(|c| matches!(c, StateChange::EmissionChanged { emitting: false })));
    }

    #[test]
    fn test_status_change_detection() {
        let manager = StateManager::new();

        let changes = manager.record_status(
            "Temperature of laser head is ok".to_string(),
            "Laser system is starting up".to_string(),
        );

        assert_eq!(changes.len(), 1);
        match &changes[0] {
            StateChange::StatusChanged { head, system } => {
                assert!(head.contains("ok"));
                assert!(system.contains("starting up"));
            }
            other => panic!("Expected StatusChanged, got: {:?}", other),
        }

        // Re-recording the same pair emits nothing
        let changes = manager.record_status(
            "Temperature of laser head is ok".to_string(),
            "Laser system is starting up".to_string(),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn test_busy_and_operation_events() {
        let manager = StateManager::new();

        let changes = manager.begin_operation("Turning laser on...");
        assert!(changes.iter().any(|c| matches!(c, StateChange::BusyChanged { busy: true })));
        assert!(changes.iter().any(|c| matches!(c, StateChange::OperationChanged { .. })));

        let changes = manager.finish_operation("Laser emitting");
        assert!(changes.iter().any(|c| matches!(c, StateChange::BusyChanged { busy: false })));
    }

    #[test]
    fn test_load_from_settings() {
        use crate::models::PanelSettings;

        let manager = StateManager::new();
        let mut settings = PanelSettings::default();
        settings.laser_settings.warmup_secs = 2;
        settings.laser_settings.max_polls = 8;
        settings.laser_settings.power_limit_mw = 200; // clamped to hardware ceiling

        manager.load_from_settings(&settings);

        let state = manager.snapshot();
        assert_eq!(state.warmup, Duration::from_secs(2));
        assert_eq!(state.max_polls, 8);
        assert_eq!(state.power_limit_mw, crate::models::MAX_POWER_MW);
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.set_emission(true);

        let event = rx.try_recv();
        assert!(event.is_ok());
        assert!(matches!(event.unwrap(), StateChange::EmissionChanged { emitting: true }));
    }

    #[test]
    fn test_multiple_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.laser_enabled();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_read_with_closure() {
        let manager = StateManager::new();
        manager.set_power(42);

        let power = manager.read(|state| state.power_mw);
        assert_eq!(power, 42);
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.set_power(10);

        let state = manager2.snapshot();
        assert_eq!(state.power_mw, 10);
    }

    #[test]
    fn test_state_arc() {
        let manager = StateManager::new();
        let state_arc = manager.state_arc();

        {
            let mut state = state_arc.write().unwrap();
            state.power_mw = 33;
        }

        let state = manager.snapshot();
        assert_eq!(state.power_mw, 33);
    }
}
