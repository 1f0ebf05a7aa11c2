// GUI Controller - Bridges the Slint panel with the laser control layer
//
// This module contains the GuiController which coordinates between:
// - Slint UI (MainWindow)
// - StateManager (panel state + change events)
// - LaserService (device commands, emission wait)
// - EventLoopBridge (async/GUI coordination)
//
// It handles:
// - Panel callbacks -> async laser workflows
// - Subscribing to state changes -> UI updates (LED, spinbox, status line)

use crate::models::LaserState;
use crate::services::{EmissionOutcome, EmissionWait, LaserService};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::EventLoopBridge;
use anyhow::{Context, Result};
use std::sync::Arc;

// Include the generated Slint code
slint::include_modules!();

/// GUI Controller that wires the Slint panel to the laser control layer
///
/// This is the main coordinator for the GUI layer. It:
/// - Creates and manages the EventLoopBridge for tokio/Slint coordination
/// - Turns panel callbacks (laser button, power spinbox) into async workflows
/// - Subscribes to StateManager events and reflects them in the panel
///
/// The workflows mirror what the bench procedure requires: enabling queries
/// the identity, commands the laser on and runs the bounded emission wait;
/// disabling zeroes the power before commanding off.
pub struct GuiController {
    /// The Slint UI window
    ui: MainWindow,

    /// Event loop bridge, kept alive for the duration of the panel
    _bridge: EventLoopBridge<MainWindow>,
}

impl GuiController {
    /// Create a new GUI controller
    ///
    /// # Arguments
    /// * `state_manager` - Shared panel state manager
    /// * `service` - Laser service owning the device handle
    /// * `tokio_handle` - Handle to the tokio runtime for spawning workflows
    pub fn new(
        state_manager: Arc<StateManager>,
        service: Arc<LaserService>,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;

        let bridge = EventLoopBridge::new(&ui, tokio_handle);

        // Initialize UI with current state
        Self::sync_ui_with_state(&ui, &state_manager);

        // Wire panel callbacks to workflows
        Self::setup_callbacks(&ui, &bridge, &state_manager, &service);

        // Subscribe to state changes and update UI
        Self::setup_state_subscription(&bridge, &state_manager);

        tracing::info!("GUI controller initialized");

        Ok(Self { ui, _bridge: bridge })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        self.ui.run()
    }

    /// Synchronize UI with current state, called once at startup.
    fn sync_ui_with_state(ui: &MainWindow, state_manager: &StateManager) {
        let state = state_manager.snapshot();

        ui.set_laser_on(state.laser_enabled);
        ui.set_power_mw(state.power_mw as i32);
        ui.set_emission(state.emission);
        ui.set_busy(state.is_busy);
        ui.set_device_id(state.device_id.clone().unwrap_or_default().into());
        ui.set_status_message(Self::get_status_message(&state).into());

        tracing::debug!("UI synchronized with initial state");
    }

    /// Set up Slint UI callbacks
    ///
    /// This connects panel events (button clicks, spinbox edits) to the laser
    /// workflows.
    fn setup_callbacks(
        ui: &MainWindow,
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
        service: &Arc<LaserService>,
    ) {
        let bridge_handle = bridge.clone_handle();
        let state = Arc::clone(state_manager);
        let service_clone = Arc::clone(service);
        let ui_weak = ui.as_weak();

        // Laser On button (checkable): run the enable or disable workflow
        ui.on_laser_toggled(move || {
            let Some(ui) = ui_weak.upgrade() else { return };
            let enable = ui.get_laser_on();
            tracing::info!("Laser button toggled: {}", enable);

            if state.read(|s| s.is_busy) {
                // Button is disabled while busy; a queued click still lands here
                tracing::debug!("Ignoring toggle while a laser workflow is running");
                return;
            }

            let state = Arc::clone(&state);
            let service = Arc::clone(&service_clone);

            bridge_handle.spawn_async(move || async move {
                let result = if enable {
                    Self::run_enable_workflow(state, service).await
                } else {
                    Self::run_disable_workflow(state, service).await
                };

                if let Err(e) = result {
                    tracing::error!("Laser workflow error: {:#}", e);
                }
            });
        });

        let bridge_handle = bridge.clone_handle();
        let state = Arc::clone(state_manager);
        let service_clone = Arc::clone(service);

        // Power spinbox edited: forward the setpoint while the laser is on
        ui.on_power_edited(move |value| {
            let Ok(milliwatts) = u16::try_from(value) else {
                return;
            };

            if !state.read(|s| s.laser_enabled) {
                // Same guard the control layer always had: setpoints while the
                // laser is off never reach the device
                tracing::debug!("Power edit ignored while laser is off: {} mW", milliwatts);
                return;
            }

            let state = Arc::clone(&state);
            let service = Arc::clone(&service_clone);

            bridge_handle.spawn_async(move || async move {
                if let Err(e) = Self::run_power_workflow(state, service, milliwatts).await {
                    tracing::error!("Power workflow error: {:#}", e);
                }
            });
        });

        tracing::debug!("UI callbacks configured");
    }

    /// Subscribe to state changes and update UI accordingly
    ///
    /// This spawns a background thread that listens for state change events
    /// and updates the Slint UI via the EventLoopBridge.
    fn setup_state_subscription(
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
    ) {
        let bridge_handle = bridge.clone_handle();
        let state_manager_clone = Arc::clone(state_manager);
        let mut rx = state_manager.subscribe();

        std::thread::spawn(move || {
            tracing::debug!("State subscription thread started");

            loop {
                match rx.blocking_recv() {
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);

                        let snapshot = state_manager_clone.snapshot();
                        let status = Self::get_status_message(&snapshot);

                        match change {
                            StateChange::ConnectionChanged { connected, device_id } => {
                                tracing::debug!("Connection changed: {}", connected);
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_device_id(device_id.unwrap_or_default().into());
                                    if !connected {
                                        ui.set_emission(false);
                                    }
                                    ui.set_status_message(status.into());
                                });
                            }

                            StateChange::EnableChanged { enabled } => {
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_laser_on(enabled);
                                    ui.set_status_message(status.into());
                                });
                            }

                            StateChange::EmissionChanged { emitting } => {
                                tracing::info!("Emission changed: {}", emitting);
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_emission(emitting);
                                    // Whenever the emission status flips, the
                                    // commanded power falls back to 0 mW
                                    ui.set_power_mw(0);
                                    ui.set_status_message(status.into());
                                });
                            }

                            StateChange::PowerChanged { milliwatts } => {
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_power_mw(milliwatts as i32);
                                    ui.set_status_message(status.into());
                                });
                            }

                            StateChange::StatusChanged { system, .. } => {
                                // While a workflow runs, the raw device status is
                                // the most useful line to show
                                let line = if snapshot.is_busy { system } else { status };
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_status_message(line.into());
                                });
                            }

                            StateChange::OperationChanged { .. } => {
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_status_message(status.into());
                                });
                            }

                            StateChange::BusyChanged { busy } => {
                                // Re-sync the button when a workflow ends: a
                                // failed enable leaves it checked otherwise
                                let enabled = snapshot.laser_enabled;
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_busy(busy);
                                    ui.set_laser_on(enabled);
                                    ui.set_status_message(status.into());
                                });
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        tracing::info!(
                            "State broadcast channel closed - shutting down subscription thread"
                        );
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "State subscription lagged - {} events were skipped",
                            skipped
                        );
                    }
                }
            }

            tracing::debug!("State subscription thread terminated gracefully");
        });
    }

    // ===== Laser Workflows =====

    /// Run the complete enable sequence
    ///
    /// 1. Query and log the device identity
    /// 2. Command the laser on
    /// 3. Wait through warm-up, then poll status until the emitting sentinel
    ///    appears or the poll budget is spent
    /// 4. Reflect the outcome in state (the subscription thread drives the LED)
    ///
    /// A timed-out wait is not an error: the panel is left degraded (red LED,
    /// status hint) and the user decides what to do next.
    async fn run_enable_workflow(
        state: Arc<StateManager>,
        service: Arc<LaserService>,
    ) -> Result<()> {
        state.begin_operation("Turning laser on...");

        let workflow = async {
            let identity = service.identity().await.context("Identity query failed")?;
            tracing::info!("Diode laser started");
            tracing::info!("Diode laser ID: {}", identity);

            service.turn_on().await.context("Enable command failed")?;
            state.laser_enabled();

            let wait = state.read(|s| EmissionWait {
                warmup: s.warmup,
                interval: s.poll_interval,
                max_polls: s.max_polls,
            });

            let status_sink = Arc::clone(&state);
            service
                .wait_for_emission(wait, move |status| {
                    status_sink.record_status(status.head.clone(), status.system.clone());
                })
                .await
        };

        match workflow.await {
            Ok(EmissionOutcome::Emitting { polls }) => {
                state.set_emission(true);
                state.finish_operation("Laser emitting");
                tracing::info!("Diode laser emitting! ({} status checks)", polls);
                Ok(())
            }
            Ok(EmissionOutcome::TimedOut { last }) => {
                match &last {
                    Some(status) => tracing::error!(
                        "Diode laser not able to emit radiation. Last status: {} / {}",
                        status.head,
                        status.system
                    ),
                    None => tracing::error!(
                        "Diode laser not able to emit radiation. Check status!"
                    ),
                }
                state.finish_operation("No emission - check laser status");
                Ok(())
            }
            Err(e) => {
                // Roll the commanded state back so the button untoggles
                state.laser_disabled();
                state.finish_operation("Laser command failed");
                Err(e)
            }
        }
    }

    /// Run the disable sequence
    ///
    /// The commanded power is reset to zero before the laser is commanded
    /// off, and the panel state is cleared either way.
    async fn run_disable_workflow(
        state: Arc<StateManager>,
        service: Arc<LaserService>,
    ) -> Result<()> {
        state.begin_operation("Turning laser off...");

        let limit = state.read(|s| s.power_limit_mw);

        let result = async {
            service.set_power(0, limit).await.context("Power reset failed")?;
            service.turn_off().await.context("Disable command failed")
        }
        .await;

        // Commanded-off is recorded even when a command failed: the panel
        // must not claim an enabled laser it can no longer talk to
        state.laser_disabled();

        match result {
            Ok(()) => {
                state.finish_operation("Laser off");
                tracing::info!("Diode laser disabled");
                Ok(())
            }
            Err(e) => {
                state.finish_operation("Laser command failed");
                Err(e)
            }
        }
    }

    /// Forward a power setpoint to the device and record it.
    async fn run_power_workflow(
        state: Arc<StateManager>,
        service: Arc<LaserService>,
        milliwatts: u16,
    ) -> Result<()> {
        let limit = state.read(|s| s.power_limit_mw);

        service.set_power(milliwatts, limit).await?;
        state.set_power(milliwatts);

        tracing::info!("Power of diode laser set to {} mW", milliwatts);
        Ok(())
    }

    /// Generate the status-bar line from the current state.
    fn get_status_message(state: &LaserState) -> String {
        if state.is_busy {
            if state.current_operation.is_empty() {
                "Working...".to_string()
            } else {
                state.current_operation.clone()
            }
        } else if !state.is_connected {
            "No laser connected".to_string()
        } else if state.emission {
            format!("Emitting at {} mW", state.power_mw)
        } else if state.laser_enabled {
            if state.system_status.is_empty() {
                "Laser on, waiting for emission".to_string()
            } else {
                state.system_status.clone()
            }
        } else if !state.current_operation.is_empty() {
            state.current_operation.clone()
        } else {
            match &state.device_id {
                Some(id) => format!("Ready - {}", id),
                None => "Ready".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Creating the controller needs a display, so these tests cover the
    // pieces that don't: state synchronization and the status line.

    #[test]
    fn test_state_synchronization() {
        let state_manager = Arc::new(StateManager::new());

        state_manager.update(|state| {
            state.laser_enabled = true;
            state.power_mw = 12;
        });

        let state = state_manager.snapshot();
        assert!(state.laser_enabled);
        assert_eq!(state.power_mw, 12);
    }

    #[test]
    fn test_status_message_disconnected() {
        let state = LaserState::default();
        assert_eq!(GuiController::get_status_message(&state), "No laser connected");
    }

    #[test]
    fn test_status_message_ready() {
        let mut state = LaserState::default();
        state.is_connected = true;
        state.device_id = Some("MiniLas Evo 640".to_string());
        assert_eq!(
            GuiController::get_status_message(&state),
            "Ready - MiniLas Evo 640"
        );
    }

    #[test]
    fn test_status_message_emitting_shows_power() {
        let mut state = LaserState::default();
        state.is_connected = true;
        state.laser_enabled = true;
        state.emission = true;
        state.power_mw = 30;
        assert_eq!(GuiController::get_status_message(&state), "Emitting at 30 mW");
    }

    #[test]
    fn test_status_message_busy_shows_operation() {
        let mut state = LaserState::default();
        state.is_busy = true;
        state.current_operation = "Turning laser on...".to_string();
        assert_eq!(
            GuiController::get_status_message(&state),
            "Turning laser on..."
        );
    }

    #[test]
    fn test_status_message_enabled_without_emission() {
        let mut state = LaserState::default();
        state.is_connected = true;
        state.laser_enabled = true;
        state.system_status = "Laser system is starting up".to_string();
        assert_eq!(
            GuiController::get_status_message(&state),
            "Laser system is starting up"
        );
    }
}
