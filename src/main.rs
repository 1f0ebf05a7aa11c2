//! laserpanel - desktop control panel for a MiniLas Evo diode laser
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! This binary crate provides the Slint frontend for the laser panel. It
//! initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime (4 worker threads for blocking serial transactions)
//! - State management ([`StateManager`])
//! - Configuration loading ([`ConfigManager`], read-only)
//! - Port discovery and the serial driver ([`MiniLasEvo`])
//! - GUI controller ([`GuiController`] - bridges the Slint panel with the
//!   control layer)
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Runs the Slint event loop (blocking, synchronous)
//! - **Tokio workers**: Host the blocking device calls (serial transactions,
//!   warm-up and poll sleeps of the emission wait)
//! - **State listener**: Background std::thread for reactive UI updates
//!
//! # Execution Flow
//!
//! 1. Load `Laser Data/` configuration (falls back to built-in defaults)
//! 2. Initialize logging -> logs/laserpanel.<date>
//! 3. Create tokio runtime with 4 worker threads
//! 4. Resolve the laser port (explicit setting or serial scan) and open it
//! 5. Open and hold the auxiliary head if one is configured (never wired
//!    into the panel)
//! 6. Create GuiController (wires the Slint panel to state and runtime)
//! 7. Run Slint event loop (blocks until window closed)
//! 8. Disable the laser if it is still on, close the port, log metrics

use anyhow::{Context, Result, anyhow};
use laserpanel::metrics::Metrics;
use laserpanel::services::{discover_laser_port, DiodeLaser, LaserService, MiniLasEvo};
use laserpanel::ui::GuiController;
use laserpanel::{APP_NAME, ConfigManager, StateManager, VERSION};
use std::sync::Arc;

/// Main entry point for the laser panel
///
/// # Errors
///
/// This function can fail if:
/// - Logging initialization fails (disk space, permissions)
/// - Tokio runtime creation fails (system resources)
/// - Configuration files are present but invalid YAML
/// - No laser answers the identity probe on any serial port
/// - Slint UI initialization fails (graphics drivers, display)
fn main() -> Result<()> {
    // Configuration is loaded before logging so the Debug Mode flag can pick
    // the log level
    let config_manager = ConfigManager::new("Laser Data")?;
    let settings = config_manager.load_settings()?;
    let laser_settings = settings.laser_settings.clone();

    let _guard = laserpanel::logging::setup_logging(
        "logs",
        "laserpanel",
        laser_settings.debug_mode,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    // Create tokio runtime for the device-facing workflows
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("laserpanel-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    // Create state manager and seed it with the loaded settings
    let state_manager = Arc::new(StateManager::new());
    state_manager.load_from_settings(&settings);

    let device_config = config_manager.load_device_config()?;

    // Resolve the serial port: explicit setting wins, otherwise scan
    let port_name = if laser_settings.port.is_empty() {
        discover_laser_port(&device_config, laser_settings.baud_rate)
            .ok_or_else(|| anyhow!("No diode laser found on any serial port"))?
    } else {
        laser_settings.port.clone()
    };

    tracing::info!("MiniLas Evo diode laser port: {}", port_name);

    let mut laser = MiniLasEvo::open(&port_name, laser_settings.baud_rate, device_config.clone())
        .with_context(|| format!("Failed to open laser on {}", port_name))?;

    let device_id = match laser.identity() {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("Laser on {} did not identify itself: {}", port_name, e);
            "Unidentified laser".to_string()
        }
    };
    state_manager.set_connected(port_name.clone(), device_id);

    // Second head (830 nm): opened and held, never wired into the panel
    let mut aux_laser = if laser_settings.aux_port.is_empty() {
        None
    } else {
        match MiniLasEvo::open(
            &laser_settings.aux_port,
            laser_settings.baud_rate,
            device_config.clone(),
        ) {
            Ok(mut aux) => {
                match aux.identity() {
                    Ok(identity) => tracing::info!(
                        "Auxiliary head on {}: {}",
                        laser_settings.aux_port,
                        identity
                    ),
                    Err(e) => tracing::warn!(
                        "Auxiliary head on {} did not identify itself: {}",
                        laser_settings.aux_port,
                        e
                    ),
                }
                Some(aux)
            }
            Err(e) => {
                tracing::warn!(
                    "Could not open auxiliary head on {}: {}",
                    laser_settings.aux_port,
                    e
                );
                None
            }
        }
    };

    // Service owning the device handle; all transactions funnel through it
    let metrics = Arc::new(Metrics::new());
    let service = Arc::new(LaserService::new(Box::new(laser), Arc::clone(&metrics)));

    // Create GUI controller
    // This wires up the Slint panel with state management and the tokio runtime
    let gui_controller = GuiController::new(
        Arc::clone(&state_manager),
        Arc::clone(&service),
        runtime.handle().clone(),
    )?;

    tracing::info!("GUI controller initialized, launching window");

    // Run the GUI (blocks until window is closed)
    let result = gui_controller.run();

    // Clean up after window closes
    tracing::info!("GUI closed, shutting down");

    let laser_on = state_manager.read(|s| s.laser_enabled);
    if laser_on {
        tracing::warn!("Window closed with laser enabled - disabling before exit");
    }

    if let Err(e) = runtime.block_on(service.shutdown(laser_on)) {
        tracing::error!("Laser shutdown failed: {:#}", e);
    }
    state_manager.set_disconnected();

    if let Some(aux) = aux_laser.as_mut() {
        if let Err(e) = aux.close() {
            tracing::warn!("Auxiliary head close failed: {}", e);
        }
    }

    metrics.log_summary();

    // Shutdown the tokio runtime gracefully
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow!("GUI error: {}", e)
    })
}
