//! Data models for the laser panel.
//!
//! This module contains the core data structures used throughout the
//! application:
//! - [`LaserState`]: the central state container (commanded + reported laser state)
//! - [`DeviceConfig`]: status-code tables and probe signatures from `Laser Device.yaml`
//! - [`PanelSettings`]: ports and emission-wait timings from `Laser Settings.yaml`
//! - [`MAX_POWER_MW`]: the 78 mW hardware ceiling on the power setpoint
//! - [`MAX_CONCURRENT_LASER_COMMANDS`]: critical concurrency limit (always 1,
//!   one serial transaction at a time against the single device handle)
//!
//! # Architecture Note
//!
//! Config structs derive `Serialize`/`Deserialize` for YAML loading; nothing
//! is ever written back (the panel persists no configuration). `LaserState`
//! is wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager)
//! and mutated only through its `update()` method so change events fire.

pub mod config;
pub mod laser_state;

pub use config::{DeviceConfig, LaserDevice, LaserSettings, PanelSettings, EMISSION_SENTINEL};
pub use laser_state::{LaserState, MAX_CONCURRENT_LASER_COMMANDS, MAX_POWER_MW};
