//! Services module - device-facing logic for the laser panel.
//!
//! Everything here is **framework-agnostic**: no Slint, no state manager,
//! only the laser and the serial port. The UI layer orchestrates these pieces
//! and decides what the user sees.
//!
//! # Components
//!
//! - [`DiodeLaser`] / [`MiniLasEvo`]: the fixed device command set and its
//!   serial implementation (identity, on/off, power, status pair, close)
//! - [`LaserService`]: serialized async access to the single device handle,
//!   plus the bounded emission wait (fixed warm-up, then a capped number of
//!   status polls)
//! - [`discovery`]: serial-port scan that finds the laser by probing with the
//!   identity query
//!
//! # Device Integration
//!
//! The laser speaks a line-oriented ASCII protocol over 57600 baud serial.
//! The panel only relies on the six-operation command set; the status reply
//! codes are decoded through tables in
//! [`DeviceConfig`](crate::models::DeviceConfig) so firmware variations stay
//! a configuration matter.

pub mod discovery;
pub mod driver;
pub mod laser;

pub use discovery::{discover_laser_port, probe_port};
pub use driver::{DeviceStatus, DiodeLaser, DriverError, MiniLasEvo};
pub use laser::{EmissionOutcome, EmissionWait, LaserService};
