//! Serial-port discovery for the diode laser.
//!
//! Finds which port the laser sits on by probing every enumerated port with
//! the identity query and matching the reply against the probe signatures in
//! the device config. An explicitly configured port in `Laser Settings.yaml`
//! bypasses the scan.

use crate::models::DeviceConfig;
use crate::services::driver::{DiodeLaser, MiniLasEvo};
use serialport::SerialPortType;

/// Scan available serial ports for a laser head.
///
/// Returns the first port whose identity reply matches a probe signature.
/// Ports that cannot be opened or answer with an unrelated identity are
/// skipped with a debug log, so an unplugged device degrades to `None`
/// rather than an error.
pub fn discover_laser_port(device_config: &DeviceConfig, baud_rate: u32) -> Option<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            return None;
        }
    };

    tracing::info!("Scanning {} serial ports for the diode laser", ports.len());

    for info in ports {
        if let SerialPortType::UsbPort(usb) = &info.port_type {
            tracing::debug!(
                "Probing {} (USB {:04x}:{:04x})",
                info.port_name,
                usb.vid,
                usb.pid
            );
        } else {
            tracing::debug!("Probing {}", info.port_name);
        }

        if probe_port(&info.port_name, baud_rate, device_config) {
            return Some(info.port_name);
        }
    }

    None
}

/// Probe a single port with the identity query.
///
/// Opens the port, asks `ID?` and checks the reply against the probe
/// signatures. Any failure along the way means "not our device".
pub fn probe_port(port_name: &str, baud_rate: u32, device_config: &DeviceConfig) -> bool {
    let mut laser = match MiniLasEvo::open(port_name, baud_rate, device_config.clone()) {
        Ok(laser) => laser,
        Err(e) => {
            tracing::debug!("Could not open {}: {}", port_name, e);
            return false;
        }
    };

    match laser.identity() {
        Ok(identity) if device_config.matches_probe(&identity) => {
            tracing::info!("Found {} on {}", identity, port_name);
            true
        }
        Ok(identity) => {
            tracing::debug!("{} answered with unrelated identity: {}", port_name, identity);
            false
        }
        Err(e) => {
            tracing::debug!("{} did not answer identity probe: {}", port_name, e);
            false
        }
    }
}
