use crate::models::{DeviceConfig, EMISSION_SENTINEL, MAX_POWER_MW};
use regex::Regex;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a single transaction may wait for the reply terminator.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Status pair reported by the device.
///
/// The head line describes the diode temperature, the system line the lasing
/// state. Both are the decoded human-readable texts, not raw codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub head: String,
    pub system: String,
}

impl DeviceStatus {
    /// True when the system line equals the emitting sentinel.
    pub fn is_emitting(&self) -> bool {
        self.system == EMISSION_SENTINEL
    }
}

/// Errors that can occur talking to the laser
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Failed to open serial port {port}: {source}")]
    OpenFailed {
        port: String,
        source: serialport::Error,
    },

    #[error("Serial read timeout after {0:?}")]
    Timeout(Duration),

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command {command:?} rejected by device: {reply:?}")]
    CommandRejected { command: String, reply: String },

    #[error("Malformed status reply: {0:?}")]
    MalformedReply(String),

    #[error("Power setpoint {0} mW exceeds the {max} mW ceiling", max = MAX_POWER_MW)]
    PowerOutOfRange(u16),
}

/// The fixed command set of the diode laser.
///
/// The panel only ever needs these six operations; everything else the
/// hardware can do stays outside this codebase. `MiniLasEvo` implements the
/// trait over a serial port, tests implement it in memory.
pub trait DiodeLaser: Send {
    /// Query the device identity string.
    fn identity(&mut self) -> Result<String, DriverError>;

    /// Command the laser on or off.
    fn set_enabled(&mut self, on: bool) -> Result<(), DriverError>;

    /// Assign the power setpoint in milliwatts.
    fn set_power(&mut self, milliwatts: u16) -> Result<(), DriverError>;

    /// Query the status pair (head temperature text, laser system text).
    fn status(&mut self) -> Result<DeviceStatus, DriverError>;

    /// Close the serial port.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Serial driver for the MiniLas Evo diode laser.
///
/// Transactions are ASCII lines terminated by `\r` at 57600 baud 8N1, one
/// command in flight at a time:
///
/// - `ID?`   -> identity string
/// - `O=0/1` -> `OK` (laser off/on)
/// - `P=<n>` -> `OK` (power setpoint, mW)
/// - `S?`    -> `S: <head>,<system>` numeric status codes
///
/// Status codes are decoded into text through the tables in [`DeviceConfig`].
pub struct MiniLasEvo {
    port: Box<dyn SerialPort>,
    port_name: String,
    device_config: DeviceConfig,

    /// Regex for splitting `S: <head>,<system>` status replies
    status_pattern: Regex,
}

impl MiniLasEvo {
    /// Open the laser on the given serial port.
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        device_config: DeviceConfig,
    ) -> Result<Self, DriverError> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(REPLY_TIMEOUT)
            .open()
            .map_err(|source| DriverError::OpenFailed {
                port: port_name.to_string(),
                source,
            })?;

        tracing::debug!("Opened serial port {} at {} baud", port_name, baud_rate);

        Ok(Self {
            port,
            port_name: port_name.to_string(),
            device_config,
            status_pattern: Self::status_pattern(),
        })
    }

    pub(crate) fn status_pattern() -> Regex {
        Regex::new(r"^S:\s*(\d+)\s*,\s*(\d+)$").expect("Invalid status regex")
    }

    /// Send one command and read the `\r`-terminated reply.
    fn transact(&mut self, command: &str) -> Result<String, DriverError> {
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(b"\r")?;
        self.port.flush()?;

        tracing::trace!("[{}] Sent command: {}", self.port_name, command);

        let start = Instant::now();
        let mut response: Vec<u8> = Vec::new();
        let mut buffer = [0u8; 64];

        loop {
            if start.elapsed() > REPLY_TIMEOUT {
                return Err(DriverError::Timeout(REPLY_TIMEOUT));
            }

            match self.port.read(&mut buffer) {
                Ok(0) => continue,
                Ok(n) => {
                    response.extend_from_slice(&buffer[..n]);
                    if buffer[..n].contains(&b'\r') {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(DriverError::Timeout(REPLY_TIMEOUT));
                }
                Err(e) => return Err(DriverError::Io(e)),
            }
        }

        let reply = String::from_utf8_lossy(&response).trim().to_string();
        tracing::trace!("[{}] Received reply: {}", self.port_name, reply);
        Ok(reply)
    }

    /// Send a set-command and require the `OK` acknowledgement.
    fn command_ok(&mut self, command: &str) -> Result<(), DriverError> {
        let reply = self.transact(command)?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(DriverError::CommandRejected {
                command: command.to_string(),
                reply,
            })
        }
    }

    pub(crate) fn split_status_reply(
        pattern: &Regex,
        reply: &str,
    ) -> Option<(String, String)> {
        let caps = pattern.captures(reply.trim())?;
        Some((caps[1].to_string(), caps[2].to_string()))
    }
}

impl DiodeLaser for MiniLasEvo {
    fn identity(&mut self) -> Result<String, DriverError> {
        let reply = self.transact("ID?")?;
        // Some firmware revisions echo the query prefix
        let identity = reply.strip_prefix("ID:").unwrap_or(&reply).trim().to_string();
        Ok(identity)
    }

    fn set_enabled(&mut self, on: bool) -> Result<(), DriverError> {
        self.command_ok(if on { "O=1" } else { "O=0" })
    }

    fn set_power(&mut self, milliwatts: u16) -> Result<(), DriverError> {
        if milliwatts > MAX_POWER_MW {
            return Err(DriverError::PowerOutOfRange(milliwatts));
        }
        self.command_ok(&format!("P={milliwatts}"))
    }

    fn status(&mut self) -> Result<DeviceStatus, DriverError> {
        let reply = self.transact("S?")?;

        let (head_code, system_code) = Self::split_status_reply(&self.status_pattern, &reply)
            .ok_or_else(|| DriverError::MalformedReply(reply.clone()))?;

        Ok(DeviceStatus {
            head: self.device_config.head_text(&head_code),
            system: self.device_config.system_text(&system_code),
        })
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.port.flush()?;
        tracing::info!("Serial port of diode laser closed: {}", self.port_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;

    #[test]
    fn test_split_status_reply() {
        let pattern = MiniLasEvo::status_pattern();

        assert_eq!(
            MiniLasEvo::split_status_reply(&pattern, "S: 0,2"),
            Some(("0".to_string(), "2".to_string()))
        );
        assert_eq!(
            MiniLasEvo::split_status_reply(&pattern, "S:1 , 3"),
            Some(("1".to_string(), "3".to_string()))
        );
        assert_eq!(MiniLasEvo::split_status_reply(&pattern, "garbage"), None);
        assert_eq!(MiniLasEvo::split_status_reply(&pattern, "S: ,2"), None);
    }

    #[test]
    fn test_device_status_emitting() {
        let config = ConfigManager::default_device_config();

        let emitting = DeviceStatus {
            head: config.head_text("0"),
            system: config.system_text("2"),
        };
        assert!(emitting.is_emitting());

        let starting = DeviceStatus {
            head: config.head_text("0"),
            system: config.system_text("1"),
        };
        assert!(!starting.is_emitting());
    }

    #[test]
    fn test_power_out_of_range_message() {
        let err = DriverError::PowerOutOfRange(100);
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("78"));
    }

    #[test]
    fn test_open_nonexistent_port_fails() {
        let config = ConfigManager::default_device_config();
        let result = MiniLasEvo::open("/dev/laserpanel-test-no-such-port", 57600, config);
        assert!(matches!(result, Err(DriverError::OpenFailed { .. })));
    }
}
