use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Status text the control layer treats as "radiation is on".
///
/// This is the exact sentence the MiniLas Evo manual lists for system status
/// code 2; the emission wait compares the decoded system status against it
/// verbatim.
pub const EMISSION_SENTINEL: &str = "Laser system is active, radiation can be emitted";

/// Device configuration from `Laser Device.yaml`
///
/// Contains the status-code text tables and the identity strings used to
/// recognize the laser while probing serial ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "Laser_Device")]
    pub laser_device: LaserDevice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaserDevice {
    pub version: String,

    /// Substrings of the `ID?` reply that identify a supported head.
    #[serde(rename = "Probe_Replies")]
    pub probe_replies: Vec<String>,

    /// Head (temperature) status code -> human-readable text.
    #[serde(rename = "Head_Status")]
    pub head_status: IndexMap<String, String>,

    /// Laser system status code -> human-readable text.
    #[serde(rename = "System_Status")]
    pub system_status: IndexMap<String, String>,
}

/// User settings from `Laser Settings.yaml`
///
/// Read at startup, never written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelSettings {
    #[serde(rename = "Laser_Settings")]
    pub laser_settings: LaserSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaserSettings {
    /// Serial port of the controlled head; empty means scan for it.
    #[serde(rename = "Port", default)]
    pub port: String,

    /// Serial port of the second (830 nm) head. Opened and held if set,
    /// but never wired into the panel.
    #[serde(rename = "Aux Port", default)]
    pub aux_port: String,

    #[serde(rename = "Baud Rate", default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(rename = "Warmup Seconds", default = "default_warmup_secs")]
    pub warmup_secs: u64,

    #[serde(rename = "Poll Interval Ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(rename = "Max Polls", default = "default_max_polls")]
    pub max_polls: u32,

    #[serde(rename = "Power Limit mW", default = "default_power_limit_mw")]
    pub power_limit_mw: u16,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for LaserSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            aux_port: String::new(),
            baud_rate: 57600,
            warmup_secs: 4,
            poll_interval_ms: 500,
            max_polls: 20,
            power_limit_mw: 78,
            debug_mode: false,
        }
    }
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            laser_settings: LaserSettings::default(),
        }
    }
}

fn default_baud_rate() -> u32 {
    57600
}

fn default_warmup_secs() -> u64 {
    4
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_polls() -> u32 {
    20
}

fn default_power_limit_mw() -> u16 {
    78
}

impl DeviceConfig {
    /// Decode a head status code into text.
    pub fn head_text(&self, code: &str) -> String {
        self.laser_device
            .head_status
            .get(code)
            .cloned()
            .unwrap_or_else(|| format!("Unknown head status code {code}"))
    }

    /// Decode a system status code into text.
    pub fn system_text(&self, code: &str) -> String {
        self.laser_device
            .system_status
            .get(code)
            .cloned()
            .unwrap_or_else(|| format!("Unknown system status code {code}"))
    }

    /// Check whether an identity reply belongs to a supported head.
    pub fn matches_probe(&self, identity: &str) -> bool {
        self.laser_device
            .probe_replies
            .iter()
            .any(|p| identity.contains(p.as_str()))
    }
}
