use crate::models::{DeviceConfig, LaserDevice, PanelSettings, EMISSION_SENTINEL};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Configuration manager for loading YAML configuration files.
///
/// Manages two files under the configuration directory:
/// - Device config (`Laser Device.yaml`): status-code tables, probe signatures
/// - Settings (`Laser Settings.yaml`): ports, baud rate, emission-wait timings
///
/// Loading is one-way: the panel never writes configuration back to disk.
/// Missing files fall back to built-in defaults.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    device_config_path: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at the given directory.
    ///
    /// The directory is created if it does not exist so a first run on a
    /// clean checkout still comes up (with defaults).
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            device_config_path: config_dir.join("Laser Device.yaml"),
            settings_path: config_dir.join("Laser Settings.yaml"),
            config_dir,
        })
    }

    /// Load the device configuration file.
    ///
    /// # Returns
    /// The loaded DeviceConfig, or the built-in default if the file doesn't exist
    pub fn load_device_config(&self) -> Result<DeviceConfig> {
        if !self.device_config_path.exists() {
            tracing::warn!(
                "Device config not found at {}, using built-in tables",
                self.device_config_path
            );
            return Ok(Self::default_device_config());
        }

        let file_contents = fs::read_to_string(&self.device_config_path).with_context(|| {
            format!("Failed to read device config: {}", self.device_config_path)
        })?;

        let config: DeviceConfig = serde_yaml_ng::from_str(&file_contents).with_context(|| {
            format!("Failed to parse device config: {}", self.device_config_path)
        })?;

        tracing::info!("Loaded device config from {}", self.device_config_path);
        Ok(config)
    }

    /// Load the settings file.
    ///
    /// # Returns
    /// The loaded PanelSettings, or defaults if the file doesn't exist
    pub fn load_settings(&self) -> Result<PanelSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            return Ok(PanelSettings::default());
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: PanelSettings = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// The built-in device tables, used when `Laser Device.yaml` is absent.
    ///
    /// Code-to-text mappings follow the MiniLas Evo manual; code 2 of the
    /// system table is the emission sentinel the wait loop compares against.
    pub fn default_device_config() -> DeviceConfig {
        use indexmap::IndexMap;

        let mut head_status = IndexMap::new();
        head_status.insert(
            "0".to_string(),
            "Temperature of laser head is ok".to_string(),
        );
        head_status.insert(
            "1".to_string(),
            "Laser head is approaching working temperature".to_string(),
        );
        head_status.insert(
            "2".to_string(),
            "Temperature of laser head is critical".to_string(),
        );
        head_status.insert(
            "3".to_string(),
            "Temperature of laser head is out of range".to_string(),
        );

        let mut system_status = IndexMap::new();
        system_status.insert("0".to_string(), "Laser system is off".to_string());
        system_status.insert("1".to_string(), "Laser system is starting up".to_string());
        system_status.insert("2".to_string(), EMISSION_SENTINEL.to_string());
        system_status.insert(
            "3".to_string(),
            "Interlock is open, radiation is blocked".to_string(),
        );
        system_status.insert("4".to_string(), "Laser system reports a fault".to_string());

        DeviceConfig {
            laser_device: LaserDevice {
                version: "1.2.0".to_string(),
                probe_replies: vec!["MiniLas Evo".to_string(), "MiniLasEvo".to_string()],
                head_status,
                system_status,
            },
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
