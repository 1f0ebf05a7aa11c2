use std::time::Duration;

/// Maximum commanded power in milliwatts.
///
/// The MiniLas Evo head saturates at 78 mW; the manual lists this as the
/// highest value the `P=` command accepts. The SpinBox in the panel is
/// range-limited to the same ceiling, and [`crate::services::LaserService`]
/// rejects anything above it before the command reaches the wire.
pub const MAX_POWER_MW: u16 = 78;

/// Maximum number of in-flight device commands.
///
/// **IMPORTANT:** This is hardcoded to 1 because the laser owns a single
/// serial port and interleaved transactions corrupt the reply stream. The
/// constraint is enforced in [`crate::services::LaserService`], which funnels
/// every transaction through one mutex-guarded handle.
pub const MAX_CONCURRENT_LASER_COMMANDS: usize = 1;

/// Single source of truth for the panel state.
///
/// # Thread Safety
///
/// `LaserState` is wrapped in `Arc<RwLock<LaserState>>` by
/// [`crate::state::StateManager`]. Never touch it directly - go through
/// [`read()`](crate::state::StateManager::read) and
/// [`update()`](crate::state::StateManager::update) so change events fire.
#[derive(Clone, Debug)]
pub struct LaserState {
    // Connection
    pub port_name: Option<String>,
    pub is_connected: bool,
    pub device_id: Option<String>,

    // Commanded state
    pub laser_enabled: bool,
    pub power_mw: u16,

    // Reported state
    pub emission: bool,
    pub head_status: String,
    pub system_status: String,

    // Runtime
    pub is_busy: bool,
    pub current_operation: String,

    // Settings (loaded once, never written back)
    pub warmup: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub power_limit_mw: u16,
}

impl Default for LaserState {
    fn default() -> Self {
        Self {
            port_name: None,
            is_connected: false,
            device_id: None,

            laser_enabled: false,
            power_mw: 0,

            emission: false,
            head_status: String::new(),
            system_status: String::new(),

            is_busy: false,
            current_operation: String::new(),

            // Manual: lasing starts ~5 s after turn-on; poll for another ~10 s
            warmup: Duration::from_secs(4),
            poll_interval: Duration::from_millis(500),
            max_polls: 20,
            power_limit_mw: MAX_POWER_MW,
        }
    }
}

impl LaserState {
    /// True once a device handle has been opened and identified.
    pub fn is_ready(&self) -> bool {
        self.is_connected && self.device_id.is_some()
    }

    /// Reset everything the emission cycle touches. Called when the laser
    /// is commanded off.
    pub fn reset_emission_state(&mut self) {
        self.laser_enabled = false;
        self.emission = false;
        self.power_mw = 0;
        self.head_status.clear();
        self.system_status.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = LaserState::default();
        assert!(!state.laser_enabled);
        assert!(!state.emission);
        assert_eq!(state.power_mw, 0);
        assert_eq!(state.max_polls, 20);
        assert_eq!(state.power_limit_mw, 78);
    }

    #[test]
    fn test_reset_emission_state_zeroes_power() {
        let mut state = LaserState::default();
        state.laser_enabled = true;
        state.emission = true;
        state.power_mw = 42;
        state.system_status = "Laser system is active".to_string();

        state.reset_emission_state();

        assert!(!state.laser_enabled);
        assert!(!state.emission);
        assert_eq!(state.power_mw, 0);
        assert!(state.system_status.is_empty());
    }

    #[test]
    fn test_is_ready() {
        let mut state = LaserState::default();
        assert!(!state.is_ready());

        state.is_connected = true;
        assert!(!state.is_ready());

        state.device_id = Some("MiniLas Evo 640".to_string());
        assert!(state.is_ready());
    }
}
