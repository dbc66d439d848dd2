//! Bridge configuration.
//!
//! [`ConfigFile`] is the user-facing TOML form. It is resolved once at startup into a
//! [`BridgeConfig`], which is immutable afterwards and shared by the link state machine, the
//! event emitter and the sink.
//!
//! ```toml
//! bus = 1
//! frequency_hz = 120
//! mode = "analog6"
//!
//! [[buttons]]
//! bit = 0
//! button = "left_thumb"
//! ```

use crate::controller::report::{ReportMode, BUTTON_BITS};
use crate::output::PadButton;
use color_eyre::eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BUS: u8 = 1;
pub const DEFAULT_ADDRESS: u16 = 0x52;
pub const DEFAULT_FREQUENCY_HZ: u32 = 60;
pub const MIN_FREQUENCY_HZ: u32 = 1;
pub const MAX_FREQUENCY_HZ: u32 = 1000;
pub const DEFAULT_DEVICE_NAME: &str = "Nintendo I²C Controller";

const CONFIG_DIR_NAME: &str = "classicpad";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration errors raised while resolving a [`ConfigFile`]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Button bit {0} is out of range (0-15)")]
    BitOutOfRange(u8),

    #[error("Button {0:?} is bound to more than one bit")]
    DuplicateButton(PadButton),
}

/// Rebinds one bit of the button word. Leaving `button` out unbinds the bit.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ButtonBinding {
    pub bit: u8,
    #[serde(default)]
    pub button: Option<PadButton>,
}

/// Configuration as read from disk and the command line
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ConfigFile {
    pub bus: u8,
    pub address: u16,
    pub frequency_hz: u32,
    pub mode: ReportMode,
    pub verbose: bool,
    pub device_name: String,
    pub buttons: Vec<ButtonBinding>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            bus: DEFAULT_BUS,
            address: DEFAULT_ADDRESS,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            mode: ReportMode::Digital,
            verbose: false,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            buttons: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// `<config dir>/classicpad/config.toml`, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Picks the file to read: an explicit path as given, otherwise the default path when a
    /// file exists there.
    pub fn locate(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.exists()),
        }
    }

    /// Reads `path`, or returns the built-in defaults without one.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).wrap_err_with(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| eyre!("Failed to parse configuration: {}", e))
    }

    /// Validates the file form and builds the immutable runtime configuration.
    pub fn resolve(self) -> Result<BridgeConfig, ConfigError> {
        let mut buttons = ButtonMap::default();
        for binding in &self.buttons {
            buttons.bind(binding.bit, binding.button)?;
        }
        buttons.check_unique()?;

        let frequency_hz = self.frequency_hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
        if frequency_hz != self.frequency_hz {
            info!(
                "Poll frequency {} Hz clamped to {} Hz",
                self.frequency_hz, frequency_hz
            );
        }

        Ok(BridgeConfig {
            bus: self.bus,
            address: self.address,
            frequency_hz,
            mode: self.mode,
            verbose: self.verbose,
            device_name: self.device_name,
            buttons,
        })
    }
}

/// Maps each bit of the 16-bit button word to a logical button
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonMap([Option<PadButton>; BUTTON_BITS]);

impl Default for ButtonMap {
    /// Layout of the Classic Controller button word. Bit 0 carries no button.
    fn default() -> Self {
        Self([
            None,
            Some(PadButton::RightBumper),
            Some(PadButton::Start),
            Some(PadButton::Mode),
            Some(PadButton::Select),
            Some(PadButton::LeftBumper),
            Some(PadButton::DPadDown),
            Some(PadButton::DPadRight),
            Some(PadButton::DPadUp),
            Some(PadButton::DPadLeft),
            Some(PadButton::LeftTrigger),
            Some(PadButton::North),
            Some(PadButton::East),
            Some(PadButton::West),
            Some(PadButton::South),
            Some(PadButton::RightTrigger),
        ])
    }
}

impl ButtonMap {
    pub fn new(bits: [Option<PadButton>; BUTTON_BITS]) -> Self {
        Self(bits)
    }

    pub fn get(&self, bit: usize) -> Option<PadButton> {
        self.0.get(bit).copied().flatten()
    }

    pub fn bind(&mut self, bit: u8, button: Option<PadButton>) -> Result<(), ConfigError> {
        let slot = self
            .0
            .get_mut(usize::from(bit))
            .ok_or(ConfigError::BitOutOfRange(bit))?;
        *slot = button;
        Ok(())
    }

    /// Every button that at least one bit is bound to.
    pub fn bound_buttons(&self) -> impl Iterator<Item = PadButton> + '_ {
        self.0.iter().flatten().copied()
    }

    fn check_unique(&self) -> Result<(), ConfigError> {
        let mut seen = Vec::with_capacity(BUTTON_BITS);
        for button in self.bound_buttons() {
            if seen.contains(&button) {
                return Err(ConfigError::DuplicateButton(button));
            }
            seen.push(button);
        }
        Ok(())
    }
}

/// Runtime configuration, fixed for the lifetime of the process
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Index of the `/dev/i2c-N` adapter
    pub bus: u8,
    /// 7-bit peripheral address of the controller
    pub address: u16,
    /// Poll rate, already clamped to 1..=1000
    pub frequency_hz: u32,
    pub mode: ReportMode,
    pub verbose: bool,
    pub device_name: String,
    pub buttons: ButtonMap,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::for_mode(ReportMode::Digital)
    }
}

impl BridgeConfig {
    /// Default configuration with the given report mode.
    pub fn for_mode(mode: ReportMode) -> Self {
        Self {
            bus: DEFAULT_BUS,
            address: DEFAULT_ADDRESS,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            mode,
            verbose: false,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            buttons: ButtonMap::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.frequency_hz.max(MIN_FREQUENCY_HZ)))
    }

    /// Number of polls between two liveness checks, about two seconds at any rate.
    pub fn heartbeat_period(&self) -> u64 {
        2 * u64::from(self.frequency_hz.max(MIN_FREQUENCY_HZ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ConfigFile::parse("").unwrap().resolve().unwrap();
        assert_eq!(config.bus, 1);
        assert_eq!(config.address, 0x52);
        assert_eq!(config.frequency_hz, 60);
        assert_eq!(config.mode, ReportMode::Digital);
        assert_eq!(config.buttons, ButtonMap::default());
    }

    #[test]
    fn parses_all_fields() {
        let file = ConfigFile::parse(
            r#"
            bus = 3
            address = 0x53
            frequency_hz = 250
            mode = "analog6"
            verbose = true
            device_name = "Pad"

            [[buttons]]
            bit = 0
            button = "left_thumb"

            [[buttons]]
            bit = 3
            "#,
        )
        .unwrap();
        let config = file.resolve().unwrap();
        assert_eq!(config.bus, 3);
        assert_eq!(config.address, 0x53);
        assert_eq!(config.frequency_hz, 250);
        assert_eq!(config.mode, ReportMode::Analog6);
        assert!(config.verbose);
        assert_eq!(config.device_name, "Pad");
        assert_eq!(config.buttons.get(0), Some(PadButton::LeftThumb));
        assert_eq!(config.buttons.get(3), None);
    }

    #[test]
    fn frequency_is_clamped() {
        let low = ConfigFile {
            frequency_hz: 0,
            ..Default::default()
        };
        assert_eq!(low.resolve().unwrap().frequency_hz, 1);

        let high = ConfigFile {
            frequency_hz: 5000,
            ..Default::default()
        };
        assert_eq!(high.resolve().unwrap().frequency_hz, 1000);
    }

    #[test]
    fn rejects_out_of_range_bit() {
        let file = ConfigFile {
            buttons: vec![ButtonBinding {
                bit: 16,
                button: Some(PadButton::South),
            }],
            ..Default::default()
        };
        assert_eq!(file.resolve().unwrap_err(), ConfigError::BitOutOfRange(16));
    }

    #[test]
    fn rejects_duplicate_binding() {
        let file = ConfigFile {
            buttons: vec![ButtonBinding {
                bit: 0,
                button: Some(PadButton::South),
            }],
            ..Default::default()
        };
        assert_eq!(
            file.resolve().unwrap_err(),
            ConfigError::DuplicateButton(PadButton::South)
        );
    }

    #[test]
    fn explicit_path_must_exist() {
        let path = std::env::temp_dir().join("classicpad-missing-config.toml");
        assert_eq!(ConfigFile::locate(Some(path.as_path())), Some(path.clone()));
        assert!(ConfigFile::load(Some(path.as_path())).is_err());
    }

    #[test]
    fn no_path_loads_defaults() {
        let file = ConfigFile::load(None).unwrap();
        assert_eq!(file.frequency_hz, DEFAULT_FREQUENCY_HZ);
        assert_eq!(file.mode, ReportMode::Digital);
    }

    #[test]
    fn unknown_mode_fails_to_parse() {
        assert!(ConfigFile::parse("mode = \"analog5\"").is_err());
    }

    #[test]
    fn heartbeat_and_interval_follow_frequency() {
        let config = BridgeConfig {
            frequency_hz: 100,
            ..Default::default()
        };
        assert_eq!(config.heartbeat_period(), 200);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn default_map_leaves_bit_zero_free() {
        let map = ButtonMap::default();
        assert_eq!(map.get(0), None);
        assert_eq!(map.get(8), Some(PadButton::DPadUp));
        assert_eq!(map.bound_buttons().count(), 15);
    }
}
