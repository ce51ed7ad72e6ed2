// ProtonTPR Settings Module
// TOML configuration for discovery, reconnect and run loop behaviour

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MirrorError, MirrorResult};
use crate::event::{WaitStrategy, DEFAULT_POLL_INTERVAL};
use crate::hotplug::{MonitorOptions, ReconnectPolicy};
use crate::input::UsbFilter;
use crate::locate::{DeviceLocator, DEFAULT_SEARCH_DIR, DEFAULT_SEARCH_PATTERN};
use crate::output::DEFAULT_VIRTUAL_NAME;

const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 500;

/// Settings for protontpr
///
/// Loaded from a TOML file (default: ~/.config/protontpr/config.toml):
///
/// ```toml
/// [device]
/// pattern = "usb-Thrustmaster_T-Pendular-Rudder-event-"
///
/// [reconnect]
/// interval_ms = 250
///
/// [virtual]
/// name = "virtual-T-Pendular-Rudder"
/// ```
///
/// Command line options override individual fields afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Explicit device node
    pub device_path: Option<PathBuf>,
    /// Directory scanned for the device
    pub search_dir: PathBuf,
    /// Substring the scanned entry must contain
    pub pattern: String,
    /// USB vendor id (hex) for hotplug mode
    pub vendor_id: Option<String>,
    /// USB product id (hex) for hotplug mode
    pub product_id: Option<String>,
    /// Reconnect after a lost device; `None` picks the mode's default
    pub reconnect: Option<bool>,
    pub reconnect_interval: Duration,
    /// Name of the virtual device
    pub virtual_name: String,
    pub wait: WaitMode,
    pub poll_interval: Duration,
    /// Path to the settings file, if loaded from one
    source_path: Option<PathBuf>,
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

impl From<SettingsError> for MirrorError {
    fn from(err: SettingsError) -> Self {
        MirrorError::Config(err.to_string())
    }
}

/// How the run loop waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    #[default]
    Multiplex,
    Poll,
}

/// How the device is found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Path given on the command line or in the config
    Explicit(PathBuf),
    /// Single entry of a directory whose name contains a pattern
    Pattern { dir: PathBuf, pattern: String },
    /// Wait for a USB device with these ids to appear
    Hotplug(UsbFilter),
}

impl DiscoveryMode {
    /// Locator for the static modes
    pub fn locator(&self) -> Option<DeviceLocator> {
        match self {
            DiscoveryMode::Explicit(path) => Some(DeviceLocator::Explicit(path.clone())),
            DiscoveryMode::Pattern { dir, pattern } => Some(DeviceLocator::Pattern {
                dir: dir.clone(),
                pattern: pattern.clone(),
            }),
            DiscoveryMode::Hotplug(_) => None,
        }
    }

    pub fn is_hotplug(&self) -> bool {
        matches!(self, DiscoveryMode::Hotplug(_))
    }
}

/// TOML representation for deserializing settings
#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    #[serde(default)]
    device: Option<DeviceSection>,

    #[serde(default)]
    hotplug: Option<HotplugSection>,

    #[serde(default)]
    reconnect: Option<ReconnectSection>,

    #[serde(default, rename = "virtual")]
    virtual_device: Option<VirtualSection>,

    #[serde(default)]
    run: Option<RunSection>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DeviceSection {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    search_dir: Option<PathBuf>,
    #[serde(default)]
    pattern: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HotplugSection {
    #[serde(default)]
    vendor_id: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ReconnectSection {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    interval_ms: Option<u64>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VirtualSection {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RunSection {
    #[serde(default)]
    wait: Option<WaitMode>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Settings with every field at its default
    pub fn new() -> Self {
        Self {
            device_path: None,
            search_dir: PathBuf::from(DEFAULT_SEARCH_DIR),
            pattern: DEFAULT_SEARCH_PATTERN.to_string(),
            vendor_id: None,
            product_id: None,
            reconnect: None,
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            virtual_name: DEFAULT_VIRTUAL_NAME.to_string(),
            wait: WaitMode::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            source_path: None,
        }
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.source_path = Some(path.as_ref().to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let toml_settings: SettingsToml =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;

        let mut settings = Self::new();

        if let Some(device) = toml_settings.device {
            settings.device_path = device.path;
            if let Some(dir) = device.search_dir {
                settings.search_dir = dir;
            }
            if let Some(pattern) = device.pattern {
                settings.pattern = pattern;
            }
        }

        if let Some(hotplug) = toml_settings.hotplug {
            settings.vendor_id = hotplug.vendor_id;
            settings.product_id = hotplug.product_id;
        }

        if let Some(reconnect) = toml_settings.reconnect {
            settings.reconnect = reconnect.enabled;
            if let Some(ms) = reconnect.interval_ms {
                settings.reconnect_interval = Duration::from_millis(ms);
            }
        }

        if let Some(name) = toml_settings.virtual_device.and_then(|v| v.name) {
            settings.virtual_name = name;
        }

        if let Some(run) = toml_settings.run {
            if let Some(wait) = run.wait {
                settings.wait = wait;
            }
            if let Some(ms) = run.poll_interval_ms {
                settings.poll_interval = Duration::from_millis(ms);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Get the default settings path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("protontpr").join("config.toml"))
    }

    /// Load from default location (~/.config/protontpr/config.toml)
    pub fn load_default() -> Result<Self, SettingsError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        // Return default settings if file doesn't exist
        Ok(Self::new())
    }

    /// File the settings were read from
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Check values that parse but cannot work
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.virtual_name.is_empty() {
            return Err(SettingsError::InvalidValue(
                "virtual device name must not be empty".to_string(),
            ));
        }
        if self.pattern.is_empty() {
            return Err(SettingsError::InvalidValue(
                "search pattern must not be empty".to_string(),
            ));
        }
        if self.reconnect_interval.is_zero() {
            return Err(SettingsError::InvalidValue(
                "reconnect interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Pick the discovery mode.
    ///
    /// Vendor and product ids select hotplug mode and must come together;
    /// otherwise an explicit path wins over the directory scan.
    pub fn discovery_mode(&self) -> MirrorResult<DiscoveryMode> {
        match (&self.vendor_id, &self.product_id) {
            (Some(vendor), Some(product)) => {
                Ok(DiscoveryMode::Hotplug(UsbFilter::parse(vendor, product)?))
            }
            (Some(_), None) => Err(MirrorError::Config(
                "a vendor id needs a product id".to_string(),
            )),
            (None, Some(_)) => Err(MirrorError::Config(
                "a product id needs a vendor id".to_string(),
            )),
            (None, None) => Ok(match &self.device_path {
                Some(path) => DiscoveryMode::Explicit(path.clone()),
                None => DiscoveryMode::Pattern {
                    dir: self.search_dir.clone(),
                    pattern: self.pattern.clone(),
                },
            }),
        }
    }

    /// Monitor options for a discovery mode.
    ///
    /// Reconnecting defaults to on for the static modes and off for hotplug,
    /// where a fresh add notification re-attaches the device.
    pub fn monitor_options(&self, mode: &DiscoveryMode) -> MonitorOptions {
        let filter = match mode {
            DiscoveryMode::Hotplug(filter) => Some(*filter),
            _ => None,
        };
        let reconnect = if self.reconnect.unwrap_or(!mode.is_hotplug()) {
            ReconnectPolicy::Retry {
                interval: self.reconnect_interval,
            }
        } else {
            ReconnectPolicy::Drop
        };

        MonitorOptions {
            virtual_name: self.virtual_name.clone(),
            filter,
            reconnect,
        }
    }

    pub fn wait_strategy(&self) -> WaitStrategy {
        match self.wait {
            WaitMode::Multiplex => WaitStrategy::Multiplex,
            WaitMode::Poll => WaitStrategy::Poll {
                interval: self.poll_interval,
            },
        }
    }
}
