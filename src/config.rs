//! Static device configuration, loaded once at startup from YAML.
//!
//! Playback options that the user can change at runtime live in the JSON
//! file named by `config-file` and are modelled by
//! [`config_model::ConfigSnapshot`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config_model::ModeId;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Base directory; relative paths below are resolved against it.
    pub data_dir: PathBuf,
    /// Root holding one `YYYY-MM-DD` folder per import.
    pub images_dir: PathBuf,
    /// Folder receiving the downloaded network image.
    pub netimage_dir: PathBuf,
    /// Curated folder shown in the fixed-collection mode.
    pub collection_dir: PathBuf,
    /// Runtime JSON configuration file.
    pub config_file: PathBuf,
    /// Directory where removable media gets mounted. Import is skipped when unset.
    pub usb_mount_point: Option<PathBuf>,
    /// wpa_supplicant file that `wifi.txt` from removable media is appended to.
    pub wifi_config_path: PathBuf,
    pub wifi_reconfigure_command: String,
    /// Poll interval of the controller loop.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// How long the button must be held to power off.
    #[serde(with = "humantime_serde")]
    pub hold_to_shutdown: Duration,
    /// Minimum spacing between accepted button transitions.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
    /// Interval between configuration and asset reloads.
    #[serde(with = "humantime_serde")]
    pub reload_interval: Duration,
    /// How long the mode banner stays up after a mode change.
    #[serde(with = "humantime_serde")]
    pub banner_dwell: Duration,
    /// How long the startup info screen stays up before playback.
    #[serde(with = "humantime_serde")]
    pub startup_info_dwell: Duration,
    /// Upper bound for the network image download.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Highest zero-based mode index reachable with the button.
    pub max_mode: u8,
    pub shutdown_command: String,
    /// Interface whose address is shown on status screens.
    pub network_interface: String,
    pub button: ButtonConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ButtonConfig {
    /// GPIO character device.
    pub chip: PathBuf,
    /// Line offset on `chip` (BCM numbering).
    pub line: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DisplayConfig {
    /// File the panel driver picks frames up from.
    pub spool_path: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            images_dir: PathBuf::from("images"),
            netimage_dir: PathBuf::from("netimage"),
            collection_dir: PathBuf::from("us"),
            config_file: PathBuf::from("config.txt"),
            usb_mount_point: None,
            wifi_config_path: PathBuf::from("/etc/wpa_supplicant/wpa_supplicant.conf"),
            wifi_reconfigure_command: "sudo wpa_cli reconfigure".to_string(),
            tick_interval: Duration::from_millis(100),
            hold_to_shutdown: Duration::from_secs(3),
            debounce: Duration::from_millis(20),
            reload_interval: Duration::from_secs(3600),
            banner_dwell: Duration::from_secs(2),
            startup_info_dwell: Duration::ZERO,
            fetch_timeout: Duration::from_secs(30),
            max_mode: ModeId::MAX_INDEX,
            shutdown_command: "sudo shutdown -h now".to_string(),
            network_interface: "wlan0".to_string(),
            button: ButtonConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            chip: PathBuf::from("/dev/gpiochip0"),
            line: 12,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            spool_path: PathBuf::from("/run/eink-frame/frame.bmp"),
        }
    }
}

impl Configuration {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no settings file; using defaults");
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&s).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.tick_interval.is_zero(),
            "tick-interval must be greater than zero"
        );
        ensure!(
            !self.hold_to_shutdown.is_zero(),
            "hold-to-shutdown must be greater than zero"
        );
        ensure!(
            !self.reload_interval.is_zero(),
            "reload-interval must be greater than zero"
        );
        ensure!(
            !self.fetch_timeout.is_zero(),
            "fetch-timeout must be greater than zero"
        );
        ensure!(
            self.max_mode <= ModeId::MAX_INDEX,
            "max-mode must be at most {}",
            ModeId::MAX_INDEX
        );
        ensure!(
            !self.shutdown_command.trim().is_empty(),
            "shutdown-command must not be blank"
        );
        ensure!(
            !self.network_interface.trim().is_empty(),
            "network-interface must not be blank"
        );
        Ok(self)
    }

    /// Resolve `path` against `data-dir` unless it is already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn images_root(&self) -> PathBuf {
        self.resolve(&self.images_dir)
    }

    pub fn netimage_root(&self) -> PathBuf {
        self.resolve(&self.netimage_dir)
    }

    pub fn collection_root(&self) -> PathBuf {
        self.resolve(&self.collection_dir)
    }

    pub fn config_path(&self) -> PathBuf {
        self.resolve(&self.config_file)
    }
}
