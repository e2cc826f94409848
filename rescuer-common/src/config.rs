//! Configuration loading and config file resolution

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "RESCUER_CONFIG";

/// On-disk TOML configuration
///
/// Every field is optional; missing values fall back to [`CompiledDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP control port
    pub port: Option<u16>,
    /// Log filter used when RUST_LOG is not set (e.g. "info", "rescuer_alarm=debug")
    pub log_level: Option<String>,
    /// Alert sound file (wav, mp3, ogg, flac)
    pub alert_sound: Option<PathBuf>,
    /// Alert playback backend: "device" or "headless"
    pub audio_output: Option<String>,
    /// Wake lock bound in seconds
    pub wake_lock_timeout_secs: Option<u64>,
    /// Re-acquire the wake lock before it expires
    pub renew_wake_lock: Option<bool>,
    /// Events buffered for a slow event-stream subscriber
    pub event_buffer: Option<usize>,
    /// Permissions the host platform reports as granted
    pub granted_permissions: Option<Vec<String>>,
    /// Whether posting notifications needs an explicit grant on this host
    pub notification_opt_in_required: Option<bool>,
    /// Maximum index of the alarm output stream volume
    pub max_volume: Option<u32>,
    /// Stream volume at process start
    pub initial_volume: Option<u32>,
}

/// Compiled-in defaults, used when neither CLI, environment nor config file
/// provide a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub port: u16,
    pub log_level: String,
    pub alert_sound: PathBuf,
    pub audio_output: String,
    pub wake_lock_timeout_secs: u64,
    pub renew_wake_lock: bool,
    pub event_buffer: usize,
    pub granted_permissions: Vec<String>,
    pub notification_opt_in_required: bool,
    pub max_volume: u32,
    pub initial_volume: u32,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            port: 5750,
            log_level: "info".to_string(),
            alert_sound: default_data_dir().join("alert_sound.wav"),
            audio_output: "device".to_string(),
            wake_lock_timeout_secs: 10 * 60,
            renew_wake_lock: false,
            event_buffer: 64,
            granted_permissions: vec![
                "foreground_service".to_string(),
                "post_notifications".to_string(),
            ],
            notification_opt_in_required: true,
            max_volume: 15,
            initial_volume: 7,
        }
    }
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self::for_current_platform()
    }
}

/// Config file resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Per-user / system config file
/// 4. None (compiled defaults only)
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
    env_var_name: String,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self {
            cli_path,
            env_var_name: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Use a different environment variable (tests)
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Path of an explicitly requested config file (CLI or environment)
    fn explicit_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }
        std::env::var(&self.env_var_name).ok().map(PathBuf::from)
    }

    /// Resolve the config file to load, if any
    pub fn resolve_path(&self) -> Option<PathBuf> {
        self.explicit_path().or_else(default_config_file)
    }

    /// Load the TOML configuration
    ///
    /// A missing file never aborts startup: a warning is logged and an empty
    /// config is returned. A file that exists but does not parse is an error.
    pub fn load(&self) -> Result<TomlConfig> {
        if let Some(path) = self.explicit_path() {
            if !path.exists() {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                return Ok(TomlConfig::default());
            }
            return load_toml_config(&path);
        }

        match default_config_file() {
            Some(path) => load_toml_config(&path),
            None => {
                warn!("No config file found, using compiled defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    debug!("Reading config file {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Default config file locations for the platform, first existing wins
fn default_config_file() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("rescuer").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/rescuer/config.toml"));
    }
    candidates.into_iter().find(|p| p.exists())
}

/// OS-dependent data directory for bundled assets (alert sound)
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("rescuer"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/rescuer"))
    } else {
        dirs::data_dir()
            .map(|d| d.join("rescuer"))
            .unwrap_or_else(|| PathBuf::from("./rescuer_data"))
    }
}
