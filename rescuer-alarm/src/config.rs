//! rescuer-alarm runtime configuration
//!
//! Resolution order for each field:
//! 1. Command-line argument / environment variable (port, alert sound)
//! 2. TOML config file
//! 3. Compiled defaults

use crate::coordinator::CoordinatorSettings;
use crate::error::{Error, Result};
use crate::platform::Permission;
use rescuer_common::config::{CompiledDefaults, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Where the alert sound is played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOutput {
    /// Default output device, falling back to headless when there is none
    Device,
    /// Paced loop without an output device (servers, CI)
    Headless,
}

impl std::str::FromStr for AudioOutput {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "device" => Ok(AudioOutput::Device),
            "headless" => Ok(AudioOutput::Headless),
            other => Err(format!("Unknown audio output: {}", other)),
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct AlarmConfig {
    pub port: u16,
    pub log_level: String,
    pub alert_sound: PathBuf,
    pub audio_output: AudioOutput,
    pub wake_lock_timeout: Duration,
    pub renew_wake_lock: bool,
    pub event_buffer: usize,
    pub granted_permissions: Vec<Permission>,
    pub notification_opt_in_required: bool,
    pub max_volume: u32,
    pub initial_volume: u32,
}

impl AlarmConfig {
    /// Merge overrides, file values and defaults
    ///
    /// # Errors
    /// - `Error::Config` for unknown permission or audio output names, or
    ///   out-of-range values
    pub fn resolve(
        port_override: Option<u16>,
        alert_sound_override: Option<PathBuf>,
        file: TomlConfig,
        defaults: CompiledDefaults,
    ) -> Result<Self> {
        let granted_permissions = file
            .granted_permissions
            .unwrap_or(defaults.granted_permissions)
            .iter()
            .map(|name| name.parse::<Permission>().map_err(Error::Config))
            .collect::<Result<Vec<_>>>()?;

        let audio_output = file
            .audio_output
            .unwrap_or(defaults.audio_output)
            .parse::<AudioOutput>()
            .map_err(Error::Config)?;

        let wake_lock_secs = file
            .wake_lock_timeout_secs
            .unwrap_or(defaults.wake_lock_timeout_secs);
        if wake_lock_secs == 0 {
            return Err(Error::Config(
                "wake_lock_timeout_secs must be positive".to_string(),
            ));
        }

        let event_buffer = file.event_buffer.unwrap_or(defaults.event_buffer);
        if event_buffer == 0 {
            return Err(Error::Config("event_buffer must be positive".to_string()));
        }

        let max_volume = file.max_volume.unwrap_or(defaults.max_volume);
        let initial_volume = file
            .initial_volume
            .unwrap_or(defaults.initial_volume)
            .min(max_volume);

        Ok(Self {
            port: port_override.or(file.port).unwrap_or(defaults.port),
            log_level: file.log_level.unwrap_or(defaults.log_level),
            alert_sound: alert_sound_override
                .or(file.alert_sound)
                .unwrap_or(defaults.alert_sound),
            audio_output,
            wake_lock_timeout: Duration::from_secs(wake_lock_secs),
            renew_wake_lock: file.renew_wake_lock.unwrap_or(defaults.renew_wake_lock),
            event_buffer,
            granted_permissions,
            notification_opt_in_required: file
                .notification_opt_in_required
                .unwrap_or(defaults.notification_opt_in_required),
            max_volume,
            initial_volume,
        })
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            wake_lock_timeout: self.wake_lock_timeout,
            renew_wake_lock: self.renew_wake_lock,
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            port: defaults.port,
            log_level: defaults.log_level,
            alert_sound: defaults.alert_sound,
            audio_output: AudioOutput::Device,
            wake_lock_timeout: Duration::from_secs(defaults.wake_lock_timeout_secs),
            renew_wake_lock: defaults.renew_wake_lock,
            event_buffer: defaults.event_buffer,
            granted_permissions: vec![Permission::ForegroundService, Permission::PostNotifications],
            notification_opt_in_required: defaults.notification_opt_in_required,
            max_volume: defaults.max_volume,
            initial_volume: defaults.initial_volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_only() {
        let config =
            AlarmConfig::resolve(None, None, TomlConfig::default(), CompiledDefaults::default())
                .unwrap();
        assert_eq!(config.port, 5750);
        assert_eq!(config.audio_output, AudioOutput::Device);
        assert_eq!(config.wake_lock_timeout, Duration::from_secs(600));
        assert!(!config.renew_wake_lock);
        assert_eq!(
            config.granted_permissions,
            vec![Permission::ForegroundService, Permission::PostNotifications]
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = TomlConfig {
            port: Some(6000),
            alert_sound: Some(PathBuf::from("/etc/rescuer/file.wav")),
            ..Default::default()
        };
        let config = AlarmConfig::resolve(
            Some(7000),
            Some(PathBuf::from("/tmp/cli.wav")),
            file,
            CompiledDefaults::default(),
        )
        .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.alert_sound, PathBuf::from("/tmp/cli.wav"));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = TomlConfig {
            port: Some(6000),
            wake_lock_timeout_secs: Some(30),
            renew_wake_lock: Some(true),
            granted_permissions: Some(vec!["foreground_service".to_string()]),
            ..Default::default()
        };
        let config =
            AlarmConfig::resolve(None, None, file, CompiledDefaults::default()).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.granted_permissions, vec![Permission::ForegroundService]);

        let settings = config.coordinator_settings();
        assert_eq!(settings.wake_lock_timeout, Duration::from_secs(30));
        assert!(settings.renew_wake_lock);
    }

    #[test]
    fn test_unknown_permission_rejected() {
        let file = TomlConfig {
            granted_permissions: Some(vec!["camera".to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            AlarmConfig::resolve(None, None, file, CompiledDefaults::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_audio_output_from_file() {
        let file = TomlConfig {
            audio_output: Some("headless".to_string()),
            ..Default::default()
        };
        let config =
            AlarmConfig::resolve(None, None, file, CompiledDefaults::default()).unwrap();
        assert_eq!(config.audio_output, AudioOutput::Headless);

        let file = TomlConfig {
            audio_output: Some("speaker".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            AlarmConfig::resolve(None, None, file, CompiledDefaults::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_initial_volume_clamped() {
        let file = TomlConfig {
            max_volume: Some(10),
            initial_volume: Some(25),
            ..Default::default()
        };
        let config =
            AlarmConfig::resolve(None, None, file, CompiledDefaults::default()).unwrap();
        assert_eq!(config.initial_volume, 10);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let file = TomlConfig {
            wake_lock_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(AlarmConfig::resolve(None, None, file, CompiledDefaults::default()).is_err());
    }
}
