//! Session controller
//!
//! Owns start/stop of monitoring, permission gating, and the single
//! background coordinator. Every public operation is idempotent:
//! - starting an already running session succeeds without a second worker
//! - stopping when nothing runs succeeds
//! - stopping the alarm when nothing is alarming succeeds

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rescuer_common::{AlarmState, EventStream};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::coordinator::{AlarmCoordinator, CoordinatorHandle, CoordinatorSettings};
use crate::error::{Error, Result};
use crate::notification::NotificationIds;
use crate::platform::{Permission, Platform};

/// Parameters of one monitoring session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringSession {
    pub municipality: String,
    pub operator_name: String,
    pub running: bool,
}

impl MonitoringSession {
    pub fn new(municipality: impl Into<String>, operator_name: impl Into<String>) -> Self {
        Self {
            municipality: municipality.into(),
            operator_name: operator_name.into(),
            running: true,
        }
    }
}

/// Snapshot reported to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub running: bool,
    pub municipality: Option<String>,
    pub operator_name: Option<String>,
    pub alarm_state: AlarmState,
}

struct ActiveSession {
    session: MonitoringSession,
    coordinator: CoordinatorHandle,
}

pub struct SessionController {
    platform: Platform,
    events: Arc<EventStream>,
    settings: CoordinatorSettings,
    notification_ids: Arc<NotificationIds>,
    initialized: AtomicBool,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionController {
    pub fn new(platform: Platform, events: Arc<EventStream>, settings: CoordinatorSettings) -> Self {
        Self {
            platform,
            events,
            settings,
            notification_ids: Arc::new(NotificationIds::new()),
            initialized: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Event stream delivered to the UI layer
    pub fn events(&self) -> &Arc<EventStream> {
        &self.events
    }

    /// Probe session-scoped resources (audio subsystem)
    ///
    /// # Errors
    /// - `Error::Platform` if the audio subsystem is unavailable
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        if !self.platform.audio.is_available() {
            return Err(Error::Platform("Audio subsystem unavailable".to_string()));
        }
        let volume = self
            .platform
            .audio
            .stream_volume()
            .map_err(|e| Error::Platform(format!("Audio subsystem unavailable: {}", e)))?;

        self.initialized.store(true, Ordering::Release);
        info!("Session controller initialized (stream volume {})", volume);
        Ok(())
    }

    /// Permissions that must be granted before monitoring may start
    pub fn required_permissions(&self) -> Vec<Permission> {
        let mut required = vec![Permission::ForegroundService];
        if self.platform.permissions.notification_opt_in_required() {
            required.push(Permission::PostNotifications);
        }
        required
    }

    /// Start monitoring `municipality` on behalf of `operator_name`
    ///
    /// # Errors
    /// - `Error::InvalidArgument` if either string is empty or the
    ///   municipality contains a path separator
    /// - `Error::PermissionDenied` if a required permission is missing
    /// - `Error::Service` if the background worker cannot be started
    pub async fn start_monitoring(&self, municipality: &str, operator_name: &str) -> Result<()> {
        let municipality = municipality.trim();
        let operator_name = operator_name.trim();
        if municipality.is_empty() {
            return Err(Error::InvalidArgument(
                "Municipality cannot be empty".to_string(),
            ));
        }
        // Becomes a segment of the watched collection path
        if municipality.contains('/') {
            return Err(Error::InvalidArgument(
                "Municipality cannot contain '/'".to_string(),
            ));
        }
        if operator_name.is_empty() {
            return Err(Error::InvalidArgument(
                "Rescuer name cannot be empty".to_string(),
            ));
        }

        let missing: Vec<Permission> = self
            .required_permissions()
            .into_iter()
            .filter(|p| !self.platform.permissions.is_granted(*p))
            .collect();
        if !missing.is_empty() {
            warn!("Missing permissions: {:?}", missing);
            return Err(Error::PermissionDenied(
                "Need permissions to start service".to_string(),
            ));
        }

        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if current.coordinator.is_running() {
                if current.session.municipality != municipality {
                    warn!(
                        "Monitoring already running for {}, ignoring start for {}",
                        current.session.municipality, municipality
                    );
                } else {
                    debug!("Monitoring already running for {}", municipality);
                }
                return Ok(());
            }
        }

        let session = MonitoringSession::new(municipality, operator_name);
        let coordinator = AlarmCoordinator::spawn(
            self.platform.clone(),
            Arc::clone(&self.events),
            self.settings.clone(),
            session.clone(),
            Arc::clone(&self.notification_ids),
        )?;
        // Resources are acquired and the feed is open once this returns
        coordinator.flush().await;

        info!(
            "Monitoring started for {} (operator {})",
            session.municipality, session.operator_name
        );
        *active = Some(ActiveSession {
            session,
            coordinator,
        });
        Ok(())
    }

    /// Tear the background worker down. Succeeds when nothing is running.
    pub async fn stop_monitoring(&self) -> Result<()> {
        let Some(active) = self.active.lock().await.take() else {
            debug!("Stop requested with no active session");
            return Ok(());
        };

        active.coordinator.shutdown().await?;
        info!("Monitoring stopped for {}", active.session.municipality);
        Ok(())
    }

    /// Silence a playing alarm. No-op when not alarming.
    pub async fn stop_alarm(&self) -> Result<()> {
        let active = self.active.lock().await;
        if let Some(active) = active.as_ref() {
            if active.coordinator.stop_alarm() {
                active.coordinator.flush().await;
            } else {
                warn!("Stop alarm dropped: coordinator not running");
            }
        }
        Ok(())
    }

    /// Status after every previously issued command has been applied
    pub async fn status(&self) -> SessionStatus {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(active) => {
                active.coordinator.flush().await;
                SessionStatus {
                    running: active.coordinator.is_running(),
                    municipality: Some(active.session.municipality.clone()),
                    operator_name: Some(active.session.operator_name.clone()),
                    alarm_state: active.coordinator.state(),
                }
            }
            None => SessionStatus {
                running: false,
                municipality: None,
                operator_name: None,
                alarm_state: AlarmState::Idle,
            },
        }
    }
}
