//! Host implementations of the platform traits
//!
//! Used by the `rescuer-alarm` binary. Volume, wake lock and notification
//! state live in process memory; the notification shade is exposed read-only
//! over HTTP so a UI shell can mirror it.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{
    AudioManager, FeedHub, Notifier, Permission, PermissionChecker, Platform, PowerManager,
    WakeLock,
};
use crate::config::{AlarmConfig, AudioOutput};
use crate::error::{Error, Result};
use crate::notification::{Notification, NotificationChannel, NotificationId};

// ========================================
// Audio
// ========================================

/// Stream volume kept in memory, bounded by `max`
pub struct HostAudioManager {
    volume: AtomicU32,
    max: u32,
    available: AtomicBool,
}

impl HostAudioManager {
    pub fn new(initial: u32, max: u32) -> Self {
        Self {
            volume: AtomicU32::new(initial.min(max)),
            max,
            available: AtomicBool::new(true),
        }
    }

    /// Mark the audio subsystem as gone (device unplugged)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }
}

impl AudioManager for HostAudioManager {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn stream_volume(&self) -> Result<u32> {
        if !self.is_available() {
            return Err(Error::Platform("Audio subsystem unavailable".to_string()));
        }
        Ok(self.volume.load(Ordering::Acquire))
    }

    fn max_stream_volume(&self) -> Result<u32> {
        if !self.is_available() {
            return Err(Error::Platform("Audio subsystem unavailable".to_string()));
        }
        Ok(self.max)
    }

    fn set_stream_volume(&self, volume: u32) -> Result<()> {
        if !self.is_available() {
            return Err(Error::Platform("Audio subsystem unavailable".to_string()));
        }
        if volume > self.max {
            return Err(Error::InvalidArgument(format!(
                "Volume {} exceeds maximum {}",
                volume, self.max
            )));
        }
        let previous = self.volume.swap(volume, Ordering::AcqRel);
        debug!("Stream volume {} -> {}", previous, volume);
        Ok(())
    }
}

// ========================================
// Power
// ========================================

/// Wake locks with a self-expiring deadline
#[derive(Default)]
pub struct HostPowerManager {
    held: Arc<AtomicU32>,
}

impl HostPowerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks acquired and not yet released (expired ones included)
    pub fn held_count(&self) -> u32 {
        self.held.load(Ordering::Acquire)
    }
}

impl PowerManager for HostPowerManager {
    fn acquire_wake_lock(&self, tag: &str, timeout: Duration) -> Result<Box<dyn WakeLock>> {
        self.held.fetch_add(1, Ordering::AcqRel);
        info!("Wake lock {} acquired for {:?}", tag, timeout);
        Ok(Box::new(HostWakeLock {
            tag: tag.to_string(),
            deadline: Instant::now() + timeout,
            held: Arc::clone(&self.held),
        }))
    }
}

struct HostWakeLock {
    tag: String,
    deadline: Instant,
    held: Arc<AtomicU32>,
}

impl WakeLock for HostWakeLock {
    fn is_held(&self) -> bool {
        Instant::now() < self.deadline
    }

    fn release(self: Box<Self>) {
        if !self.is_held() {
            debug!("Wake lock {} already expired", self.tag);
        }
        self.held.fetch_sub(1, Ordering::AcqRel);
        info!("Wake lock {} released", self.tag);
    }
}

// ========================================
// Notifications
// ========================================

/// Auto-cancel notifications kept in the shade; the oldest goes first
pub const MAX_TRANSIENT_NOTIFICATIONS: usize = 32;

#[derive(Default)]
struct NotifierState {
    channels: BTreeMap<String, NotificationChannel>,
    active: BTreeMap<NotificationId, Notification>,
    /// Auto-cancel ids in posting order
    transient: VecDeque<NotificationId>,
}

impl NotifierState {
    fn remove(&mut self, id: NotificationId) -> Option<Notification> {
        self.transient.retain(|&t| t != id);
        self.active.remove(&id)
    }
}

/// In-memory notification shade
#[derive(Default)]
pub struct HostNotifier {
    state: Mutex<NotifierState>,
}

impl HostNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posted notifications ordered by id
    pub fn active(&self) -> Vec<Notification> {
        self.lock().active.values().cloned().collect()
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        self.lock().channels.values().cloned().collect()
    }

    /// Dismiss a notification as a tap or swipe would
    ///
    /// Returns whether anything was shown under `id`.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` for an ongoing notification
    pub fn dismiss(&self, id: NotificationId) -> Result<bool> {
        let mut state = self.lock();
        let ongoing = match state.active.get(&id) {
            Some(notification) => notification.ongoing,
            None => return Ok(false),
        };
        if ongoing {
            return Err(Error::InvalidArgument(format!(
                "Notification {} is ongoing and cannot be dismissed",
                id
            )));
        }

        state.remove(id);
        debug!("Notification {} dismissed", id);
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for HostNotifier {
    fn create_channel(&self, channel: &NotificationChannel) -> Result<()> {
        let mut state = self.lock();
        if !state.channels.contains_key(&channel.id) {
            info!("Notification channel {} registered", channel.id);
            state.channels.insert(channel.id.clone(), channel.clone());
        }
        Ok(())
    }

    fn notify(&self, notification: &Notification) -> Result<()> {
        let mut state = self.lock();
        if !state.channels.contains_key(&notification.channel_id) {
            return Err(Error::Platform(format!(
                "Notification channel {} not registered",
                notification.channel_id
            )));
        }
        info!(
            "Notification {}: {} - {}",
            notification.id, notification.title, notification.text
        );
        state.remove(notification.id);
        state.active.insert(notification.id, notification.clone());

        if notification.auto_cancel {
            state.transient.push_back(notification.id);
            while state.transient.len() > MAX_TRANSIENT_NOTIFICATIONS {
                if let Some(oldest) = state.transient.pop_front() {
                    state.active.remove(&oldest);
                    debug!("Notification {} dropped from a full shade", oldest);
                }
            }
        }
        Ok(())
    }

    fn cancel(&self, id: NotificationId) {
        if self.lock().remove(id).is_some() {
            debug!("Notification {} cancelled", id);
        }
    }
}

// ========================================
// Permissions
// ========================================

/// Grants taken from configuration
pub struct HostPermissions {
    granted: HashSet<Permission>,
    opt_in_required: bool,
}

impl HostPermissions {
    pub fn new(granted: impl IntoIterator<Item = Permission>, opt_in_required: bool) -> Self {
        Self {
            granted: granted.into_iter().collect(),
            opt_in_required,
        }
    }
}

impl PermissionChecker for HostPermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }

    fn notification_opt_in_required(&self) -> bool {
        self.opt_in_required
    }
}

// ========================================
// Bundle
// ========================================

/// Host platform wired from configuration
pub struct HostPlatform {
    audio: Arc<HostAudioManager>,
    notifier: Arc<HostNotifier>,
    power: Arc<HostPowerManager>,
    feed: FeedHub,
    permissions: Arc<HostPermissions>,
    player: Arc<dyn super::AlertPlayer>,
}

impl HostPlatform {
    pub fn new(config: &AlarmConfig) -> Self {
        if !config.alert_sound.exists() {
            warn!(
                "Alert sound {} not found; alarms will report a playback error",
                config.alert_sound.display()
            );
        }

        Self {
            audio: Arc::new(HostAudioManager::new(
                config.initial_volume,
                config.max_volume,
            )),
            notifier: Arc::new(HostNotifier::new()),
            power: Arc::new(HostPowerManager::new()),
            feed: FeedHub::new(),
            permissions: Arc::new(HostPermissions::new(
                config.granted_permissions.iter().copied(),
                config.notification_opt_in_required,
            )),
            player: alert_player(config),
        }
    }

    /// Trait-object bundle handed to the session controller
    pub fn platform(&self) -> Platform {
        Platform {
            audio: self.audio.clone(),
            player: Arc::clone(&self.player),
            notifier: self.notifier.clone(),
            power: self.power.clone(),
            feed: Arc::new(self.feed.clone()),
            permissions: self.permissions.clone(),
        }
    }

    pub fn audio(&self) -> &Arc<HostAudioManager> {
        &self.audio
    }

    pub fn notifier(&self) -> &Arc<HostNotifier> {
        &self.notifier
    }

    pub fn power(&self) -> &Arc<HostPowerManager> {
        &self.power
    }

    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }
}

fn alert_player(config: &AlarmConfig) -> Arc<dyn super::AlertPlayer> {
    match config.audio_output {
        AudioOutput::Device => device_player(config),
        AudioOutput::Headless => {
            info!("Alert playback headless (configured)");
            headless_player(config)
        }
    }
}

#[cfg(feature = "device-audio")]
fn device_player(config: &AlarmConfig) -> Arc<dyn super::AlertPlayer> {
    match crate::audio::output::default_device_name() {
        Some(name) => {
            info!("Alert playback through output device {}", name);
            Arc::new(crate::audio::DeviceAlertPlayer::new(
                config.alert_sound.clone(),
            ))
        }
        None => {
            warn!("No audio output device found, alert playback falls back to headless");
            headless_player(config)
        }
    }
}

#[cfg(not(feature = "device-audio"))]
fn device_player(config: &AlarmConfig) -> Arc<dyn super::AlertPlayer> {
    warn!("Built without device-audio, alert playback falls back to headless");
    headless_player(config)
}

fn headless_player(config: &AlarmConfig) -> Arc<dyn super::AlertPlayer> {
    Arc::new(crate::audio::HeadlessAlertPlayer::new(
        config.alert_sound.clone(),
    ))
}
