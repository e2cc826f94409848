//! Test helpers for rescuer-alarm integration tests
//!
//! Provides a recording fake platform: every trait implementation counts
//! what the coordinator asked of it, so tests can assert on resources
//! acquired and released.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rescuer_alarm::coordinator::CoordinatorSettings;
use rescuer_alarm::error::{Error, Result};
use rescuer_alarm::notification::{Notification, NotificationChannel, NotificationId};
use rescuer_alarm::platform::{
    emergency_collection, AlertPlayer, AudioManager, ChangeEvent, ChangeFeed, ChangeKind,
    FeedFilter, FeedHub, FeedListener, FeedSubscription, Notifier, Permission, PermissionChecker,
    Platform, Playback, PlaybackErrorCallback, PowerManager, WakeLock,
};
use rescuer_alarm::SessionController;
use rescuer_common::{EventStream, RescuerEvent};
use tokio::sync::mpsc;

// ============================================================================
// Audio
// ============================================================================

pub struct FakeAudio {
    volume: AtomicU32,
    max: u32,
    pub available: AtomicBool,
    /// Every value passed to set_stream_volume
    pub history: Mutex<Vec<u32>>,
}

impl FakeAudio {
    pub fn new(initial: u32, max: u32) -> Self {
        Self {
            volume: AtomicU32::new(initial),
            max,
            available: AtomicBool::new(true),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn volume(&self) -> u32 {
        self.volume.load(Ordering::SeqCst)
    }

    /// Simulate the user moving the volume slider
    pub fn set_by_user(&self, volume: u32) {
        self.volume.store(volume, Ordering::SeqCst);
    }
}

impl AudioManager for FakeAudio {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn stream_volume(&self) -> Result<u32> {
        if !self.is_available() {
            return Err(Error::Platform("no audio".to_string()));
        }
        Ok(self.volume())
    }

    fn max_stream_volume(&self) -> Result<u32> {
        Ok(self.max)
    }

    fn set_stream_volume(&self, volume: u32) -> Result<()> {
        self.history.lock().unwrap().push(volume);
        self.volume.store(volume, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Player
// ============================================================================

#[derive(Default)]
pub struct FakePlayer {
    /// Playbacks created
    pub started: AtomicUsize,
    /// Playbacks created and not yet stopped
    pub active: Arc<AtomicUsize>,
    pub fail_start: AtomicBool,
    callbacks: Mutex<Vec<PlaybackErrorCallback>>,
}

impl FakePlayer {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Fire the error callback of the most recent playback
    pub fn trigger_error(&self, message: &str) {
        if let Some(callback) = self.callbacks.lock().unwrap().last() {
            callback(message.to_string());
        }
    }

    /// Fire the error callback of the `index`-th playback ever started
    pub fn trigger_error_on(&self, index: usize, message: &str) {
        if let Some(callback) = self.callbacks.lock().unwrap().get(index) {
            callback(message.to_string());
        }
    }
}

impl AlertPlayer for FakePlayer {
    fn start_looping(&self, on_error: PlaybackErrorCallback) -> Result<Box<dyn Playback>> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Playback("alert sound missing".to_string()));
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().unwrap().push(on_error);
        Ok(Box::new(FakePlayback {
            active: Arc::clone(&self.active),
        }))
    }
}

struct FakePlayback {
    active: Arc<AtomicUsize>,
}

impl Playback for FakePlayback {
    fn stop(self: Box<Self>) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[derive(Default)]
pub struct FakeNotifier {
    pub channels: Mutex<Vec<NotificationChannel>>,
    /// Every notification posted, in order
    pub posted: Mutex<Vec<Notification>>,
    shown: Mutex<BTreeMap<NotificationId, Notification>>,
}

impl FakeNotifier {
    pub fn shown(&self, id: NotificationId) -> Option<Notification> {
        self.shown.lock().unwrap().get(&id).cloned()
    }

    pub fn shown_count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }

    pub fn posted_with_title(&self, title: &str) -> Vec<Notification> {
        self.posted
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.title == title)
            .cloned()
            .collect()
    }
}

impl Notifier for FakeNotifier {
    fn create_channel(&self, channel: &NotificationChannel) -> Result<()> {
        self.channels.lock().unwrap().push(channel.clone());
        Ok(())
    }

    fn notify(&self, notification: &Notification) -> Result<()> {
        self.posted.lock().unwrap().push(notification.clone());
        self.shown
            .lock()
            .unwrap()
            .insert(notification.id, notification.clone());
        Ok(())
    }

    fn cancel(&self, id: NotificationId) {
        self.shown.lock().unwrap().remove(&id);
    }
}

// ============================================================================
// Power
// ============================================================================

#[derive(Default)]
pub struct FakePower {
    pub acquired: AtomicUsize,
    pub held: Arc<AtomicUsize>,
    pub timeouts: Mutex<Vec<Duration>>,
}

impl FakePower {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

impl PowerManager for FakePower {
    fn acquire_wake_lock(&self, _tag: &str, timeout: Duration) -> Result<Box<dyn WakeLock>> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.held.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().unwrap().push(timeout);
        Ok(Box::new(FakeWakeLock {
            held: Arc::clone(&self.held),
        }))
    }
}

struct FakeWakeLock {
    held: Arc<AtomicUsize>,
}

impl WakeLock for FakeWakeLock {
    fn is_held(&self) -> bool {
        true
    }

    fn release(self: Box<Self>) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Change feed
// ============================================================================

/// FeedHub plus subscribe accounting and failure injection
#[derive(Default)]
pub struct FakeFeed {
    pub hub: FeedHub,
    pub subscribes: AtomicUsize,
    pub fail_subscribe: AtomicBool,
}

impl FakeFeed {
    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.hub.subscriber_count()
    }

    pub fn emit(&self, municipality: &str, changes: &[ChangeEvent]) -> usize {
        self.hub.publish(&emergency_collection(municipality), changes)
    }

    pub fn fail(&self, municipality: &str, message: &str) -> usize {
        self.hub.fail(&emergency_collection(municipality), message)
    }
}

impl ChangeFeed for FakeFeed {
    fn subscribe(
        &self,
        filter: FeedFilter,
        listener: FeedListener,
    ) -> Result<Box<dyn FeedSubscription>> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::Subscription("permission denied by store".to_string()));
        }
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.hub.subscribe(filter, listener)
    }
}

// ============================================================================
// Permissions
// ============================================================================

pub struct FakePermissions {
    granted: Mutex<HashSet<Permission>>,
    opt_in_required: bool,
}

impl FakePermissions {
    pub fn all(opt_in_required: bool) -> Self {
        Self {
            granted: Mutex::new(
                [Permission::ForegroundService, Permission::PostNotifications]
                    .into_iter()
                    .collect(),
            ),
            opt_in_required,
        }
    }

    pub fn revoke(&self, permission: Permission) {
        self.granted.lock().unwrap().remove(&permission);
    }
}

impl PermissionChecker for FakePermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted.lock().unwrap().contains(&permission)
    }

    fn notification_opt_in_required(&self) -> bool {
        self.opt_in_required
    }
}

// ============================================================================
// Bundle
// ============================================================================

pub struct FakePlatform {
    pub audio: Arc<FakeAudio>,
    pub player: Arc<FakePlayer>,
    pub notifier: Arc<FakeNotifier>,
    pub power: Arc<FakePower>,
    pub feed: Arc<FakeFeed>,
    pub permissions: Arc<FakePermissions>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            audio: Arc::new(FakeAudio::new(7, 15)),
            player: Arc::new(FakePlayer::default()),
            notifier: Arc::new(FakeNotifier::default()),
            power: Arc::new(FakePower::default()),
            feed: Arc::new(FakeFeed::default()),
            permissions: Arc::new(FakePermissions::all(true)),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            audio: self.audio.clone(),
            player: self.player.clone(),
            notifier: self.notifier.clone(),
            power: self.power.clone(),
            feed: self.feed.clone(),
            permissions: self.permissions.clone(),
        }
    }

    /// Controller plus a listener attached to its event stream
    pub fn controller(&self) -> (SessionController, mpsc::Receiver<RescuerEvent>) {
        self.controller_with(CoordinatorSettings::default())
    }

    pub fn controller_with(
        &self,
        settings: CoordinatorSettings,
    ) -> (SessionController, mpsc::Receiver<RescuerEvent>) {
        let events = Arc::new(EventStream::new(256));
        let rx = events.listen();
        (SessionController::new(self.platform(), events, settings), rx)
    }
}

// ============================================================================
// Misc
// ============================================================================

pub fn pending(id: &str) -> ChangeEvent {
    ChangeEvent::new(id, ChangeKind::Added, "pending")
}

/// Everything currently buffered on the event stream
pub fn drain(rx: &mut mpsc::Receiver<RescuerEvent>) -> Vec<RescuerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn error_messages(events: &[RescuerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RescuerEvent::Error { error, .. } => Some(error.clone()),
            _ => None,
        })
        .collect()
}

/// Write a short mono WAV tone and return its path
pub fn write_alert_wav(dir: &Path) -> PathBuf {
    let path = dir.join("alert.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..800 {
        let t = i as f32 / 8000.0;
        let value = (t * 660.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
        writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}
