//! Alarm coordinator actor
//!
//! **Responsibilities:**
//! - Own the alarm state and every platform resource tied to it (wake lock,
//!   feed subscription, alert playback, volume override)
//! - Serialize all inputs through a single inbox: UI commands, feed
//!   snapshots, playback error callbacks, teardown
//! - Execute the actions returned by [`transition`] and feed side-effect
//!   failures back in as inputs

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rescuer_common::{EventStream, RescuerEvent};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, error, info, warn};

use super::state::{transition, AlarmAction, AlarmInput, AlarmState, AudioOverride};
use crate::error::{Error, Result};
use crate::notification::{
    emergency_message, emergency_notification, monitoring_notification, NotificationChannel,
    NotificationIds, EMERGENCY_TITLE, MONITORING_NOTIFICATION_ID,
};
use crate::platform::{FeedFilter, FeedSubscription, FeedUpdate, Platform, Playback, WakeLock};
use crate::session::MonitoringSession;

/// Tag the wake lock is registered under
pub const WAKE_LOCK_TAG: &str = "Rescuer:EmergencyWakeLock";

/// Coordinator tuning taken from configuration
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Bound of each wake lock acquisition
    pub wake_lock_timeout: Duration,
    /// Re-acquire the lock before it expires. Off by default: the lock then
    /// lapses after `wake_lock_timeout` while monitoring continues.
    pub renew_wake_lock: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            wake_lock_timeout: Duration::from_secs(10 * 60),
            renew_wake_lock: false,
        }
    }
}

/// Messages accepted by the coordinator inbox
enum CoordinatorMessage {
    Input(AlarmInput),
    /// Error callback from the playback started as `generation`
    PlaybackError { generation: u64, message: String },
    /// Replied to once every earlier message has been handled
    Barrier(oneshot::Sender<()>),
}

/// Background worker owning the alarm state machine
pub struct AlarmCoordinator {
    state: AlarmState,
    session: Option<MonitoringSession>,
    platform: Platform,
    events: Arc<EventStream>,
    settings: CoordinatorSettings,
    inbox: mpsc::UnboundedSender<CoordinatorMessage>,
    state_tx: watch::Sender<AlarmState>,
    /// Shared with later sessions so transient ids are never reused
    notification_ids: Arc<NotificationIds>,

    wake_lock: Option<Box<dyn WakeLock>>,
    subscription: Option<Box<dyn FeedSubscription>>,
    playback: Option<Box<dyn Playback>>,
    /// Incremented on every playback start; stale error callbacks are dropped
    playback_generation: u64,
    audio_override: Option<AudioOverride>,
}

impl AlarmCoordinator {
    /// Spawn the coordinator task and start monitoring `session`
    ///
    /// # Errors
    /// - `Error::Service` when called outside a tokio runtime
    pub fn spawn(
        platform: Platform,
        events: Arc<EventStream>,
        settings: CoordinatorSettings,
        session: MonitoringSession,
        notification_ids: Arc<NotificationIds>,
    ) -> Result<CoordinatorHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Service(format!("Failed to start service: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(AlarmState::Idle);

        let coordinator = Self {
            state: AlarmState::Idle,
            session: None,
            platform,
            events,
            settings,
            inbox: tx.clone(),
            state_tx,
            notification_ids,
            wake_lock: None,
            subscription: None,
            playback: None,
            playback_generation: 0,
            audio_override: None,
        };

        // First message in the inbox, so nothing can overtake it
        tx.send(CoordinatorMessage::Input(AlarmInput::Start(session)))
            .map_err(|_| Error::Service("Coordinator inbox closed".to_string()))?;

        let task = runtime.spawn(coordinator.run(rx));

        Ok(CoordinatorHandle {
            tx,
            state_rx,
            task: Some(task),
        })
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CoordinatorMessage>) {
        let mut renewal = self.renewal_interval();

        loop {
            tokio::select! {
                message = rx.recv() => {
                    let Some(message) = message else {
                        self.handle(AlarmInput::Teardown);
                        break;
                    };
                    if self.dispatch(message) {
                        break;
                    }
                }
                _ = next_tick(&mut renewal) => self.renew_wake_lock(),
            }
        }

        debug!("Alarm coordinator stopped");
    }

    /// Handle one inbox message. Returns true once torn down.
    fn dispatch(&mut self, message: CoordinatorMessage) -> bool {
        match message {
            CoordinatorMessage::Input(input) => {
                let teardown = input == AlarmInput::Teardown;
                self.handle(input);
                teardown
            }
            CoordinatorMessage::PlaybackError { generation, message } => {
                if self.playback.is_some() && generation == self.playback_generation {
                    self.handle(AlarmInput::PlaybackFailed(message));
                } else {
                    debug!("Ignoring error from stale playback {}: {}", generation, message);
                }
                false
            }
            CoordinatorMessage::Barrier(reply) => {
                let _ = reply.send(());
                false
            }
        }
    }

    fn renewal_interval(&self) -> Option<Interval> {
        if !self.settings.renew_wake_lock {
            return None;
        }
        let period = (self.settings.wake_lock_timeout / 2).max(Duration::from_secs(1));
        Some(interval_at(Instant::now() + period, period))
    }

    /// Apply an input and any follow-up inputs produced by failed side effects
    fn handle(&mut self, input: AlarmInput) {
        let mut pending = VecDeque::from([input]);

        while let Some(input) = pending.pop_front() {
            let old_state = self.state;
            let (new_state, actions) = transition(old_state, &input);

            if let AlarmInput::Start(session) = &input {
                if old_state == AlarmState::Idle {
                    self.session = Some(session.clone());
                }
            }

            if new_state != old_state {
                info!("Alarm state {} -> {}", old_state, new_state);
            }
            self.state = new_state;

            for action in actions {
                if let Some(follow_up) = self.execute(action) {
                    pending.push_back(follow_up);
                }
            }

            if new_state != old_state {
                self.state_tx.send_replace(new_state);
                self.events.emit(RescuerEvent::AlarmStateChanged {
                    old_state,
                    new_state,
                    timestamp: Utc::now(),
                });
                self.announce_session(old_state, new_state);
            }
        }
    }

    fn announce_session(&mut self, old_state: AlarmState, new_state: AlarmState) {
        match (old_state, new_state) {
            (AlarmState::Idle, _) => {
                if let Some(session) = &self.session {
                    self.events.emit(RescuerEvent::MonitoringStarted {
                        municipality: session.municipality.clone(),
                        operator_name: session.operator_name.clone(),
                        timestamp: Utc::now(),
                    });
                }
            }
            (_, AlarmState::Idle) => {
                if let Some(session) = self.session.take() {
                    self.events.emit(RescuerEvent::MonitoringStopped {
                        municipality: session.municipality,
                        timestamp: Utc::now(),
                    });
                }
            }
            _ => {}
        }
    }

    fn municipality(&self) -> &str {
        self.session
            .as_ref()
            .map(|s| s.municipality.as_str())
            .unwrap_or_default()
    }

    /// Run one side effect. Returns a follow-up input when the effect failed
    /// in a way the state machine must react to.
    fn execute(&mut self, action: AlarmAction) -> Option<AlarmInput> {
        match action {
            AlarmAction::AcquireWakeLock => {
                match self
                    .platform
                    .power
                    .acquire_wake_lock(WAKE_LOCK_TAG, self.settings.wake_lock_timeout)
                {
                    Ok(lock) => {
                        if let Some(previous) = self.wake_lock.replace(lock) {
                            previous.release();
                        }
                        debug!("Wake lock acquired for {:?}", self.settings.wake_lock_timeout);
                    }
                    Err(e) => self.surface(format!("Failed to acquire wake lock: {}", e)),
                }
                None
            }

            AlarmAction::RegisterChannel => {
                if let Err(e) = self
                    .platform
                    .notifier
                    .create_channel(&NotificationChannel::emergency())
                {
                    self.surface(format!("Failed to register notification channel: {}", e));
                }
                None
            }

            AlarmAction::OpenSubscription => self.open_subscription(),

            AlarmAction::PostMonitoringNotification => {
                let notification = monitoring_notification(self.state, self.municipality());
                if let Err(e) = self.platform.notifier.notify(&notification) {
                    self.surface(format!("Failed to update notification: {}", e));
                }
                None
            }

            AlarmAction::CancelMonitoringNotification => {
                self.platform.notifier.cancel(MONITORING_NOTIFICATION_ID);
                None
            }

            AlarmAction::CaptureVolume => {
                let captured = self
                    .platform
                    .audio
                    .stream_volume()
                    .and_then(|original| {
                        Ok(AudioOverride {
                            original_volume: original,
                            max_volume: self.platform.audio.max_stream_volume()?,
                        })
                    });
                match captured {
                    Ok(audio_override) => {
                        debug!(
                            "Captured volume {}/{}",
                            audio_override.original_volume, audio_override.max_volume
                        );
                        self.audio_override = Some(audio_override);
                    }
                    Err(e) => {
                        self.audio_override = None;
                        self.surface(format!("Failed to read stream volume: {}", e));
                    }
                }
                None
            }

            AlarmAction::ForceMaxVolume => {
                // Never force a volume that could not be captured for restore
                if let Some(audio_override) = self.audio_override {
                    if let Err(e) = self
                        .platform
                        .audio
                        .set_stream_volume(audio_override.max_volume)
                    {
                        self.surface(format!("Failed to raise volume: {}", e));
                    }
                }
                None
            }

            AlarmAction::StartPlayback => self.start_playback(),

            AlarmAction::RaiseEmergency { record_id } => {
                let municipality = self.municipality().to_string();
                let notification =
                    emergency_notification(self.notification_ids.next_id(), &municipality);
                if let Err(e) = self.platform.notifier.notify(&notification) {
                    self.surface(format!("Failed to post emergency notification: {}", e));
                }
                info!("Emergency {} in {}", record_id, municipality);
                self.events.emit(RescuerEvent::EmergencyAlert {
                    title: EMERGENCY_TITLE.to_string(),
                    message: emergency_message(&municipality),
                    record_id,
                    municipality,
                    timestamp: Utc::now(),
                });
                None
            }

            AlarmAction::StopPlayback => {
                if let Some(playback) = self.playback.take() {
                    playback.stop();
                    debug!("Alert playback {} released", self.playback_generation);
                }
                None
            }

            AlarmAction::RestoreVolume => {
                if let Some(audio_override) = self.audio_override.take() {
                    if let Err(e) = self
                        .platform
                        .audio
                        .set_stream_volume(audio_override.original_volume)
                    {
                        error!("Volume left at maximum: {}", e);
                        self.surface(format!("Failed to restore volume: {}", e));
                    }
                }
                None
            }

            AlarmAction::CloseSubscription => {
                if let Some(subscription) = self.subscription.take() {
                    subscription.remove();
                    debug!("Change feed subscription removed");
                }
                None
            }

            AlarmAction::ReleaseWakeLock => {
                if let Some(lock) = self.wake_lock.take() {
                    lock.release();
                    debug!("Wake lock released");
                }
                None
            }

            AlarmAction::SurfaceError(message) => {
                self.surface(message);
                None
            }
        }
    }

    fn open_subscription(&mut self) -> Option<AlarmInput> {
        // At most one listener per coordinator
        if let Some(previous) = self.subscription.take() {
            previous.remove();
        }

        let filter = FeedFilter::pending_for(self.municipality());
        let inbox = self.inbox.clone();
        let listener = Box::new(move |update: FeedUpdate| match update {
            FeedUpdate::Changes(changes) => {
                for change in changes {
                    let _ = inbox.send(CoordinatorMessage::Input(AlarmInput::FeedChange(change)));
                }
            }
            FeedUpdate::Failed(message) => {
                let _ = inbox.send(CoordinatorMessage::Input(AlarmInput::FeedFailed(message)));
            }
        });

        info!("Subscribing to {}", filter.collection_path);
        match self.platform.feed.subscribe(filter, listener) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                None
            }
            Err(e) => Some(AlarmInput::FeedFailed(format!(
                "Change feed initialization failed: {}",
                e
            ))),
        }
    }

    fn start_playback(&mut self) -> Option<AlarmInput> {
        if self.playback.is_some() {
            return None;
        }

        self.playback_generation += 1;
        let generation = self.playback_generation;
        let inbox = self.inbox.clone();
        let on_error = Box::new(move |message: String| {
            let _ = inbox.send(CoordinatorMessage::PlaybackError {
                generation,
                message,
            });
        });

        match self.platform.player.start_looping(on_error) {
            Ok(playback) => {
                debug!("Alert playback {} started", generation);
                self.playback = Some(playback);
                None
            }
            Err(e) => Some(AlarmInput::PlaybackFailed(format!(
                "Failed to play alarm: {}",
                e
            ))),
        }
    }

    fn renew_wake_lock(&mut self) {
        if !self.state.is_active() {
            return;
        }
        debug!("Renewing wake lock");
        self.execute(AlarmAction::AcquireWakeLock);
    }

    /// Surface a background error on the event stream
    fn surface(&self, message: String) {
        warn!("{}", message);
        self.events.emit(RescuerEvent::error(message));
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Handle held by the session controller
///
/// Dropping the handle without [`CoordinatorHandle::shutdown`] still tears
/// the coordinator down, so platform resources are never left behind.
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
    state_rx: watch::Receiver<AlarmState>,
    task: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    /// Forward the stop-alarm command
    pub fn stop_alarm(&self) -> bool {
        self.send(AlarmInput::StopAlarm)
    }

    /// Deliver an input to the coordinator inbox
    pub fn send(&self, input: AlarmInput) -> bool {
        self.tx.send(CoordinatorMessage::Input(input)).is_ok()
    }

    /// Latest published state
    pub fn state(&self) -> AlarmState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<AlarmState> {
        self.state_rx.clone()
    }

    /// Whether the coordinator task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait until every message sent before this call has been handled
    pub async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(CoordinatorMessage::Barrier(reply_tx)).is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// Tear down and wait for the coordinator task to finish
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.tx.send(CoordinatorMessage::Input(AlarmInput::Teardown));
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| Error::Service(format!("Failed to stop service: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.tx.send(CoordinatorMessage::Input(AlarmInput::Teardown));
        }
    }
}
