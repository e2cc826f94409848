//! Alarm state machine
//!
//! Pure reducer: `(AlarmState, AlarmInput) -> (AlarmState, Vec<AlarmAction>)`.
//! No platform calls happen here; the engine executes the returned actions.
//!
//! ```text
//!          start                 Added(pending)
//!  Idle ──────────► Monitoring ─────────────────► Alarming
//!   ▲                 │   ▲     stop / playback     │
//!   │    teardown     │   └──────── error ──────────┘
//!   └─────────────────┴─────────────────────────────┘
//! ```

use crate::platform::{ChangeEvent, ChangeKind, PENDING_STATUS};
use crate::session::MonitoringSession;
pub use rescuer_common::AlarmState;

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmInput {
    /// Begin monitoring for a session
    Start(MonitoringSession),
    /// Change delivered by the feed
    FeedChange(ChangeEvent),
    /// Feed reported an error (never retried)
    FeedFailed(String),
    /// Stop button (UI or notification action)
    StopAlarm,
    /// Alert playback failed to start or broke while looping
    PlaybackFailed(String),
    /// Session stopped or host shutting down
    Teardown,
}

/// Side effects requested by a transition, executed in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmAction {
    AcquireWakeLock,
    RegisterChannel,
    OpenSubscription,
    /// Re-render the persistent notification from the new state
    PostMonitoringNotification,
    CancelMonitoringNotification,
    CaptureVolume,
    ForceMaxVolume,
    StartPlayback,
    RaiseEmergency { record_id: String },
    StopPlayback,
    RestoreVolume,
    CloseSubscription,
    ReleaseWakeLock,
    SurfaceError(String),
}

/// Volume captured when the alarm forces the stream to maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioOverride {
    pub original_volume: u32,
    pub max_volume: u32,
}

fn is_new_emergency(change: &ChangeEvent) -> bool {
    change.kind == ChangeKind::Added && change.status == PENDING_STATUS
}

/// Compute the next state and the actions that get there
pub fn transition(state: AlarmState, input: &AlarmInput) -> (AlarmState, Vec<AlarmAction>) {
    use AlarmAction::*;
    use AlarmState::*;

    match (state, input) {
        (Idle, AlarmInput::Start(_)) => (
            Monitoring,
            vec![
                AcquireWakeLock,
                RegisterChannel,
                PostMonitoringNotification,
                OpenSubscription,
            ],
        ),
        // Already running: start is idempotent
        (Monitoring | Alarming, AlarmInput::Start(_)) => (state, Vec::new()),

        (Monitoring, AlarmInput::FeedChange(change)) if is_new_emergency(change) => (
            Alarming,
            vec![
                CaptureVolume,
                ForceMaxVolume,
                StartPlayback,
                PostMonitoringNotification,
                RaiseEmergency {
                    record_id: change.record_id.clone(),
                },
            ],
        ),
        // Coalesced: playback keeps running, only the new record is announced
        (Alarming, AlarmInput::FeedChange(change)) if is_new_emergency(change) => (
            Alarming,
            vec![RaiseEmergency {
                record_id: change.record_id.clone(),
            }],
        ),
        (_, AlarmInput::FeedChange(_)) => (state, Vec::new()),

        (_, AlarmInput::FeedFailed(message)) => (state, vec![SurfaceError(message.clone())]),

        (Alarming, AlarmInput::StopAlarm) => (
            Monitoring,
            vec![StopPlayback, RestoreVolume, PostMonitoringNotification],
        ),
        (Idle | Monitoring, AlarmInput::StopAlarm) => (state, Vec::new()),

        (Alarming, AlarmInput::PlaybackFailed(message)) => (
            Monitoring,
            vec![
                SurfaceError(message.clone()),
                StopPlayback,
                RestoreVolume,
                PostMonitoringNotification,
            ],
        ),
        (Idle | Monitoring, AlarmInput::PlaybackFailed(message)) => {
            (state, vec![SurfaceError(message.clone())])
        }

        (Alarming, AlarmInput::Teardown) => (
            Idle,
            vec![
                StopPlayback,
                RestoreVolume,
                CloseSubscription,
                ReleaseWakeLock,
                CancelMonitoringNotification,
            ],
        ),
        (Monitoring, AlarmInput::Teardown) => (
            Idle,
            vec![CloseSubscription, ReleaseWakeLock, CancelMonitoringNotification],
        ),
        (Idle, AlarmInput::Teardown) => (Idle, Vec::new()),
    }
}
