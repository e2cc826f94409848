//! Event types for the rescuer event stream
//!
//! Provides the event definitions delivered to the UI layer and the
//! `EventStream` that carries them.

mod alarm_types;

pub use alarm_types::AlarmState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Rescuer event types
///
/// Events flow one way, from the alarm service to the UI layer. They can be
/// serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RescuerEvent {
    /// A new pending emergency record was added for the monitored municipality
    ///
    /// Triggers:
    /// - UI: Show emergency details
    /// - Transient notification (posted by the coordinator, not the UI)
    EmergencyAlert {
        /// Notification title ("Emergency Alert")
        title: String,
        /// Human readable message
        message: String,
        /// Identifier of the record in the remote collection
        record_id: String,
        /// Municipality being monitored
        municipality: String,
        /// When the alert was raised
        timestamp: DateTime<Utc>,
    },

    /// Alarm coordinator changed state
    AlarmStateChanged {
        old_state: AlarmState,
        new_state: AlarmState,
        timestamp: DateTime<Utc>,
    },

    /// A monitoring session was started
    MonitoringStarted {
        municipality: String,
        operator_name: String,
        timestamp: DateTime<Utc>,
    },

    /// The monitoring session was torn down
    MonitoringStopped {
        municipality: String,
        timestamp: DateTime<Utc>,
    },

    /// Background error (change feed, playback, platform)
    ///
    /// These errors never reach the command channel; this event is the only
    /// place they surface.
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl RescuerEvent {
    /// Build an `Error` event stamped with the current time
    pub fn error(message: impl Into<String>) -> Self {
        RescuerEvent::Error {
            error: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Event type name, matching the serde tag
    pub fn event_type(&self) -> &'static str {
        match self {
            RescuerEvent::EmergencyAlert { .. } => "EmergencyAlert",
            RescuerEvent::AlarmStateChanged { .. } => "AlarmStateChanged",
            RescuerEvent::MonitoringStarted { .. } => "MonitoringStarted",
            RescuerEvent::MonitoringStopped { .. } => "MonitoringStopped",
            RescuerEvent::Error { .. } => "Error",
        }
    }
}

// ========================================
// EventStream Implementation
// ========================================

/// One-directional event stream with at most one active subscriber
///
/// Unlike a broadcast bus, only the most recent listener receives events.
/// Calling [`EventStream::listen`] again drops the previous sender, so the
/// previous receiver observes end-of-stream.
///
/// Events emitted while nobody listens are dropped.
///
/// # Examples
///
/// ```
/// use rescuer_common::events::{EventStream, RescuerEvent};
///
/// let stream = EventStream::new(16);
/// let mut rx = stream.listen();
///
/// assert!(stream.emit(RescuerEvent::error("feed unavailable")));
/// assert!(matches!(rx.try_recv(), Ok(RescuerEvent::Error { .. })));
/// ```
pub struct EventStream {
    sink: Mutex<Option<mpsc::Sender<RescuerEvent>>>,
    capacity: usize,
}

impl EventStream {
    /// Creates a new stream whose subscriber buffers up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            sink: Mutex::new(None),
            capacity: capacity.max(1),
        }
    }

    /// Attach a subscriber, replacing any previous one
    pub fn listen(&self) -> mpsc::Receiver<RescuerEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let previous = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(tx);
        if previous.is_some() {
            debug!("Event stream subscriber replaced");
        }
        rx
    }

    /// Detach the current subscriber, if any
    pub fn cancel(&self) {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Whether a live subscriber is attached
    pub fn has_listener(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver an event to the subscriber
    ///
    /// Returns `true` if the event was queued. A subscriber whose receiver has
    /// been dropped is detached.
    pub fn emit(&self, event: RescuerEvent) -> bool {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sink.as_ref() else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Event stream subscriber lagging, dropped {} event",
                    event.event_type()
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event stream subscriber went away");
                *sink = None;
                false
            }
        }
    }

    /// Configured per-subscriber buffer size
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(64)
    }
}
