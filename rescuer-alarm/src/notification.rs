//! Notification construction
//!
//! Two categories share one channel:
//! - the persistent "monitoring active" notification, a projection of the
//!   alarm state that is rebuilt on every transition
//! - a transient "new emergency" notification per event

use rescuer_common::AlarmState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

pub type NotificationId = u32;

/// Id of the persistent monitoring notification
pub const MONITORING_NOTIFICATION_ID: NotificationId = 1;

/// Channel every rescuer notification is posted on
pub const CHANNEL_ID: &str = "FOREGROUND_CHANNEL";

/// Action string carried by the "Stop Alarm" button
pub const STOP_ALARM_ACTION: &str = "STOP_ALARM_ACTION";

pub const EMERGENCY_TITLE: &str = "Emergency Alert";

const MONITORING_TITLE: &str = "Emergency Monitoring Active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    High,
}

/// Channel importance as understood by the host notification manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Default,
    High,
}

/// Button attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub label: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub channel_id: String,
    pub title: String,
    pub text: String,
    pub priority: Priority,
    /// Cannot be swiped away while the session runs
    pub ongoing: bool,
    /// Dismissed when tapped
    pub auto_cancel: bool,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a.action == action)
    }
}

/// Notification channel registered once per monitoring session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: Importance,
    pub vibration: bool,
    pub lights: bool,
    pub show_badge: bool,
}

impl NotificationChannel {
    pub fn emergency() -> Self {
        Self {
            id: CHANNEL_ID.to_string(),
            name: "Emergency Monitoring".to_string(),
            description: "Emergency alerts channel".to_string(),
            importance: Importance::High,
            vibration: true,
            lights: true,
            show_badge: true,
        }
    }
}

/// Persistent notification for the current alarm state
///
/// The "Stop Alarm" action is present only while alarming.
pub fn monitoring_notification(state: AlarmState, municipality: &str) -> Notification {
    let mut actions = Vec::new();
    if state == AlarmState::Alarming {
        actions.push(NotificationAction {
            label: "Stop Alarm".to_string(),
            action: STOP_ALARM_ACTION.to_string(),
        });
    }

    Notification {
        id: MONITORING_NOTIFICATION_ID,
        channel_id: CHANNEL_ID.to_string(),
        title: MONITORING_TITLE.to_string(),
        text: format!("Listening for new emergencies in {}", municipality),
        priority: Priority::Low,
        ongoing: true,
        auto_cancel: false,
        actions,
    }
}

/// Message shown for a new emergency in `municipality`
pub fn emergency_message(municipality: &str) -> String {
    format!("New emergency in {}", municipality)
}

/// High-priority one-shot notification for a single emergency
pub fn emergency_notification(id: NotificationId, municipality: &str) -> Notification {
    Notification {
        id,
        channel_id: CHANNEL_ID.to_string(),
        title: EMERGENCY_TITLE.to_string(),
        text: emergency_message(municipality),
        priority: Priority::High,
        ongoing: false,
        auto_cancel: true,
        actions: Vec::new(),
    }
}

/// Allocates transient notification ids
///
/// Never yields 0 or [`MONITORING_NOTIFICATION_ID`], so a transient
/// notification cannot replace the persistent one.
#[derive(Debug)]
pub struct NotificationIds {
    next: AtomicU32,
}

const FIRST_TRANSIENT_ID: NotificationId = MONITORING_NOTIFICATION_ID + 1;

impl NotificationIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(FIRST_TRANSIENT_ID),
        }
    }

    pub fn next_id(&self) -> NotificationId {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id >= FIRST_TRANSIENT_ID {
                return id;
            }
            // wrapped around
        }
    }
}

impl Default for NotificationIds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_action_only_while_alarming() {
        let monitoring = monitoring_notification(AlarmState::Monitoring, "riverside");
        assert!(!monitoring.has_action(STOP_ALARM_ACTION));
        assert_eq!(monitoring.text, "Listening for new emergencies in riverside");
        assert_eq!(monitoring.priority, Priority::Low);
        assert!(monitoring.ongoing);

        let alarming = monitoring_notification(AlarmState::Alarming, "riverside");
        assert!(alarming.has_action(STOP_ALARM_ACTION));
        assert_eq!(alarming.actions[0].label, "Stop Alarm");
        assert_eq!(alarming.id, MONITORING_NOTIFICATION_ID);
    }

    #[test]
    fn test_emergency_notification() {
        let n = emergency_notification(42, "riverside");
        assert_eq!(n.title, "Emergency Alert");
        assert_eq!(n.text, "New emergency in riverside");
        assert_eq!(n.priority, Priority::High);
        assert!(n.auto_cancel);
        assert!(!n.ongoing);
    }

    #[test]
    fn test_ids_skip_persistent_id_on_wrap() {
        let ids = NotificationIds::new();
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);

        ids.next.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(ids.next_id(), u32::MAX);
        // 0 and 1 are skipped after wrapping
        assert_eq!(ids.next_id(), 2);
    }
}
