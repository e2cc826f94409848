//! Alarm-related type definitions
//!
//! Supporting types shared by the alarm service and UI clients.

use serde::{Deserialize, Serialize};

/// Alarm coordinator state
///
/// Exactly one instance lives inside the alarm coordinator. Clients only ever
/// see copies of it (status snapshots and `AlarmStateChanged` events).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    /// No monitoring session
    #[default]
    Idle,
    /// Subscribed to the change feed, waiting for emergencies
    Monitoring,
    /// Alert sound playing, stop action exposed
    Alarming,
}

impl AlarmState {
    /// True while a monitoring session owns platform resources
    pub fn is_active(&self) -> bool {
        !matches!(self, AlarmState::Idle)
    }
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmState::Idle => write!(f, "idle"),
            AlarmState::Monitoring => write!(f, "monitoring"),
            AlarmState::Alarming => write!(f, "alarming"),
        }
    }
}
