//! # Rescuer Alarm Library (rescuer-alarm)
//!
//! Background emergency monitoring for a rescue operator.
//!
//! **Purpose:** Watch the pending-emergency collection of one municipality,
//! raise an audible alarm (stream volume forced to maximum, looping alert
//! sound, notifications) when a new emergency appears, and restore everything
//! when the operator stops the alarm or the session.
//!
//! **Architecture:**
//! - [`session::SessionController`]: start/stop, permission gating, command channel
//! - [`coordinator`]: pure alarm state machine driven by a single-task actor
//! - [`platform`]: traits for every OS collaborator, plus host implementations
//! - [`api`]: axum HTTP/SSE surface used by the UI layer

pub mod api;
pub mod audio;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod notification;
pub mod platform;
pub mod session;

pub use command::{Command, CommandReply};
pub use config::{AlarmConfig, AudioOutput};
pub use error::{Error, ErrorCode, Result};
pub use session::{MonitoringSession, SessionController, SessionStatus};
