//! # Rescuer Common Library
//!
//! Shared code for the rescuer alarm service and its clients:
//! - Event types (RescuerEvent enum) and the single-subscriber event stream
//! - Alarm state shared between the service and the UI layer
//! - Configuration loading (TOML file, environment, compiled defaults)
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod events;
#[cfg(feature = "sse")]
pub mod sse;

pub use error::{Error, Result};
pub use events::{AlarmState, EventStream, RescuerEvent};
