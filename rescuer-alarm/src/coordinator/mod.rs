//! Alarm coordinator: state machine and the actor that runs it

pub mod engine;
pub mod state;

pub use engine::{AlarmCoordinator, CoordinatorHandle, CoordinatorSettings, WAKE_LOCK_TAG};
pub use state::{transition, AlarmAction, AlarmInput, AlarmState, AudioOverride};
