//! Alert playback backends
//!
//! - `DeviceAlertPlayer` (feature `device-audio`, on by default): plays the
//!   sound through the default cpal output device.
//! - `HeadlessAlertPlayer`: decodes the alert sound and paces a loop of it on
//!   the tokio runtime without touching an output device. Used when
//!   configured, when the host has no output device, or in builds without
//!   `device-audio`.

pub mod decoder;
#[cfg(feature = "device-audio")]
pub mod output;

pub use decoder::{decode_file, AlertSound};
#[cfg(feature = "device-audio")]
pub use output::DeviceAlertPlayer;

use crate::error::{Error, Result};
use crate::platform::{AlertPlayer, Playback, PlaybackErrorCallback};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Shortest pause between two loop iterations
const MIN_LOOP_PERIOD: Duration = Duration::from_millis(100);

/// Decode the alert sound on first use and keep it
pub(crate) struct SoundCache {
    path: PathBuf,
    sound: Mutex<Option<AlertSound>>,
}

impl SoundCache {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            sound: Mutex::new(None),
        }
    }

    pub(crate) fn load(&self) -> Result<AlertSound> {
        let mut cached = self.sound.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sound) = cached.as_ref() {
            return Ok(sound.clone());
        }
        let sound = decoder::decode_file(&self.path)?;
        *cached = Some(sound.clone());
        Ok(sound)
    }
}

/// Alert player for hosts without an audio device
pub struct HeadlessAlertPlayer {
    cache: SoundCache,
}

impl HeadlessAlertPlayer {
    pub fn new(alert_sound: PathBuf) -> Self {
        Self {
            cache: SoundCache::new(alert_sound),
        }
    }
}

impl AlertPlayer for HeadlessAlertPlayer {
    fn start_looping(&self, _on_error: PlaybackErrorCallback) -> Result<Box<dyn Playback>> {
        let sound = self.cache.load()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Playback(format!("No runtime for playback: {}", e)))?;

        let period = sound.duration().max(MIN_LOOP_PERIOD);
        info!(
            "Looping alert sound ({:?} per iteration, no output device)",
            period
        );

        let task = runtime.spawn(async move {
            let mut iteration: u64 = 0;
            loop {
                tokio::time::sleep(period).await;
                iteration += 1;
                debug!("Alert loop iteration {}", iteration);
            }
        });

        Ok(Box::new(HeadlessPlayback { task }))
    }
}

struct HeadlessPlayback {
    task: JoinHandle<()>,
}

impl Playback for HeadlessPlayback {
    fn stop(self: Box<Self>) {
        self.task.abort();
        debug!("Headless alert loop stopped");
    }
}
