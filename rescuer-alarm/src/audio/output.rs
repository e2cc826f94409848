//! Alert output using cpal
//!
//! A cpal `Stream` is not `Send` on every host, so each playback owns a
//! dedicated thread that builds the stream, keeps it alive, and drops it when
//! stopped.

use super::{AlertSound, SoundCache};
use crate::error::{Error, Result};
use crate::platform::{AlertPlayer, Playback, PlaybackErrorCallback};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Alert player for the default output device
pub struct DeviceAlertPlayer {
    cache: SoundCache,
}

impl DeviceAlertPlayer {
    pub fn new(alert_sound: PathBuf) -> Self {
        Self {
            cache: SoundCache::new(alert_sound),
        }
    }
}

impl AlertPlayer for DeviceAlertPlayer {
    fn start_looping(&self, on_error: PlaybackErrorCallback) -> Result<Box<dyn Playback>> {
        let sound = self.cache.load()?;
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("rescuer-alert".to_string())
            .spawn(move || {
                let stream = match open_stream(sound, on_error) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until stop or until the handle is dropped
                let _ = stop_rx.recv();
                let _ = stream.pause();
                drop(stream);
            })
            .map_err(|e| Error::Playback(format!("Failed to spawn audio thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(DevicePlayback {
                stop_tx,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::Playback("Audio thread exited during startup".to_string())),
        }
    }
}

struct DevicePlayback {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Playback for DevicePlayback {
    fn stop(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio thread panicked");
            }
        }
        debug!("Device alert playback stopped");
    }
}

/// Name of the default output device, `None` when the host has none
pub fn default_device_name() -> Option<String> {
    let device = cpal::default_host().default_output_device()?;
    Some(device.name().unwrap_or_else(|_| "unknown".to_string()))
}

fn open_stream(sound: AlertSound, on_error: PlaybackErrorCallback) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("No default output device found".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::Playback(format!("Failed to get default config: {}", e)))?;

    let sample_format = supported.sample_format();
    let config = supported.config();
    info!(
        "Alert output: {} Hz, {} channels, {:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, sound, on_error)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, sound, on_error)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, sound, on_error)?,
        other => {
            return Err(Error::Playback(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::Playback(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    sound: AlertSound,
    on_error: PlaybackErrorCallback,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut cursor = LoopCursor::new(sound, config.sample_rate.0);
    let out_channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(out_channels) {
                    let (left, right) = cursor.next_frame();
                    for (i, sample) in frame.iter_mut().enumerate() {
                        let value = if i % 2 == 0 { left } else { right };
                        *sample = T::from_sample(value.clamp(-1.0, 1.0));
                    }
                }
            },
            move |err| {
                error!("Alert stream error: {}", err);
                on_error(format!("Audio stream error: {}", err));
            },
            None,
        )
        .map_err(|e| Error::Playback(format!("Failed to build stream: {}", e)))
}

/// Endless read position over the alert sound, with linear resampling to the
/// device rate
struct LoopCursor {
    sound: AlertSound,
    position: f64,
    step: f64,
}

impl LoopCursor {
    fn new(sound: AlertSound, device_rate: u32) -> Self {
        let step = sound.sample_rate as f64 / device_rate.max(1) as f64;
        Self {
            sound,
            position: 0.0,
            step,
        }
    }

    fn next_frame(&mut self) -> (f32, f32) {
        let frames = self.sound.frames();
        if frames == 0 {
            return (0.0, 0.0);
        }

        let index = self.position as usize % frames;
        let next = (index + 1) % frames;
        let frac = self.position.fract() as f32;

        let (l0, r0) = self.frame_at(index);
        let (l1, r1) = self.frame_at(next);

        self.position += self.step;
        if self.position >= frames as f64 {
            self.position -= frames as f64;
        }

        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }

    fn frame_at(&self, index: usize) -> (f32, f32) {
        let channels = self.sound.channels as usize;
        let base = index * channels;
        let left = self.sound.samples[base];
        let right = if channels > 1 {
            self.sound.samples[base + 1]
        } else {
            left
        };
        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_cursor_wraps() {
        let sound = AlertSound {
            samples: Arc::new(vec![0.0, 0.5, 1.0]),
            sample_rate: 100,
            channels: 1,
        };
        let mut cursor = LoopCursor::new(sound, 100);
        let frames: Vec<f32> = (0..4).map(|_| cursor.next_frame().0).collect();
        assert_eq!(frames, vec![0.0, 0.5, 1.0, 0.0]);
    }

    #[test]
    fn test_cursor_upsamples_with_interpolation() {
        let sound = AlertSound {
            samples: Arc::new(vec![0.0, 1.0]),
            sample_rate: 50,
            channels: 1,
        };
        let mut cursor = LoopCursor::new(sound, 100);
        let frames: Vec<f32> = (0..5).map(|_| cursor.next_frame().0).collect();
        // Interpolates towards the first frame across the loop boundary
        assert_eq!(frames, vec![0.0, 0.5, 1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_cursor_downsamples() {
        let sound = AlertSound {
            samples: Arc::new(vec![0.0, 0.25, 0.5, 0.75]),
            sample_rate: 200,
            channels: 1,
        };
        let mut cursor = LoopCursor::new(sound, 100);
        let frames: Vec<f32> = (0..3).map(|_| cursor.next_frame().0).collect();
        assert_eq!(frames, vec![0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_cursor_stereo_and_mono() {
        let stereo = AlertSound {
            samples: Arc::new(vec![0.1, 0.9, 0.2, 0.8]),
            sample_rate: 48000,
            channels: 2,
        };
        let mut cursor = LoopCursor::new(stereo, 48000);
        assert_eq!(cursor.next_frame(), (0.1, 0.9));
        assert_eq!(cursor.next_frame(), (0.2, 0.8));
        assert_eq!(cursor.next_frame(), (0.1, 0.9));

        let mono = AlertSound {
            samples: Arc::new(vec![0.3]),
            sample_rate: 48000,
            channels: 1,
        };
        let mut cursor = LoopCursor::new(mono, 48000);
        assert_eq!(cursor.next_frame(), (0.3, 0.3));
    }

    #[test]
    fn test_cursor_empty_sound_is_silent() {
        let sound = AlertSound {
            samples: Arc::new(Vec::new()),
            sample_rate: 48000,
            channels: 2,
        };
        let mut cursor = LoopCursor::new(sound, 44100);
        assert_eq!(cursor.next_frame(), (0.0, 0.0));
    }
}
