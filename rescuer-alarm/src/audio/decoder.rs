//! Alert sound decoding using symphonia
//!
//! The alert sound is short and looped, so it is decoded once into memory as
//! interleaved f32 samples.

use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Fully decoded alert sound
#[derive(Debug, Clone)]
pub struct AlertSound {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AlertSound {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Play time of one loop iteration
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Decode an entire audio file
///
/// # Errors
/// - `Error::Playback` if the file cannot be opened, has no audio track, or
///   decodes to no samples
pub fn decode_file(path: &Path) -> Result<AlertSound> {
    debug!("Decoding alert sound: {}", path.display());

    let file = std::fs::File::open(path).map_err(|e| {
        Error::Playback(format!("Failed to open alert sound {}: {}", path.display(), e))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Playback(format!("Failed to probe format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Playback("No audio track found".to_string()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Playback("Sample rate not found".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| Error::Playback("Channel count not found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Playback(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            // Recoverable: skip the corrupt packet
            Err(SymphoniaError::DecodeError(e)) => warn!("Decode error: {}", e),
            Err(e) => return Err(Error::Playback(format!("Decode failed: {}", e))),
        }
    }

    if samples.is_empty() {
        return Err(Error::Playback(format!(
            "Alert sound {} contains no audio",
            path.display()
        )));
    }

    debug!(
        "Decoded {} frames at {} Hz, {} channels",
        samples.len() / channels.max(1) as usize,
        sample_rate,
        channels
    );

    Ok(AlertSound {
        samples: Arc::new(samples),
        sample_rate,
        channels,
    })
}
