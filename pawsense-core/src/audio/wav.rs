//! WAV file input: an offline audio source for replaying recordings through
//! the classifier.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::info;

use crate::audio::resample::{RateConverter, DEFAULT_RESAMPLE_BLOCK};
use crate::error::{PawsenseError, Result};

/// Decoded mono audio at its native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavClip {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Read a WAV file and mix it down to mono f32 in `[-1, 1]`.
///
/// # Errors
/// `PawsenseError::Wav` for unreadable files or unsupported encodings.
pub fn read_wav_mono(path: &Path) -> Result<WavClip> {
    let mut reader = WavReader::open(path)
        .map_err(|e| PawsenseError::Wav(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PawsenseError::Wav(e.to_string()))?,
        (SampleFormat::Int, bits @ 8..=16) => {
            let scale = (1_i32 << (bits - 1)) as f32;
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| PawsenseError::Wav(e.to_string()))?
        }
        (SampleFormat::Int, bits @ 17..=32) => {
            let scale = (1_i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| PawsenseError::Wav(e.to_string()))?
        }
        (format, bits) => {
            return Err(PawsenseError::Wav(format!(
                "unsupported encoding {format:?} at {bits} bits"
            )))
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(WavClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Read a WAV file and resample it to `target_rate`.
pub fn load_wav_at_rate(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let clip = read_wav_mono(path)?;
    info!(
        path = ?path,
        sample_rate = clip.sample_rate,
        duration_secs = clip.duration_secs(),
        "loaded WAV input"
    );
    let mut converter = RateConverter::new(clip.sample_rate, target_rate, DEFAULT_RESAMPLE_BLOCK)?;
    let mut out = Vec::with_capacity(
        (clip.samples.len() as u64 * target_rate as u64 / clip.sample_rate.max(1) as u64) as usize,
    );
    converter.process_into(&clip.samples, &mut out);
    converter.flush_into(&mut out);
    Ok(out)
}
