//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** block on a mutex or perform I/O, and it only allocates on
//! the first callback (mixdown scratch buffer sizing). Samples are mixed to
//! mono and written into an SPSC ring buffer producer whose `push_slice` is
//! lock-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread. The engine does this inside the feeder's `spawn_blocking` closure.

pub mod device;
pub mod permission;
pub mod resample;
pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::AudioProducer,
    error::{PawsenseError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Invoked from the audio thread whenever the backend reports a stream error.
pub type StreamErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle to an active audio capture stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on Windows/macOS.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag. Set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
    /// Name of the opened device.
    pub device_name: String,
}

#[cfg(feature = "audio-cpal")]
impl AudioCapture {
    /// Open the input device named `preferred_device_name`, falling back to
    /// the default input device and then the first available one.
    ///
    /// # Errors
    /// `PawsenseError::NoDefaultInputDevice` when no microphone exists, or
    /// `PawsenseError::AudioStream` if cpal fails to build or start the stream.
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
        on_error: StreamErrorCallback,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::select_input_device(&host, preferred_device_name)?;
        let device_name = device.name().unwrap_or_default();

        let supported = device
            .default_input_config()
            .map_err(|e| PawsenseError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(
            device = device_name.as_str(),
            sample_rate,
            channels,
            format = ?supported.sample_format(),
            "opening input device"
        );

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let flag = Arc::clone(&running);
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_mono_stream::<f32, _>(&device, &config, producer, flag, on_error, |s| s)
            }
            SampleFormat::I16 => {
                build_mono_stream::<i16, _>(&device, &config, producer, flag, on_error, |s| {
                    s as f32 / 32768.0
                })
            }
            SampleFormat::U8 => {
                build_mono_stream::<u8, _>(&device, &config, producer, flag, on_error, |s| {
                    (s as f32 - 128.0) / 128.0
                })
            }
            fmt => {
                return Err(PawsenseError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| PawsenseError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
            device_name,
        })
    }
}

/// Build an input stream that mixes interleaved frames of `T` down to mono f32.
#[cfg(feature = "audio-cpal")]
fn build_mono_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
    on_error: StreamErrorCallback,
    to_f32: F,
) -> Result<Stream>
where
    T: cpal::SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    use crate::buffering::Producer;

    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / channels;
                mono.resize(frames, 0.0);
                for (slot, frame) in mono.iter_mut().zip(data.chunks_exact(channels)) {
                    let sum: f32 = frame.iter().map(|s| to_f32(*s)).sum();
                    *slot = sum / channels as f32;
                }
                let written = producer.push_slice(&mono);
                if written < mono.len() {
                    warn!(dropped = mono.len() - written, "ring buffer full: dropped frames");
                }
            },
            move |err| {
                error!("audio stream error: {err}");
                on_error(&err.to_string());
            },
            None,
        )
        .map_err(|e| PawsenseError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
        _on_error: StreamErrorCallback,
    ) -> Result<Self> {
        Err(PawsenseError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl AudioCapture {
    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
