//! # pawsense-core
//!
//! Rolling-window pet sound classifier SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → feeder (spawn_blocking)
//!                                                    │ resample + fixed chunks
//!                                             bounded mpsc queue
//!                                                    │
//!                                    classifier task: RollingWindow → snapshot
//!                                                    │
//!                                    AudioClassifier::forward (spawn_blocking)
//!                                                    │
//!                                    softmax → ThresholdPolicy → ClassificationState
//!                                                    │
//!                                    broadcast::Sender<ClassificationEvent>
//! ```
//!
//! The audio callback never blocks. Cycles are serial: chunks that arrive
//! during inference are coalesced into the next window.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod inference;

// Convenience re-exports for downstream crates
pub use classify::{ClassificationState, CycleOutcome, DetectedClass, ThresholdPolicy};
pub use engine::{AudioSource, EngineConfig, PawsenseEngine};
pub use error::PawsenseError;
pub use events::{
    CaptureStatus, CaptureStatusEvent, ClassificationEvent, EngineStatus, EngineStatusEvent,
};
pub use inference::{source::ModelSource, stub::StubClassifier, AudioClassifier, ModelHandle};

#[cfg(feature = "onnx")]
pub use inference::{OnnxClassifier, OnnxClassifierConfig};
