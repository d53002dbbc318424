//! Audio classification model abstraction.
//!
//! The `AudioClassifier` trait decouples the classification cycle from any
//! specific backend (stub, ONNX Runtime, ...).
//!
//! `forward` takes `&mut self` because runtime sessions are stateful. All
//! calls are serialised through `ModelHandle`'s `parking_lot::Mutex`, and the
//! pipeline only ever issues one call at a time.

pub mod source;
pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxClassifier, OnnxClassifierConfig};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Tensor shape of a model input, e.g. `[1, 1, 48000]` for a mono waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape([usize; 3]);

impl InputShape {
    /// `[batch = 1, channels = 1, samples]`.
    pub fn waveform(samples: usize) -> Self {
        Self([1, 1, samples])
    }

    pub fn dims(&self) -> &[usize; 3] {
        &self.0
    }

    /// Total number of elements the input buffer must hold.
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }
}

/// Contract for waveform classification backends.
pub trait AudioClassifier: Send + 'static {
    /// One-time load of the model artifact plus a dummy forward pass.
    ///
    /// # Errors
    /// Returns an error if the model file is missing or cannot be loaded.
    fn warm_up(&mut self) -> Result<()>;

    /// Whether `warm_up` has completed and `forward` may be called.
    fn is_ready(&self) -> bool;

    /// Run the model on a flat waveform.
    ///
    /// `waveform.len()` must equal `shape.element_count()`. Returns one row of
    /// raw per-class scores (logits) per batch element.
    fn forward(&mut self, waveform: &[f32], shape: &InputShape) -> Result<Vec<Vec<f32>>>;
}

/// Thread-safe reference-counted handle to any `AudioClassifier` implementor.
///
/// Uses `parking_lot::Mutex` so a panicking backend does not poison the lock.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn AudioClassifier>>);

impl ModelHandle {
    /// Wrap any `AudioClassifier` in a `ModelHandle`.
    pub fn new<M: AudioClassifier>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }

    pub fn is_ready(&self) -> bool {
        self.0.lock().is_ready()
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}
