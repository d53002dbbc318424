//! `StubClassifier`: placeholder backend that needs no model artifact.
//!
//! Returns fixed logits for every well-formed waveform so capture, windowing
//! and presentation can be exercised end-to-end without ONNX Runtime.

use tracing::debug;

use crate::config::NUM_CLASSES;
use crate::error::{PawsenseError, Result};
use crate::inference::{AudioClassifier, InputShape};

pub struct StubClassifier {
    logits: [f32; NUM_CLASSES],
    ready: bool,
    calls: u64,
}

impl StubClassifier {
    /// All-zero logits: a uniform distribution, which labels as "none".
    pub fn new() -> Self {
        Self::with_logits([0.0; NUM_CLASSES])
    }

    pub fn with_logits(logits: [f32; NUM_CLASSES]) -> Self {
        Self {
            logits,
            ready: false,
            calls: 0,
        }
    }

    /// Number of successful `forward` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClassifier for StubClassifier {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubClassifier::warm_up: no-op");
        self.ready = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn forward(&mut self, waveform: &[f32], shape: &InputShape) -> Result<Vec<Vec<f32>>> {
        if !self.ready {
            return Err(PawsenseError::ModelNotReady);
        }
        if waveform.len() != shape.element_count() {
            return Err(PawsenseError::Inference(format!(
                "waveform has {} samples, input shape {:?} expects {}",
                waveform.len(),
                shape.dims(),
                shape.element_count()
            )));
        }
        self.calls += 1;
        Ok(vec![self.logits.to_vec()])
    }
}
