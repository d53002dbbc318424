//! One classification cycle per chunk-ready event.
//!
//! ```text
//!   Idle ──accept_chunk──► Windowing ──begin──► Inferring ──complete──► Labeled
//!     ▲                        │                    │
//!     └──── window not full ───┘                    │
//!     └──────────────── failure (reset pair) ◄──────┘
//! ```
//!
//! The cycle itself is synchronous bookkeeping. The async driver in
//! `engine::pipeline` owns the suspension point between `begin` and
//! `complete`, so a waveform snapshot handed to inference is never affected
//! by chunks that arrive afterwards.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffering::{chunk::AudioChunk, window::RollingWindow};
use crate::classify::{softmax, ClassificationState, ThresholdPolicy};
use crate::config::NUM_CLASSES;
use crate::error::{PawsenseError, Result};
use crate::inference::InputShape;

/// Where the cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Waiting for the next chunk (initial state, and after a failure).
    Idle,
    /// A chunk was appended; the window is being snapshotted.
    Windowing,
    /// A snapshot was handed to the inference engine.
    Inferring,
    /// The last cycle published a fresh label.
    Labeled,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleOutcome {
    /// Inference succeeded and a label was computed.
    Labeled,
    /// The window is not full yet; inference was skipped.
    Deferred,
    /// Something in the cycle failed; the reset pair was published.
    Failed,
}

/// Result of one cycle, ready to publish.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub state: ClassificationState,
    pub outcome: CycleOutcome,
    /// Error message when `outcome == Failed`.
    pub error: Option<String>,
}

impl CycleReport {
    fn failed(err: &PawsenseError) -> Self {
        Self {
            state: ClassificationState::reset(),
            outcome: CycleOutcome::Failed,
            error: Some(err.to_string()),
        }
    }
}

/// Owns the rolling window and the threshold policy for one capture session.
#[derive(Debug)]
pub struct ClassificationCycle {
    window: RollingWindow,
    policy: ThresholdPolicy,
    state: CycleState,
}

impl ClassificationCycle {
    pub fn new(window: RollingWindow, policy: ThresholdPolicy) -> Self {
        Self {
            window,
            policy,
            state: CycleState::Idle,
        }
    }

    /// Step 1: append a freshly delivered chunk.
    ///
    /// A malformed chunk breaks audio continuity, so the window is cleared
    /// and the cycle returns to `Idle`.
    pub fn accept_chunk(&mut self, chunk: AudioChunk) -> Result<()> {
        self.state = CycleState::Windowing;
        if let Err(e) = self.window.append(chunk) {
            warn!(error = %e, "dropping malformed chunk and clearing window");
            self.window.clear();
            self.state = CycleState::Idle;
            return Err(e);
        }
        Ok(())
    }

    /// Step 2: snapshot the window for inference.
    ///
    /// Returns `None` while the window is still filling; the cycle goes back
    /// to `Idle` and the caller should publish [`Self::defer`].
    pub fn begin(&mut self) -> Option<Vec<f32>> {
        match self.window.snapshot() {
            Some(waveform) => {
                self.state = CycleState::Inferring;
                Some(waveform)
            }
            None => {
                debug!(
                    held = self.window.len(),
                    needed = self.window.capacity(),
                    "window not full: deferring classification"
                );
                self.state = CycleState::Idle;
                None
            }
        }
    }

    /// Report for a cycle that was skipped because the window is not full.
    pub fn defer(&self) -> CycleReport {
        CycleReport {
            state: ClassificationState::reset(),
            outcome: CycleOutcome::Deferred,
            error: None,
        }
    }

    /// Steps 4–5: normalise the inference result and label it.
    pub fn complete(&mut self, raw: Result<Vec<Vec<f32>>>) -> CycleReport {
        match raw.and_then(|rows| classify_scores(&rows, &self.policy)) {
            Ok(state) => {
                self.state = CycleState::Labeled;
                CycleReport {
                    state,
                    outcome: CycleOutcome::Labeled,
                    error: None,
                }
            }
            Err(e) => self.fail(&e),
        }
    }

    /// Turn any error into the reset report and return to `Idle`.
    pub fn fail(&mut self, err: &PawsenseError) -> CycleReport {
        self.state = CycleState::Idle;
        CycleReport::failed(err)
    }

    /// Shape handed to the inference engine alongside the waveform.
    pub fn input_shape(&self) -> InputShape {
        InputShape::waveform(self.window.waveform_len())
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }
}

/// Softmax + threshold over the first output row of a forward pass.
pub fn classify_scores(rows: &[Vec<f32>], policy: &ThresholdPolicy) -> Result<ClassificationState> {
    let scores = rows
        .first()
        .ok_or_else(|| PawsenseError::Inference("model returned no output rows".into()))?;
    if scores.len() != NUM_CLASSES {
        return Err(PawsenseError::Inference(format!(
            "expected {NUM_CLASSES} class scores, got {}",
            scores.len()
        )));
    }

    let normalized = softmax(scores)?;
    let mut probs = [0.0f32; NUM_CLASSES];
    probs.copy_from_slice(&normalized);

    Ok(ClassificationState {
        probs,
        detected: policy.label(&probs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DetectedClass;
    use approx::assert_abs_diff_eq;

    fn cycle(capacity: usize, chunk_samples: usize) -> ClassificationCycle {
        ClassificationCycle::new(
            RollingWindow::new(capacity, chunk_samples),
            ThresholdPolicy::default(),
        )
    }

    fn chunk(len: usize) -> AudioChunk {
        AudioChunk::new(vec![0.1; len], 16_000)
    }

    #[test]
    fn defers_until_window_is_full() {
        let mut c = cycle(2, 4);
        assert_eq!(c.state(), CycleState::Idle);

        c.accept_chunk(chunk(4)).unwrap();
        assert_eq!(c.state(), CycleState::Windowing);
        assert!(c.begin().is_none());
        assert_eq!(c.state(), CycleState::Idle);
        let report = c.defer();
        assert_eq!(report.outcome, CycleOutcome::Deferred);
        assert!(report.state.is_reset());

        c.accept_chunk(chunk(4)).unwrap();
        let waveform = c.begin().expect("window should be full");
        assert_eq!(waveform.len(), 8);
        assert_eq!(c.state(), CycleState::Inferring);
    }

    #[test]
    fn input_shape_matches_full_waveform() {
        let c = cycle(6, 8_000);
        assert_eq!(c.input_shape().dims(), &[1, 1, 48_000]);
    }

    #[test]
    fn complete_labels_dog_from_logits() {
        let mut c = cycle(1, 4);
        c.accept_chunk(chunk(4)).unwrap();
        c.begin().unwrap();

        let report = c.complete(Ok(vec![vec![0.0, 5.0, 0.0]]));
        assert_eq!(report.outcome, CycleOutcome::Labeled);
        assert_eq!(report.state.detected, DetectedClass::Dog);
        assert_abs_diff_eq!(report.state.probs[1], 0.9867, epsilon = 1e-3);
        assert_eq!(c.state(), CycleState::Labeled);
    }

    #[test]
    fn complete_labels_none_when_nothing_clears_threshold() {
        let mut c = cycle(1, 4);
        c.accept_chunk(chunk(4)).unwrap();
        c.begin().unwrap();

        let report = c.complete(Ok(vec![vec![2.0, 0.1, 0.1]]));
        assert_eq!(report.outcome, CycleOutcome::Labeled);
        assert_eq!(report.state.detected, DetectedClass::None);
        assert!(report.state.probs[0] > report.state.probs[1]);
        assert_abs_diff_eq!(report.state.probs[1], report.state.probs[2], epsilon = 1e-6);
    }

    #[test]
    fn inference_error_publishes_reset_pair() {
        let mut c = cycle(1, 4);
        c.accept_chunk(chunk(4)).unwrap();
        c.begin().unwrap();

        let report = c.complete(Err(PawsenseError::Inference("boom".into())));
        assert_eq!(report.outcome, CycleOutcome::Failed);
        assert!(report.state.is_reset());
        assert!(report.error.unwrap().contains("boom"));
        assert_eq!(c.state(), CycleState::Idle);
    }

    #[test]
    fn wrong_score_count_and_non_finite_scores_fail() {
        let policy = ThresholdPolicy::default();
        assert!(classify_scores(&[vec![1.0, 2.0]], &policy).is_err());
        assert!(classify_scores(&[], &policy).is_err());
        assert!(matches!(
            classify_scores(&[vec![f32::NAN, 0.0, 0.0]], &policy),
            Err(PawsenseError::NonFiniteScores)
        ));
    }

    #[test]
    fn only_first_output_row_is_used() {
        let state = classify_scores(
            &[vec![0.0, 9.0, 0.0], vec![9.0, 0.0, 0.0]],
            &ThresholdPolicy::default(),
        )
        .unwrap();
        assert_eq!(state.detected, DetectedClass::Dog);
    }

    #[test]
    fn malformed_chunk_clears_window() {
        let mut c = cycle(3, 4);
        c.accept_chunk(chunk(4)).unwrap();
        c.accept_chunk(chunk(4)).unwrap();

        let err = c.accept_chunk(chunk(5)).unwrap_err();
        assert!(matches!(err, PawsenseError::MalformedChunk { .. }));
        assert!(c.window().is_empty());
        assert_eq!(c.state(), CycleState::Idle);
    }
}
