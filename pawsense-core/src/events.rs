//! Event types broadcast by [`crate::engine::PawsenseEngine`].
//!
//! | Event | Subscribe with |
//! |-------|----------------|
//! | `ClassificationEvent` | `subscribe_classifications()` |
//! | `EngineStatusEvent` | `subscribe_status()` |
//! | `CaptureStatusEvent` | `subscribe_capture()` |
//!
//! Every type serializes to camelCase JSON so the app can print them as
//! JSON lines unchanged.

use serde::{Deserialize, Serialize};

use crate::classify::{ClassificationState, CycleOutcome, DetectedClass};
use crate::config::NUM_CLASSES;

// ---------------------------------------------------------------------------
// Classification events
// ---------------------------------------------------------------------------

/// Published once per classification cycle, including deferred and failed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Probabilities in class order cat, dog, none.
    pub probs: [f32; NUM_CLASSES],
    pub detected: DetectedClass,
    pub outcome: CycleOutcome,
}

impl ClassificationEvent {
    pub fn new(seq: u64, state: ClassificationState, outcome: CycleOutcome) -> Self {
        Self {
            seq,
            probs: state.probs,
            detected: state.detected,
            outcome,
        }
    }

    pub fn state(&self) -> ClassificationState {
        ClassificationState {
            probs: self.probs,
            detected: self.detected,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Loading the model and running the dummy forward pass.
    WarmingUp,
    /// Capturing audio and classifying windows.
    Listening,
    /// Capture stopped; engine may be restarted.
    Stopped,
    /// Start-up failed; see the event detail.
    Error,
}

// ---------------------------------------------------------------------------
// Capture status events
// ---------------------------------------------------------------------------

/// Informational only: the classifier never reacts to these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatusEvent {
    pub previous: CaptureStatus,
    pub current: CaptureStatus,
    /// Device name on start, error text on stream errors.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Idle,
    Recording,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_event_serializes_camel_case() {
        let state = ClassificationState {
            probs: [0.02, 0.97, 0.01],
            detected: DetectedClass::Dog,
        };
        let event = ClassificationEvent::new(11, state, CycleOutcome::Labeled);

        let json = serde_json::to_value(&event).expect("serialize classification event");
        assert_eq!(json["seq"], 11);
        assert_eq!(json["detected"], "dog");
        assert_eq!(json["outcome"], "labeled");
        assert_eq!(json["probs"].as_array().map(Vec::len), Some(3));

        let round_trip: ClassificationEvent =
            serde_json::from_value(json).expect("deserialize classification event");
        assert_eq!(round_trip.state(), state);
    }

    #[test]
    fn engine_status_event_serializes_with_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::WarmingUp,
            detail: Some("loading model".into()),
        };
        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "warmingup");
        assert_eq!(json["detail"], "loading model");
    }

    #[test]
    fn capture_status_event_keeps_both_states() {
        let event = CaptureStatusEvent {
            previous: CaptureStatus::Idle,
            current: CaptureStatus::Recording,
            detail: None,
        };
        let json = serde_json::to_value(&event).expect("serialize capture event");
        assert_eq!(json["previous"], "idle");
        assert_eq!(json["current"], "recording");
        assert!(json["detail"].is_null());
    }

    #[test]
    fn unknown_outcome_is_rejected() {
        let raw = r#"{"seq":1,"probs":[0,0,0],"detected":"none","outcome":"skipped"}"#;
        assert!(serde_json::from_str::<ClassificationEvent>(raw).is_err());
    }
}
