//! Score normalisation, threshold labelling and the per-chunk classification cycle.
//!
//! ```text
//! raw scores ──softmax──► probabilities ──ThresholdPolicy──► DetectedClass
//! ```
//!
//! [`ClassificationState`] is the only state exposed to presentation; it is
//! always replaced as a whole so probabilities and label never disagree.

pub mod cycle;
pub mod softmax;
pub mod threshold;

use serde::{Deserialize, Serialize};

use crate::config::NUM_CLASSES;

pub use cycle::{ClassificationCycle, CycleOutcome, CycleReport, CycleState};
pub use softmax::softmax;
pub use threshold::ThresholdPolicy;

/// Discrete label produced by the threshold policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedClass {
    Cat,
    Dog,
    #[default]
    None,
}

impl DetectedClass {
    /// Classes in model output order.
    pub const ALL: [DetectedClass; NUM_CLASSES] =
        [DetectedClass::Cat, DetectedClass::Dog, DetectedClass::None];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectedClass::Cat => "cat",
            DetectedClass::Dog => "dog",
            DetectedClass::None => "none",
        }
    }

    /// Capitalised label used for chart axes.
    pub fn display_name(self) -> &'static str {
        match self {
            DetectedClass::Cat => "Cat",
            DetectedClass::Dog => "Dog",
            DetectedClass::None => "None",
        }
    }
}

impl std::fmt::Display for DetectedClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published probabilities + label pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationState {
    /// Probabilities in class order cat, dog, none. All zero after a reset.
    pub probs: [f32; NUM_CLASSES],
    pub detected: DetectedClass,
}

impl ClassificationState {
    /// The state published on failure or before the window is full.
    pub fn reset() -> Self {
        Self {
            probs: [0.0; NUM_CLASSES],
            detected: DetectedClass::None,
        }
    }

    pub fn is_reset(&self) -> bool {
        self.detected == DetectedClass::None && self.probs.iter().all(|p| *p == 0.0)
    }
}
