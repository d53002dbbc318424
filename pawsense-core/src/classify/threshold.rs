//! Ordered threshold rules mapping probabilities to a [`DetectedClass`].
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. `p(dog) >= dog_threshold` → `Dog`
//! 2. `p(cat) >= cat_threshold` → `Cat`
//! 3. otherwise → `None`
//!
//! Dog is checked first, so it wins when both classes clear their thresholds.

use crate::classify::DetectedClass;
use crate::config::{CAT_INDEX, DEFAULT_CAT_THRESHOLD, DEFAULT_DOG_THRESHOLD, DOG_INDEX};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub dog_threshold: f32,
    pub cat_threshold: f32,
}

impl ThresholdPolicy {
    pub fn new(dog_threshold: f32, cat_threshold: f32) -> Self {
        Self {
            dog_threshold,
            cat_threshold,
        }
    }

    /// Label a probability vector in class order cat, dog, none.
    ///
    /// Missing entries count as probability zero.
    pub fn label(&self, probs: &[f32]) -> DetectedClass {
        let p_dog = probs.get(DOG_INDEX).copied().unwrap_or(0.0);
        let p_cat = probs.get(CAT_INDEX).copied().unwrap_or(0.0);

        if p_dog >= self.dog_threshold {
            DetectedClass::Dog
        } else if p_cat >= self.cat_threshold {
            DetectedClass::Cat
        } else {
            DetectedClass::None
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DOG_THRESHOLD, DEFAULT_CAT_THRESHOLD)
    }
}
