//! Numerically stable softmax over raw model scores.

use crate::error::{PawsenseError, Result};

/// Convert raw per-class scores (logits) into a probability distribution.
///
/// The maximum score is subtracted before exponentiating so large logits
/// cannot overflow `exp`.
///
/// # Errors
/// - `PawsenseError::NonFiniteScores` if any score is NaN or infinite.
/// - `PawsenseError::Inference` if `scores` is empty.
pub fn softmax(scores: &[f32]) -> Result<Vec<f32>> {
    if scores.is_empty() {
        return Err(PawsenseError::Inference("model returned no scores".into()));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(PawsenseError::NonFiniteScores);
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    // exp(0) = 1 for the max element, so the sum is always >= 1.
    let sum: f32 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}
