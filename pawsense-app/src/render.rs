//! Terminal presentation: a three-bar chart plus the detected label, or one
//! JSON object per event.

use std::fmt::Write as _;

use pawsense_core::{ClassificationEvent, ClassificationState, CycleOutcome, DetectedClass};

pub const BAR_WIDTH: usize = 30;

fn bar(prob: f32, width: usize) -> String {
    let p = if prob.is_finite() { prob.clamp(0.0, 1.0) } else { 0.0 };
    let filled = (p * width as f32).round() as usize;
    let mut out = String::with_capacity(width * 3);
    out.extend(std::iter::repeat('█').take(filled));
    out.extend(std::iter::repeat('░').take(width - filled));
    out
}

/// One line per class in model order, then `Detected: <label>`.
pub fn render_chart(state: &ClassificationState) -> String {
    let mut out = String::new();
    for (class, prob) in DetectedClass::ALL.iter().zip(state.probs.iter()) {
        let _ = writeln!(
            out,
            "{:<5}{} {:>5.1}%",
            class.display_name(),
            bar(*prob, BAR_WIDTH),
            prob * 100.0
        );
    }
    let _ = write!(out, "Detected: {}", state.detected);
    out
}

/// Chart plus a status suffix for cycles that did not label.
pub fn render_event(event: &ClassificationEvent) -> String {
    let chart = render_chart(&event.state());
    match event.outcome {
        CycleOutcome::Labeled => chart,
        CycleOutcome::Deferred => format!("{chart} (filling window)"),
        CycleOutcome::Failed => format!("{chart} (classification failed)"),
    }
}

pub fn render_json(event: &ClassificationEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}
