//! Build-time constants shared by capture, windowing and inference.
//!
//! `WINDOW_SECS` must match the input length the bundled model was exported
//! with. Changing it means shipping a different model artifact.

/// Capture and model sample rate (Hz).
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per audio chunk delivered by the capture source (0.5 s at 16 kHz).
pub const CHUNK_SAMPLES: usize = 8_000;

/// Total duration of audio fed to the model per classification.
pub const WINDOW_SECS: u32 = 3;

/// Number of chunks held by the rolling window.
pub const WINDOW_CHUNKS: usize = (WINDOW_SECS as usize * SAMPLE_RATE as usize) / CHUNK_SAMPLES;

/// Probability at or above which the label becomes "dog".
pub const DEFAULT_DOG_THRESHOLD: f32 = 0.9;

/// Probability at or above which the label becomes "cat" (checked after dog).
pub const DEFAULT_CAT_THRESHOLD: f32 = 0.9;

/// Output classes of the model, in output order: cat, dog, none.
pub const NUM_CLASSES: usize = 3;

pub const CAT_INDEX: usize = 0;
pub const DOG_INDEX: usize = 1;
pub const NONE_INDEX: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_six_half_second_chunks() {
        assert_eq!(WINDOW_CHUNKS, 6);
        assert_eq!(WINDOW_CHUNKS * CHUNK_SAMPLES, 48_000);
    }
}
