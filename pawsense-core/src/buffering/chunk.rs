//! Typed audio chunk delivered by the capture source to the rolling window.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Produced once per chunk-ready event (every `CHUNK_SAMPLES` samples) on the
/// feeder thread, then owned by the rolling window until evicted.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (16000 once resampled).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of samples in this chunk.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
