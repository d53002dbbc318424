//! Rolling window of the most recent audio chunks.
//!
//! ```text
//! append(c7) on a full window of 6:
//!   [c1 c2 c3 c4 c5 c6] → [c2 c3 c4 c5 c6 c7]
//! snapshot() = c2 ‖ c3 ‖ c4 ‖ c5 ‖ c6 ‖ c7   (oldest first)
//! ```
//!
//! The window only hands out a waveform once it holds exactly `capacity`
//! chunks, so the model never sees a short or padded input.

use std::collections::VecDeque;

use crate::buffering::chunk::AudioChunk;
use crate::error::{PawsenseError, Result};

/// Bounded, ordered buffer of the most recent `capacity` chunks.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    chunks: VecDeque<AudioChunk>,
    capacity: usize,
    chunk_samples: usize,
}

impl RollingWindow {
    /// Create an empty window holding up to `capacity` chunks of
    /// `chunk_samples` samples each.
    pub fn new(capacity: usize, chunk_samples: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity.saturating_add(1)),
            capacity,
            chunk_samples,
        }
    }

    /// Append a chunk, evicting the oldest ones so that at most `capacity` remain.
    ///
    /// # Errors
    /// `PawsenseError::MalformedChunk` if the chunk length differs from the
    /// configured per-chunk sample count. The window is left untouched.
    pub fn append(&mut self, chunk: AudioChunk) -> Result<()> {
        if chunk.len() != self.chunk_samples {
            return Err(PawsenseError::MalformedChunk {
                expected: self.chunk_samples,
                actual: chunk.len(),
            });
        }
        self.chunks.push_back(chunk);
        while self.chunks.len() > self.capacity {
            self.chunks.pop_front();
        }
        Ok(())
    }

    /// Concatenate all held chunks, oldest first.
    ///
    /// Returns `None` until the window is full.
    pub fn snapshot(&self) -> Option<Vec<f32>> {
        if !self.is_full() {
            return None;
        }
        let mut waveform = Vec::with_capacity(self.waveform_len());
        for chunk in &self.chunks {
            waveform.extend_from_slice(&chunk.samples);
        }
        Some(waveform)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// `true` once `capacity` chunks are held (and `capacity > 0`).
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.chunks.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of a full snapshot: `capacity × chunk_samples`.
    pub fn waveform_len(&self) -> usize {
        self.capacity * self.chunk_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(value: f32, len: usize) -> AudioChunk {
        AudioChunk::new(vec![value; len], 16_000)
    }

    #[test]
    fn snapshot_is_none_until_full() {
        let mut window = RollingWindow::new(3, 4);
        assert!(window.snapshot().is_none());
        window.append(chunk(1.0, 4)).unwrap();
        window.append(chunk(2.0, 4)).unwrap();
        assert!(!window.is_full());
        assert!(window.snapshot().is_none());
        window.append(chunk(3.0, 4)).unwrap();
        assert!(window.is_full());
        assert_eq!(window.snapshot().unwrap().len(), 12);
    }

    #[test]
    fn snapshot_keeps_only_last_n_chunks_in_arrival_order() {
        let mut window = RollingWindow::new(6, 4);
        for k in 0..10 {
            window.append(chunk(k as f32, 4)).unwrap();
            assert!(window.len() <= 6);
        }

        let waveform = window.snapshot().unwrap();
        assert_eq!(waveform.len(), 6 * 4);
        let firsts: Vec<f32> = waveform.chunks(4).map(|c| c[0]).collect();
        assert_eq!(firsts, vec![4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn snapshot_length_is_constant_for_any_extra_appends() {
        for extra in 0..8 {
            let mut window = RollingWindow::new(6, 8);
            for k in 0..(6 + extra) {
                window.append(chunk(k as f32, 8)).unwrap();
            }
            assert_eq!(window.snapshot().unwrap().len(), window.waveform_len());
        }
    }

    #[test]
    fn mismatched_chunk_is_rejected_without_mutation() {
        let mut window = RollingWindow::new(2, 4);
        window.append(chunk(1.0, 4)).unwrap();

        let err = window.append(chunk(9.0, 3)).unwrap_err();
        assert!(matches!(
            err,
            PawsenseError::MalformedChunk {
                expected: 4,
                actual: 3
            }
        ));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn clear_empties_the_window() {
        let mut window = RollingWindow::new(2, 4);
        window.append(chunk(1.0, 4)).unwrap();
        window.append(chunk(2.0, 4)).unwrap();
        window.clear();
        assert!(window.is_empty());
        assert!(window.snapshot().is_none());
    }

    #[test]
    fn zero_capacity_never_yields_a_waveform() {
        let mut window = RollingWindow::new(0, 4);
        window.append(chunk(1.0, 4)).unwrap();
        assert!(window.is_empty());
        assert!(window.snapshot().is_none());
    }
}
