//! Cuts an arbitrary-length sample stream into fixed-size chunks.
//!
//! cpal delivers callback buffers of whatever size the device prefers and the
//! resampler emits in its own block size. The classifier expects exactly
//! `chunk_samples` per chunk-ready event, so the feeder pushes everything
//! through a `ChunkAssembler` first.

use crate::buffering::chunk::AudioChunk;

#[derive(Debug)]
pub struct ChunkAssembler {
    pending: Vec<f32>,
    chunk_samples: usize,
    sample_rate: u32,
}

impl ChunkAssembler {
    pub fn new(chunk_samples: usize, sample_rate: u32) -> Self {
        Self {
            pending: Vec::with_capacity(chunk_samples.saturating_mul(2)),
            chunk_samples: chunk_samples.max(1),
            sample_rate,
        }
    }

    /// Buffer `samples` and return every chunk that became complete, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioChunk> {
        self.pending.extend_from_slice(samples);

        let ready = self.pending.len() / self.chunk_samples;
        if ready == 0 {
            return Vec::new();
        }

        let mut chunks = Vec::with_capacity(ready);
        for block in self
            .pending
            .chunks_exact(self.chunk_samples)
            .take(ready)
        {
            chunks.push(AudioChunk::new(block.to_vec(), self.sample_rate));
        }
        self.pending.drain(..ready * self.chunk_samples);
        chunks
    }

    /// Samples buffered towards the next chunk.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partial chunk (e.g. when a capture session ends).
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
