//! Audio buffering between the real-time callback and the classifier.
//!
//! - [`create_audio_ring`]: lock-free SPSC ring (`ringbuf::HeapRb<f32>`) whose
//!   `push_slice` is wait-free and safe to call from the audio callback.
//! - [`assembler::ChunkAssembler`]: cuts the drained stream into fixed-size chunks.
//! - [`window::RollingWindow`]: the most recent N chunks, concatenated for inference.

pub mod assembler;
pub mod chunk;
pub mod window;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the feeder thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^20 = 1 048 576 f32 samples ≈ 21.8 s at 48 kHz.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
